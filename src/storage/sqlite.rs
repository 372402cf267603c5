//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::record::{Record, Track};
use crate::state::{RejectionCounts, RunPhase, RunSnapshot};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::RunRecord;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const RUN_COLUMNS: &str = "id, genre, style_code, time_filter, phase, target_count, accepted_count,
     error_count, page_errors, pages_fetched, rejected_duplicate, rejected_low_quality,
     rejected_missing_tracks, rejected_malformed, started_at, finished_at, elapsed_seconds,
     config_hash";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };

    Ok(RunRecord {
        id: row.get(0)?,
        genre: row.get(1)?,
        style_code: row.get(2)?,
        time_filter: row.get(3)?,
        phase: RunPhase::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunPhase::Aborted),
        target_count: count(5)?,
        accepted_count: count(6)?,
        error_count: count(7)?,
        page_errors: count(8)?,
        pages_fetched: count(9)?,
        rejections: RejectionCounts {
            duplicate: count(10)?,
            low_quality: count(11)?,
            missing_tracks: count(12)?,
            malformed: count(13)?,
        },
        started_at: row.get(14)?,
        finished_at: row.get(15)?,
        elapsed_seconds: row.get(16)?,
        config_hash: row.get(17)?,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> StorageResult<T> {
    serde_json::from_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Columns of one stored mix, before JSON fields are decoded
struct MixRow {
    genre: String,
    id: String,
    title: String,
    url: String,
    author: Option<String>,
    mix_date: Option<String>,
    genres: String,
    metadata: String,
    quality_score: f64,
    track_completion: f64,
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn record_run(&mut self, snapshot: &RunSnapshot, config_hash: Option<&str>) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (genre, style_code, time_filter, phase, target_count, accepted_count,
             error_count, page_errors, pages_fetched, rejected_duplicate, rejected_low_quality,
             rejected_missing_tracks, rejected_malformed, started_at, finished_at, elapsed_seconds,
             config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                snapshot.genre,
                snapshot.style_code,
                snapshot.time_filter,
                snapshot.phase.to_db_string(),
                snapshot.target_count as i64,
                snapshot.records.len() as i64,
                snapshot.error_count as i64,
                snapshot.page_errors as i64,
                snapshot.pages_fetched as i64,
                snapshot.rejections.duplicate as i64,
                snapshot.rejections.low_quality as i64,
                snapshot.rejections.missing_tracks as i64,
                snapshot.rejections.malformed as i64,
                snapshot.started_at.to_rfc3339(),
                snapshot.finished_at.to_rfc3339(),
                snapshot.elapsed_seconds,
                config_hash,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        let mut stored = 0;
        {
            let mut insert_mix = tx.prepare(
                "INSERT INTO mixes (genre, id, run_id, run_position, title, url, author, mix_date,
                 genres, metadata, quality_score, track_completion)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(genre, id) DO NOTHING",
            )?;
            let mut insert_track = tx.prepare(
                "INSERT INTO tracks (genre, mix_id, position, title, artist, start_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for (position, record) in snapshot.records.iter().enumerate() {
                let inserted = insert_mix.execute(params![
                    snapshot.genre,
                    record.id,
                    run_id,
                    position as i64,
                    record.title,
                    record.url,
                    record.author,
                    record.date.map(|d| d.format("%Y-%m-%d").to_string()),
                    to_json(&record.genres)?,
                    to_json(&record.metadata)?,
                    record.quality_score,
                    record.track_completion,
                ])?;

                // Already stored by an earlier run
                if inserted == 0 {
                    continue;
                }
                stored += 1;

                for track in &record.tracks {
                    insert_track.execute(params![
                        snapshot.genre,
                        record.id,
                        track.position,
                        track.title,
                        track.artist,
                        track.start_time,
                    ])?;
                }
            }
        }

        tx.commit()?;
        tracing::debug!(
            "Stored run {} for {}: {} new mixes of {}",
            run_id,
            snapshot.genre,
            stored,
            snapshot.records.len()
        );
        Ok(run_id)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, genre: Option<&str>) -> StorageResult<Option<RunRecord>> {
        let run = match genre {
            Some(genre) => {
                let sql = format!("SELECT {} FROM runs WHERE genre = ?1 ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
                self.conn.query_row(&sql, params![genre], run_from_row).optional()?
            }
            None => {
                let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
                self.conn.query_row(&sql, [], run_from_row).optional()?
            }
        };
        Ok(run)
    }

    // ===== Mix Queries =====

    fn known_identifiers(&self, genre: &str) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM mixes WHERE genre = ?1")?;
        let ids = stmt
            .query_map(params![genre], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn count_records(&self, genre: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM mixes WHERE genre = ?1",
            params![genre],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn load_run_records(&self, run_id: i64) -> StorageResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT genre, id, title, url, author, mix_date, genres, metadata, quality_score,
             track_completion
             FROM mixes WHERE run_id = ?1 ORDER BY run_position",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(MixRow {
                    genre: row.get(0)?,
                    id: row.get(1)?,
                    title: row.get(2)?,
                    url: row.get(3)?,
                    author: row.get(4)?,
                    mix_date: row.get(5)?,
                    genres: row.get(6)?,
                    metadata: row.get(7)?,
                    quality_score: row.get(8)?,
                    track_completion: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut track_stmt = self.conn.prepare(
            "SELECT position, title, artist, start_time FROM tracks
             WHERE genre = ?1 AND mix_id = ?2 ORDER BY position",
        )?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let tracks = track_stmt
                .query_map(params![row.genre, row.id], |r| {
                    Ok(Track {
                        position: r.get(0)?,
                        title: r.get(1)?,
                        artist: r.get(2)?,
                        start_time: r.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let date = match row.mix_date.as_deref() {
                Some(text) => Some(
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .map_err(|e| StorageError::Serialization(format!("bad date '{}': {}", text, e)))?,
                ),
                None => None,
            };

            records.push(Record {
                id: row.id,
                title: row.title,
                url: row.url,
                author: row.author,
                date,
                genres: from_json(&row.genres)?,
                tracks,
                metadata: from_json(&row.metadata)?,
                quality_score: row.quality_score,
                track_completion: row.track_completion,
            });
        }

        Ok(records)
    }
}
