//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per finished genre run
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    genre TEXT NOT NULL,
    style_code TEXT,
    time_filter TEXT,
    phase TEXT NOT NULL,
    target_count INTEGER NOT NULL,
    accepted_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL DEFAULT 0,
    page_errors INTEGER NOT NULL DEFAULT 0,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    rejected_duplicate INTEGER NOT NULL DEFAULT 0,
    rejected_low_quality INTEGER NOT NULL DEFAULT 0,
    rejected_missing_tracks INTEGER NOT NULL DEFAULT 0,
    rejected_malformed INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    elapsed_seconds REAL NOT NULL,
    config_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_genre ON runs(genre);

-- Accepted mixes, unique per genre
CREATE TABLE IF NOT EXISTS mixes (
    genre TEXT NOT NULL,
    id TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    run_position INTEGER NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    author TEXT,
    mix_date TEXT,
    genres TEXT NOT NULL,
    metadata TEXT NOT NULL,
    quality_score REAL NOT NULL,
    track_completion REAL NOT NULL,
    PRIMARY KEY (genre, id)
);

CREATE INDEX IF NOT EXISTS idx_mixes_run ON mixes(run_id);

-- Tracklists, ordered by position
CREATE TABLE IF NOT EXISTS tracks (
    genre TEXT NOT NULL,
    mix_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    title TEXT,
    artist TEXT,
    start_time TEXT,
    PRIMARY KEY (genre, mix_id, position),
    FOREIGN KEY (genre, mix_id) REFERENCES mixes(genre, id) ON DELETE CASCADE
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
