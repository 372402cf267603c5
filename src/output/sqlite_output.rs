//! SQLite-backed export sink
//!
//! This module provides an export sink that records finished runs directly
//! to the SQLite storage backend.

use crate::output::traits::{ExportReceipt, ExportSink, OutputError, OutputResult};
use crate::state::RunSnapshot;
use crate::storage::{SqliteStorage, Storage};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// SQLite export sink
///
/// Stores each run with its mixes and tracklists, and answers which mixes a
/// genre already has so later runs can be seeded from the database.
pub struct SqliteExporter {
    storage: Mutex<SqliteStorage>,
    config_hash: Option<String>,
}

impl SqliteExporter {
    /// Creates a new SQLite export sink
    ///
    /// # Arguments
    ///
    /// * `storage` - The storage backend to write to
    /// * `config_hash` - Configuration hash recorded with every run
    pub fn new(storage: SqliteStorage, config_hash: Option<String>) -> Self {
        Self {
            storage: Mutex::new(storage),
            config_hash,
        }
    }

    fn lock(&self) -> OutputResult<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|e| OutputError::Storage(format!("Failed to lock storage: {}", e)))
    }

    /// Identifiers of every mix stored for a genre
    pub fn known_identifiers(&self, genre: &str) -> OutputResult<HashSet<String>> {
        self.lock()?
            .known_identifiers(genre)
            .map_err(|e| OutputError::Storage(e.to_string()))
    }
}

impl ExportSink for SqliteExporter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn export(&self, snapshot: &RunSnapshot) -> OutputResult<ExportReceipt> {
        let run_id = self
            .lock()?
            .record_run(snapshot, self.config_hash.as_deref())
            .map_err(|e| OutputError::Storage(e.to_string()))?;

        tracing::info!("Stored {} run as database run {}", snapshot.genre, run_id);
        Ok(ExportReceipt {
            sink: self.name(),
            location: format!("run {}", run_id),
            records: snapshot.records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawRecord;
    use crate::state::{RunPhase, RunState};

    fn snapshot() -> RunSnapshot {
        let mut state = RunState::new("Techno", 5, 25, None);
        state.begin("TA").unwrap();
        state.accept(
            RawRecord {
                title: "2024-01-01 - Someone - Live".to_string(),
                url: "https://www.mixesdb.com/w/2024-01-01_-_Someone_-_Live".to_string(),
                ..RawRecord::default()
            }
            .into_record(),
        );
        state.transition(RunPhase::Exhausted).unwrap();
        state.finish()
    }

    #[test]
    fn test_export_and_seed() {
        let exporter = SqliteExporter::new(SqliteStorage::new_in_memory().unwrap(), Some("hash".to_string()));
        let snapshot = snapshot();

        let receipt = exporter.export(&snapshot).unwrap();
        assert_eq!(receipt.sink, "sqlite");
        assert_eq!(receipt.records, 1);

        let known = exporter.known_identifiers("Techno").unwrap();
        assert!(known.contains(&snapshot.records[0].id));
    }
}
