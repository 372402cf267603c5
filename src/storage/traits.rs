//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::record::Record;
use crate::state::RunSnapshot;
use crate::storage::RunRecord;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// A backend keeps finished runs and the mixes they accepted, and answers the
/// questions a later run asks before it starts (which mixes are already known).
pub trait Storage {
    // ===== Run Management =====

    /// Persists a finished run with its accepted mixes and their tracks
    ///
    /// Mixes already stored for the same genre are left untouched.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The finished run
    /// * `config_hash` - Hash of the configuration file, if known
    ///
    /// # Returns
    ///
    /// The ID of the stored run
    fn record_run(&mut self, snapshot: &RunSnapshot, config_hash: Option<&str>) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run, optionally restricted to one genre
    fn get_latest_run(&self, genre: Option<&str>) -> StorageResult<Option<RunRecord>>;

    // ===== Mix Queries =====

    /// Identifiers of every mix stored for a genre
    fn known_identifiers(&self, genre: &str) -> StorageResult<HashSet<String>>;

    /// Number of mixes stored for a genre
    fn count_records(&self, genre: &str) -> StorageResult<u64>;

    /// Mixes stored by one run, in acceptance order, with their tracklists
    fn load_run_records(&self, run_id: i64) -> StorageResult<Vec<Record>>;
}
