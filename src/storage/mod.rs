//! Storage module for persisting crawl runs
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Run summaries with their rejection counts
//! - Accepted mixes and their tracklists
//! - Known-identifier queries used to seed deduplication across runs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{RejectionCounts, RunPhase};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a stored crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub genre: String,
    pub style_code: Option<String>,
    pub time_filter: Option<String>,
    pub phase: RunPhase,
    pub target_count: u64,
    pub accepted_count: u64,
    pub error_count: u64,
    pub page_errors: u64,
    pub pages_fetched: u64,
    pub rejections: RejectionCounts,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_seconds: f64,
    pub config_hash: Option<String>,
}

impl RunRecord {
    pub fn success_rate(&self) -> f64 {
        if self.target_count == 0 {
            return 0.0;
        }
        self.accepted_count as f64 / self.target_count as f64
    }
}
