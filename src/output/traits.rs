//! Export sink traits and types
//!
//! This module defines the trait interface for export sinks and the
//! document shape a finished run is exported as.

use crate::record::Record;
use crate::state::{RejectionCounts, RunPhase, RunSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Where a sink put a run
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReceipt {
    /// Sink name, e.g. "json"
    pub sink: &'static str,

    /// File path or database row the run ended up in
    pub location: String,

    /// Mixes written
    pub records: usize,
}

/// Persisted form of one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub timestamp: DateTime<Utc>,
    pub genre: String,
    pub style_code: Option<String>,
    #[serde(default)]
    pub time_filter: Option<String>,
    pub state: RunPhase,
    pub target_count: usize,
    pub total_mixes: usize,
    /// Accepted mixes over the target
    pub success_rate: f64,
    pub elapsed_seconds: f64,
    pub error_count: u64,
    pub page_errors: u64,
    pub pages_fetched: u64,
    pub rejections: RejectionCounts,
    #[serde(default)]
    pub discarded_overflow: u64,
    pub mixes: Vec<Record>,
}

impl ExportDocument {
    pub fn from_snapshot(snapshot: &RunSnapshot) -> Self {
        Self {
            timestamp: snapshot.finished_at,
            genre: snapshot.genre.clone(),
            style_code: snapshot.style_code.clone(),
            time_filter: snapshot.time_filter.clone(),
            state: snapshot.phase,
            target_count: snapshot.target_count,
            total_mixes: snapshot.records.len(),
            success_rate: snapshot.success_rate(),
            elapsed_seconds: snapshot.elapsed_seconds,
            error_count: snapshot.error_count,
            page_errors: snapshot.page_errors,
            pages_fetched: snapshot.pages_fetched,
            rejections: snapshot.rejections,
            discarded_overflow: snapshot.discarded_overflow,
            mixes: snapshot.records.clone(),
        }
    }
}

/// Trait for export sinks
///
/// A sink persists a finished run somewhere. Implementations must be
/// thread-safe; one sink may export runs of several genres.
pub trait ExportSink: Send + Sync {
    /// Short name used in log lines and receipts
    fn name(&self) -> &'static str;

    /// Persists one finished run
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The finished run
    ///
    /// # Returns
    ///
    /// Where the run was written
    fn export(&self, snapshot: &RunSnapshot) -> OutputResult<ExportReceipt>;
}
