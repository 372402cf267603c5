//! Mutable run bookkeeping and its frozen snapshot
//!
//! `RunState` is owned by the engine's coordinating task and never shared.
//! When the run ends it is consumed into a `RunSnapshot`, which is what
//! exporters and callers see.
use crate::record::Record;
use crate::state::{PageCursor, RejectionReason, RunPhase};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Rejected record counts, one field per reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub duplicate: u64,
    pub low_quality: u64,
    pub missing_tracks: u64,
    pub malformed: u64,
}

impl RejectionCounts {
    pub fn increment(&mut self, reason: RejectionReason) {
        *self.slot(reason) += 1;
    }

    pub fn get(&self, reason: RejectionReason) -> u64 {
        match reason {
            RejectionReason::Duplicate => self.duplicate,
            RejectionReason::LowQuality => self.low_quality,
            RejectionReason::MissingTracks => self.missing_tracks,
            RejectionReason::Malformed => self.malformed,
        }
    }

    pub fn total(&self) -> u64 {
        self.duplicate + self.low_quality + self.missing_tracks + self.malformed
    }

    fn slot(&mut self, reason: RejectionReason) -> &mut u64 {
        match reason {
            RejectionReason::Duplicate => &mut self.duplicate,
            RejectionReason::LowQuality => &mut self.low_quality,
            RejectionReason::MissingTracks => &mut self.missing_tracks,
            RejectionReason::Malformed => &mut self.malformed,
        }
    }
}

/// Progress published after every batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub genre: String,
    pub phase: RunPhase,
    pub accepted: usize,
    pub target: usize,
    pub pages_fetched: u64,
    pub batches: u64,
    pub page_errors: u64,
    pub error_count: u64,
}

/// Bookkeeping for one genre run
#[derive(Debug)]
pub struct RunState {
    genre: String,
    style_code: Option<String>,
    time_filter: Option<String>,
    target: usize,
    phase: RunPhase,
    accepted: Vec<Record>,
    rejections: RejectionCounts,
    error_count: u64,
    page_errors: u64,
    pages_fetched: u64,
    batches: u64,
    discarded_overflow: u64,
    consecutive_failed_batches: u32,
    cursor: PageCursor,
    abort_reason: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RunState {
    pub fn new(genre: &str, target: usize, page_size: usize, time_filter: Option<String>) -> Self {
        Self {
            genre: genre.to_string(),
            style_code: None,
            time_filter,
            target,
            phase: RunPhase::Idle,
            accepted: Vec::new(),
            rejections: RejectionCounts::default(),
            error_count: 0,
            page_errors: 0,
            pages_fetched: 0,
            batches: 0,
            discarded_overflow: 0,
            consecutive_failed_batches: 0,
            cursor: PageCursor::start(page_size),
            abort_reason: None,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Moves to `next`, refusing moves the lifecycle does not allow
    pub fn transition(&mut self, next: RunPhase) -> Result<(), CrawlError> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Starts fetching for the resolved style code
    pub fn begin(&mut self, style_code: &str) -> Result<(), CrawlError> {
        self.transition(RunPhase::Running)?;
        self.style_code = Some(style_code.to_string());
        Ok(())
    }

    pub fn abort(&mut self, reason: String) -> Result<(), CrawlError> {
        self.transition(RunPhase::Aborted)?;
        self.abort_reason = Some(reason);
        Ok(())
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: PageCursor) {
        self.cursor = cursor;
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_target_reached(&self) -> bool {
        self.accepted.len() >= self.target
    }

    /// Appends a record unless the target is already met
    ///
    /// Records past the target are counted as overflow and dropped, so the
    /// accepted list is always the in-order prefix of what passed the filters.
    pub fn accept(&mut self, record: Record) -> bool {
        if self.is_target_reached() {
            self.discarded_overflow += 1;
            return false;
        }
        self.accepted.push(record);
        true
    }

    pub fn reject(&mut self, reason: RejectionReason) {
        self.rejections.increment(reason);
    }

    pub fn rejections(&self) -> &RejectionCounts {
        &self.rejections
    }

    /// Accounts for one finished batch
    ///
    /// A batch in which every page failed bumps the run-level error counter
    /// and the consecutive failure streak; any successful page resets the streak.
    pub fn record_batch(&mut self, pages: usize, failed_pages: usize) {
        self.batches += 1;
        self.pages_fetched += pages as u64;
        self.page_errors += failed_pages as u64;

        if pages > 0 && failed_pages == pages {
            self.error_count += 1;
            self.consecutive_failed_batches += 1;
        } else {
            self.consecutive_failed_batches = 0;
        }
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn consecutive_failed_batches(&self) -> u32 {
        self.consecutive_failed_batches
    }

    pub fn progress(&self) -> RunProgress {
        RunProgress {
            genre: self.genre.clone(),
            phase: self.phase,
            accepted: self.accepted.len(),
            target: self.target,
            pages_fetched: self.pages_fetched,
            batches: self.batches,
            page_errors: self.page_errors,
            error_count: self.error_count,
        }
    }

    /// Freezes the run into its snapshot
    pub fn finish(self) -> RunSnapshot {
        RunSnapshot {
            genre: self.genre,
            style_code: self.style_code,
            time_filter: self.time_filter,
            target_count: self.target,
            phase: self.phase,
            records: self.accepted,
            rejections: self.rejections,
            error_count: self.error_count,
            page_errors: self.page_errors,
            pages_fetched: self.pages_fetched,
            batches: self.batches,
            discarded_overflow: self.discarded_overflow,
            abort_reason: self.abort_reason,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Immutable result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub genre: String,
    pub style_code: Option<String>,
    pub time_filter: Option<String>,
    pub target_count: usize,
    pub phase: RunPhase,
    /// Accepted records in acceptance order, at most `target_count`
    pub records: Vec<Record>,
    pub rejections: RejectionCounts,
    /// Batches in which every page failed
    pub error_count: u64,
    /// Pages that failed permanently
    pub page_errors: u64,
    pub pages_fetched: u64,
    pub batches: u64,
    /// Records that passed every filter after the target was already met
    pub discarded_overflow: u64,
    pub abort_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl RunSnapshot {
    pub fn accepted_count(&self) -> usize {
        self.records.len()
    }

    /// Accepted records relative to the target, in [0, 1]
    pub fn success_rate(&self) -> f64 {
        if self.target_count == 0 {
            return 0.0;
        }
        self.records.len() as f64 / self.target_count as f64
    }
}
