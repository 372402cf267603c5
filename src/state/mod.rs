//! State module for tracking crawl runs
//!
//! # Components
//!
//! - `RunPhase`: Lifecycle of a run (idle, running, and the terminal phases)
//! - `PageCursor`: Forward-only position in the Explorer listing
//! - `RunState`: Accepted records, rejection counts and error accounting for one run
//! - `RunSnapshot`: The frozen outcome handed to exporters

mod cursor;
mod run_phase;
mod run_state;

// Re-export main types
pub use cursor::PageCursor;
pub use run_phase::{RejectionReason, RunPhase};
pub use run_state::{RejectionCounts, RunProgress, RunSnapshot, RunState};
