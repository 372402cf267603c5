//! Run lifecycle and rejection reasons
//!
//! A run moves `Idle -> Running -> {Completed, Exhausted, Aborted, Cancelled}`.
//! `Aborted` is also reachable straight from `Idle` when the genre cannot be
//! resolved, so no page is ever fetched for it.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    // ===== Active States =====
    /// Created, nothing requested yet
    #[default]
    Idle,

    /// Batches are being fetched
    Running,

    // ===== Terminal States =====
    /// Accepted count reached the target
    Completed,

    /// The listing ran out (or kept failing) before the target was reached
    Exhausted,

    /// A fatal condition stopped the run before any batch
    Aborted,

    /// Cancelled from outside at a batch boundary
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }

    /// Completed and Exhausted both end a run without error
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Exhausted)
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        match (self, next) {
            (Self::Idle, Self::Running) => true,
            (Self::Idle, Self::Aborted) | (Self::Idle, Self::Cancelled) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Converts the phase to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a phase from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "exhausted" => Some(Self::Exhausted),
            "aborted" => Some(Self::Aborted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Completed,
            Self::Exhausted,
            Self::Aborted,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Why a record was not accepted. Rejections are counted, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// Identifier already seen in this run (or a seeded earlier run)
    Duplicate,
    /// Score below the quality threshold
    LowQuality,
    /// No tracklist while tracks are required
    MissingTracks,
    /// No identifier or broken track numbering
    Malformed,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::LowQuality => "low_quality",
            Self::MissingTracks => "missing_tracks",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
