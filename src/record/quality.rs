//! Record quality scoring
//!
//! A record's score is the weighted share of fields it actually carries.
//! Weights are integer points so that sums are exact and a record sitting
//! right on the threshold compares the way it reads. The weights add up to
//! 110, so the sum is capped at 100 points: a record may miss up to 10
//! points of optional fields and still score 1.0.

use crate::record::{Record, DURATION_KEY};

/// Default minimum score for acceptance
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.3;

const IDENTIFIER_POINTS: u32 = 20;
const TITLE_POINTS: u32 = 20;
const URL_POINTS: u32 = 10;
const AUTHOR_POINTS: u32 = 10;
const DATE_POINTS: u32 = 10;
const GENRE_POINTS: u32 = 10;
const TRACKS_POINTS: u32 = 20;
const DURATION_POINTS: u32 = 5;
const OTHER_METADATA_POINTS: u32 = 5;
/// Points that make a perfect score
const FULL_POINTS: u32 = 100;

/// Result of scoring one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    /// Weighted completeness in [0, 1]
    pub score: f64,
    /// Share of tracks with both artist and title; 1.0 for an empty tracklist
    pub track_completion: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct QualityScorer {
    threshold: f64,
}

impl QualityScorer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scores a record. Pure: the same record always yields the same score.
    pub fn score(&self, record: &Record) -> QualityScore {
        let present = |s: &str| !s.trim().is_empty();
        let mut points = 0;

        if present(&record.id) {
            points += IDENTIFIER_POINTS;
        }
        if present(&record.title) {
            points += TITLE_POINTS;
        }
        if present(&record.url) {
            points += URL_POINTS;
        }
        if record.author.as_deref().is_some_and(present) {
            points += AUTHOR_POINTS;
        }
        if record.date.is_some() {
            points += DATE_POINTS;
        }
        if !record.genres.is_empty() {
            points += GENRE_POINTS;
        }
        if !record.tracks.is_empty() {
            points += TRACKS_POINTS;
        }
        if record.duration().is_some_and(present) {
            points += DURATION_POINTS;
        }
        if record.metadata.keys().any(|key| key != DURATION_KEY) {
            points += OTHER_METADATA_POINTS;
        }

        QualityScore {
            score: f64::from(points.min(FULL_POINTS)) / f64::from(FULL_POINTS),
            track_completion: track_completion(record),
        }
    }

    pub fn accepts(&self, score: &QualityScore) -> bool {
        score.score >= self.threshold
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD)
    }
}

fn track_completion(record: &Record) -> f64 {
    if record.tracks.is_empty() {
        return 1.0;
    }
    let complete = record.tracks.iter().filter(|t| t.is_complete()).count();
    complete as f64 / record.tracks.len() as f64
}
