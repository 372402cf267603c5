//! Mix records and their tracklists
//!
//! A [`RawRecord`] is what the extractor pulls off a listing page. It becomes a
//! [`Record`] once its identifier has been derived; the engine fills in the
//! quality fields when the record is accepted.

mod identifier;
mod quality;

pub use identifier::record_identifier;
pub use quality::{QualityScore, QualityScorer, DEFAULT_QUALITY_THRESHOLD};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Metadata key holding the mix running time (`H:MM:SS`)
pub const DURATION_KEY: &str = "duration";

/// One entry of a mix tracklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// 1-based position in source order
    pub position: u32,
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Cue time as printed in the tracklist, when the listing has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl Track {
    /// Both artist and title are present and non-blank
    pub fn is_complete(&self) -> bool {
        let filled = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());
        filled(&self.title) && filled(&self.artist)
    }
}

/// A mix as extracted from one listing page, before identification and scoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub date: Option<NaiveDate>,
    pub genres: BTreeSet<String>,
    pub tracks: Vec<Track>,
    pub metadata: BTreeMap<String, Value>,
}

impl RawRecord {
    /// Derives the stable identifier; blank titles produce an empty identifier
    pub fn into_record(self) -> Record {
        let id = record_identifier(self.date, self.author.as_deref(), &self.title)
            .unwrap_or_default();
        Record {
            id,
            title: self.title,
            url: self.url,
            author: self.author,
            date: self.date,
            genres: self.genres,
            tracks: self.tracks,
            metadata: self.metadata,
            quality_score: 0.0,
            track_completion: 0.0,
        }
    }
}

/// A structured mix entry with its ordered tracklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub date: Option<NaiveDate>,
    pub genres: BTreeSet<String>,
    pub tracks: Vec<Track>,
    pub metadata: BTreeMap<String, Value>,
    pub quality_score: f64,
    pub track_completion: f64,
}

impl Record {
    /// Track positions are exactly `1..=len`, in order
    pub fn has_contiguous_positions(&self) -> bool {
        self.tracks
            .iter()
            .enumerate()
            .all(|(i, track)| track.position as usize == i + 1)
    }

    /// Describes why the record cannot be kept, if it is structurally broken
    pub fn defect(&self) -> Option<String> {
        if self.id.is_empty() {
            return Some(format!("no identifier could be derived for '{}'", self.url));
        }
        if !self.has_contiguous_positions() {
            return Some(format!("track positions of {} are not 1..{}", self.id, self.tracks.len()));
        }
        None
    }

    pub fn duration(&self) -> Option<&str> {
        self.metadata.get(DURATION_KEY).and_then(Value::as_str)
    }
}
