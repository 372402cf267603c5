//! JSON export of finished runs
//!
//! Each run becomes one pretty-printed document named after its genre and
//! finish time. Earlier documents double as a record of which mixes are
//! already known, so a later run can skip them.

use crate::output::traits::{ExportDocument, ExportReceipt, ExportSink, OutputResult};
use crate::state::RunSnapshot;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes one JSON document per run into a directory
#[derive(Debug, Clone)]
pub struct JsonExporter {
    dir: PathBuf,
}

impl JsonExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{genre_slug}_{YYYYmmdd_HHMMSS}.json`, from the run's finish time
    pub fn file_name(snapshot: &RunSnapshot) -> String {
        format!(
            "{}_{}.json",
            genre_slug(&snapshot.genre),
            snapshot.finished_at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl ExportSink for JsonExporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn export(&self, snapshot: &RunSnapshot) -> OutputResult<ExportReceipt> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(snapshot));

        let document = ExportDocument::from_snapshot(snapshot);
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&path, json)?;

        tracing::info!("Exported {} mixes to {}", document.total_mixes, path.display());
        Ok(ExportReceipt {
            sink: self.name(),
            location: path.display().to_string(),
            records: document.total_mixes,
        })
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed to one `_`
pub fn genre_slug(genre: &str) -> String {
    let mut slug = String::with_capacity(genre.len());
    for c in genre.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Reads a previously exported document
pub fn read_document(path: &Path) -> OutputResult<ExportDocument> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// The parts of an export needed to know which mixes it holds
#[derive(Deserialize)]
struct ExportedIdentifiers {
    genre: String,
    #[serde(default)]
    mixes: Vec<ExportedMix>,
}

#[derive(Deserialize)]
struct ExportedMix {
    id: String,
}

/// Identifiers of every mix exported for `genre` under `dir`
///
/// A missing directory yields an empty set. Files that are not readable
/// exports are skipped with a warning.
///
/// # Arguments
///
/// * `dir` - Export directory to scan (not recursive)
/// * `genre` - Genre name, compared case-insensitively
pub fn load_exported_identifiers(dir: &Path, genre: &str) -> OutputResult<HashSet<String>> {
    let mut ids = HashSet::new();
    if !dir.is_dir() {
        return Ok(ids);
    }

    let wanted = genre.trim().to_lowercase();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<ExportedIdentifiers>(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(export) if export.genre.to_lowercase() == wanted => {
                ids.extend(export.mixes.into_iter().map(|m| m.id));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable export {}: {}", path.display(), e),
        }
    }

    Ok(ids)
}
