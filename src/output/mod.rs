//! Output module for exporting finished runs
//!
//! This module handles:
//! - Exporting run snapshots as JSON documents
//! - Recording runs, mixes and tracklists in SQLite
//! - Generating a markdown summary across genre runs
//! - Recovering already-exported identifiers for cross-run deduplication

mod json;
mod markdown;
mod sqlite_output;
mod traits;

pub use json::{genre_slug, load_exported_identifiers, read_document, JsonExporter};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sqlite_output::SqliteExporter;
pub use traits::{ExportDocument, ExportReceipt, ExportSink, OutputError, OutputResult};

use crate::state::RunSnapshot;

/// Hands a finished run to every sink
///
/// A failing sink is logged and skipped so the others still get the run.
///
/// # Arguments
///
/// * `sinks` - The configured export sinks
/// * `snapshot` - The finished run
///
/// # Returns
///
/// Receipts of the sinks that succeeded
pub fn export_snapshot(sinks: &[&dyn ExportSink], snapshot: &RunSnapshot) -> Vec<ExportReceipt> {
    sinks
        .iter()
        .filter_map(|sink| match sink.export(snapshot) {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                tracing::warn!("{} export of {} failed: {}", sink.name(), snapshot.genre, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunPhase, RunState};

    struct FailingSink;

    impl ExportSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn export(&self, _snapshot: &RunSnapshot) -> OutputResult<ExportReceipt> {
            Err(OutputError::Write("disk full".to_string()))
        }
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let dir = tempfile::TempDir::new().unwrap();
        let json = JsonExporter::new(dir.path());
        let sinks: [&dyn ExportSink; 2] = [&FailingSink, &json];

        let mut state = RunState::new("Techno", 1, 25, None);
        state.begin("TA").unwrap();
        state.transition(RunPhase::Exhausted).unwrap();
        let receipts = export_snapshot(&sinks, &state.finish());

        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].sink, "json");
    }
}
