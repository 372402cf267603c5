//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of the genre runs
//! made in one invocation: outcome per genre, rejection breakdown and totals.

use crate::output::traits::OutputResult;
use crate::state::RunSnapshot;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of finished runs
///
/// # Arguments
///
/// * `snapshots` - The finished runs, in the order they ran
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(snapshots: &[RunSnapshot], output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(snapshots);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats finished runs as markdown
pub fn format_markdown_summary(snapshots: &[RunSnapshot]) -> String {
    let mut md = String::new();

    md.push_str("# MixesDB Crawl Summary\n\n");

    if snapshots.is_empty() {
        md.push_str("No genres were crawled.\n");
        return md;
    }

    md.push_str("## Runs\n\n");
    md.push_str("| Genre | Style | Outcome | Mixes | Target | Success | Pages | Page Errors | Failed Batches | Time |\n");
    md.push_str("|-------|-------|---------|-------|--------|---------|-------|-------------|----------------|------|\n");
    for run in snapshots {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {:.1}% | {} | {} | {} | {:.1}s |\n",
            run.genre,
            run.style_code.as_deref().unwrap_or("-"),
            run.phase,
            run.records.len(),
            run.target_count,
            run.success_rate() * 100.0,
            run.pages_fetched,
            run.page_errors,
            run.error_count,
            run.elapsed_seconds
        ));
    }
    md.push('\n');

    md.push_str("## Rejections\n\n");
    md.push_str("| Genre | Duplicate | Low Quality | Missing Tracks | Malformed | Over Target |\n");
    md.push_str("|-------|-----------|-------------|----------------|-----------|-------------|\n");
    for run in snapshots {
        let r = &run.rejections;
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            run.genre, r.duplicate, r.low_quality, r.missing_tracks, r.malformed, run.discarded_overflow
        ));
    }
    md.push('\n');

    let aborted: Vec<&RunSnapshot> = snapshots.iter().filter(|s| s.abort_reason.is_some()).collect();
    if !aborted.is_empty() {
        md.push_str("## Aborted\n\n");
        for run in aborted {
            md.push_str(&format!(
                "- **{}**: {}\n",
                run.genre,
                run.abort_reason.as_deref().unwrap_or_default()
            ));
        }
        md.push('\n');
    }

    let total_mixes: usize = snapshots.iter().map(|s| s.records.len()).sum();
    let total_target: usize = snapshots.iter().map(|s| s.target_count).sum();
    let total_pages: u64 = snapshots.iter().map(|s| s.pages_fetched).sum();
    let total_seconds: f64 = snapshots.iter().map(|s| s.elapsed_seconds).sum();

    md.push_str("## Totals\n\n");
    md.push_str(&format!("- **Genres**: {}\n", snapshots.len()));
    md.push_str(&format!("- **Mixes**: {} of {} targeted\n", total_mixes, total_target));
    md.push_str(&format!("- **Pages Fetched**: {}\n", total_pages));
    md.push_str(&format!(
        "- **Elapsed**: {:.1} seconds ({:.2} minutes)\n",
        total_seconds,
        total_seconds / 60.0
    ));

    md
}
