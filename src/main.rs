//! MixDB Crawler main entry point
//!
//! This is the command-line interface for the genre-scoped MixesDB crawler.

use anyhow::{bail, Context};
use clap::Parser;
use mixdb_crawler::config::{
    load_config_with_hash, validate_crawler_config, validate_time_filter, Config, GenreTable,
};
use mixdb_crawler::crawler::{CrawlEngine, CrawlSettings, Deduplicator, HttpFetcher, MixesDbExtractor};
use mixdb_crawler::output::{
    export_snapshot, generate_markdown_summary, load_exported_identifiers, ExportSink, JsonExporter,
    OutputResult, SqliteExporter,
};
use mixdb_crawler::storage::open_storage;
use mixdb_crawler::{CrawlError, RunPhase, RunSnapshot};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// MixDB Crawler: a polite genre-scoped mix catalog crawler
///
/// Walks the MixesDB Explorer listing for each requested genre, keeps mixes
/// that pass deduplication and quality checks, and exports each genre run as
/// JSON (and to SQLite when a database is configured).
#[derive(Parser, Debug)]
#[command(name = "mixdb-crawler")]
#[command(version)]
#[command(about = "A polite genre-scoped MixesDB crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "mixdb.toml")]
    config: PathBuf,

    /// Genre to crawl, by name or alias; repeat for several, or pass `all`
    #[arg(short, long = "genre", value_name = "GENRE")]
    genres: Vec<String>,

    /// Accepted mixes to collect per genre
    #[arg(long)]
    target: Option<usize>,

    /// Records per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent page fetches
    #[arg(long)]
    workers: Option<usize>,

    /// Minimum quality score in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,

    /// `Fresh`, a year (2023) or a decade (2010s)
    #[arg(long)]
    time_filter: Option<String>,

    /// Keep mixes that have no tracklist
    #[arg(long)]
    no_require_tracks: bool,

    /// List known genres and their style codes, then exit
    #[arg(long, conflicts_with = "dry_run")]
    list_genres: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// One genre the invocation will crawl
#[derive(Debug)]
struct GenreRun {
    name: String,
    style_code: Option<String>,
    target: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;
    let genres = config.genre_table();

    if cli.list_genres {
        print_genres(&genres);
        return Ok(());
    }

    let runs = select_genres(&genres, &cli.genres, config.crawler.target_count)?;

    if cli.dry_run {
        handle_dry_run(&config, &runs, cli.time_filter.as_deref());
        return Ok(());
    }

    handle_crawl(config, config_hash, genres, runs, cli.time_filter).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mixdb_crawler=info,warn"),
            1 => EnvFilter::new("mixdb_crawler=debug,info"),
            2 => EnvFilter::new("mixdb_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides and re-validates the crawl parameters
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    let crawler = &mut config.crawler;
    if let Some(target) = cli.target {
        crawler.target_count = target;
    }
    if let Some(batch_size) = cli.batch_size {
        crawler.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        crawler.max_concurrent_fetches = workers;
    }
    if let Some(threshold) = cli.threshold {
        crawler.quality_threshold = threshold;
    }
    if cli.no_require_tracks {
        crawler.require_tracks = false;
    }

    validate_crawler_config(crawler).context("Invalid command-line override")?;
    if let Some(filter) = &cli.time_filter {
        validate_time_filter(filter)?;
    }
    Ok(())
}

/// Resolves the requested genres to runs
///
/// `all` selects every configured genre, each capped at its estimated count
/// when the site reports one. Unknown names are kept: the engine aborts them
/// without fetching, and the abort shows up in the summary.
fn select_genres(genres: &GenreTable, requested: &[String], target: usize) -> anyhow::Result<Vec<GenreRun>> {
    if requested.is_empty() {
        bail!("No genre given; use --genre NAME (repeatable) or --genre all, see --list-genres");
    }

    if requested.iter().any(|g| g.trim().eq_ignore_ascii_case("all")) {
        return Ok(genres
            .entries()
            .iter()
            .map(|entry| GenreRun {
                name: entry.name.clone(),
                style_code: Some(entry.style_code.clone()),
                target: entry.estimated_count.map_or(target, |estimate| target.min(estimate)),
            })
            .collect());
    }

    let mut runs: Vec<GenreRun> = Vec::with_capacity(requested.len());
    for name in requested {
        let run = match genres.resolve(name) {
            Ok(entry) => GenreRun {
                name: entry.name.clone(),
                style_code: Some(entry.style_code.clone()),
                target,
            },
            Err(e) => {
                tracing::warn!("{}", e);
                GenreRun {
                    name: name.trim().to_string(),
                    style_code: None,
                    target,
                }
            }
        };
        if !runs.iter().any(|r| r.name == run.name) {
            runs.push(run);
        }
    }
    Ok(runs)
}

/// Handles --list-genres: prints the genre table
fn print_genres(genres: &GenreTable) {
    println!("=== Genres ({}) ===\n", genres.len());
    for entry in genres.entries() {
        let estimate = entry
            .estimated_count
            .map_or_else(|| "unknown".to_string(), |n| n.to_string());
        println!("  {:<24} {:<4} ~{} mixes", entry.name, entry.style_code, estimate);
        if !entry.aliases.is_empty() {
            println!("  {:<24} aliases: {}", "", entry.aliases.join(", "));
        }
    }
}

/// Handles --dry-run: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, runs: &[GenreRun], time_filter: Option<&str>) {
    println!("=== MixDB Crawler Dry Run ===\n");

    let settings = CrawlSettings::from_config(config);
    println!("Crawler Configuration:");
    println!("  Batch size: {} ({} page(s) per batch)", settings.batch_size, settings.pages_per_batch());
    println!("  Concurrent fetches: {}", settings.max_concurrent_fetches);
    println!("  Max retries: {}", settings.retry.max_retries());
    println!("  Delay between batches: {:?}", settings.delay_between_batches);
    println!("  Quality threshold: {}", settings.quality_threshold);
    println!("  Require tracks: {}", settings.require_tracks);
    println!("  Time filter: {}", time_filter.unwrap_or("none"));

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSource:");
    println!("  {}{}", config.source.base_url, config.source.explorer_path);
    println!("  Page size: {}", config.source.page_size);
    println!("  Respect robots.txt: {}", config.source.respect_robots);

    println!("\nOutput:");
    println!("  Export dir: {}", config.output.export_dir);
    println!("  Database: {}", config.output.database_path.as_deref().unwrap_or("none"));

    println!("\nGenres ({}):", runs.len());
    for run in runs {
        match &run.style_code {
            Some(code) => println!("  - {} ({}), target {}", run.name, code, run.target),
            None => println!("  - {} (unknown genre, would abort)", run.name),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl: one engine run per genre, exported as it finishes
async fn handle_crawl(
    config: Config,
    config_hash: String,
    genres: GenreTable,
    runs: Vec<GenreRun>,
    time_filter: Option<String>,
) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(&config).context("Failed to build HTTP fetcher")?;
    let extractor = MixesDbExtractor::new(&config.source.base_url, config.source.page_size)
        .context("Failed to build extractor")?;

    let mut settings = CrawlSettings::from_config(&config);
    settings.time_filter = time_filter;
    if config.source.respect_robots {
        if let Some(delay) = fetcher.crawl_delay().await {
            if delay > settings.delay_between_batches {
                tracing::info!("robots.txt asks for a {:?} crawl delay; pacing batches accordingly", delay);
                settings.delay_between_batches = delay;
            }
        }
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    let export_dir = PathBuf::from(&config.output.export_dir);
    let json = JsonExporter::new(&export_dir);
    let sqlite = match &config.output.database_path {
        Some(path) => {
            let storage = open_storage(Path::new(path))
                .with_context(|| format!("Failed to open database {}", path))?;
            Some(SqliteExporter::new(storage, Some(config_hash.clone())))
        }
        None => None,
    };
    let mut sinks: Vec<&dyn ExportSink> = vec![&json];
    if let Some(sqlite) = &sqlite {
        sinks.push(sqlite);
    }

    let engine = CrawlEngine::new(fetcher, extractor, genres, settings).with_cancellation(cancel.clone());

    let mut snapshots: Vec<RunSnapshot> = Vec::with_capacity(runs.len());
    for run in &runs {
        if cancel.is_cancelled() {
            break;
        }

        let known = known_identifiers(&export_dir, sqlite.as_ref(), &run.name);
        if !known.is_empty() {
            tracing::info!("{}: {} mixes already known from earlier runs", run.name, known.len());
        }

        let snapshot = engine
            .run_with(&run.name, run.target, Deduplicator::with_seen(known))
            .await?;

        if snapshot.phase != RunPhase::Aborted {
            export_snapshot(&sinks, &snapshot);
        }
        snapshots.push(snapshot);
    }

    if !snapshots.is_empty() {
        std::fs::create_dir_all(&export_dir)?;
        let summary_path = export_dir.join(format!(
            "summary_{}.md",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        generate_markdown_summary(&snapshots, &summary_path)?;
        tracing::info!("Summary written to {}", summary_path.display());
    }

    if let Some(first) = snapshots.first() {
        if snapshots.iter().all(|s| s.phase == RunPhase::Aborted) {
            return Err(CrawlError::UnknownGenre {
                genre: first.genre.clone(),
            }
            .into());
        }
    }

    Ok(())
}

/// Identifiers of a genre's mixes from earlier exports and the database
fn known_identifiers(export_dir: &Path, sqlite: Option<&SqliteExporter>, genre: &str) -> HashSet<String> {
    let mut sources = vec![("earlier exports", load_exported_identifiers(export_dir, genre))];
    if let Some(sqlite) = sqlite {
        sources.push(("the database", sqlite.known_identifiers(genre)));
    }
    merge_known(genre, sources)
}

/// Unions the readable sources; an unreadable one is logged and skipped
fn merge_known(genre: &str, sources: Vec<(&str, OutputResult<HashSet<String>>)>) -> HashSet<String> {
    let mut known = HashSet::new();
    for (source, ids) in sources {
        match ids {
            Ok(ids) => known.extend(ids),
            Err(e) => tracing::warn!("Cannot read known {} mixes from {}: {}", genre, source, e),
        }
    }
    known
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdb_crawler::output::OutputError;

    #[test]
    fn test_select_all_caps_targets_at_estimates() {
        let runs = select_genres(&GenreTable::builtin(), &["all".to_string()], 3000).unwrap();
        assert_eq!(runs.len(), 11);

        let pure_minimal = runs.iter().find(|r| r.name == "Pure Minimal").unwrap();
        assert_eq!(pure_minimal.target, 617);
        let house = runs.iter().find(|r| r.name == "House").unwrap();
        assert_eq!(house.target, 3000);
    }

    #[test]
    fn test_select_resolves_aliases_once() {
        let requested = vec!["techno".to_string(), "Techno / Acid".to_string(), "Polka".to_string()];
        let runs = select_genres(&GenreTable::builtin(), &requested, 100).unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, "Techno");
        assert_eq!(runs[0].style_code.as_deref(), Some("TA"));
        assert_eq!(runs[1].name, "Polka");
        assert!(runs[1].style_code.is_none());
    }

    #[test]
    fn test_unreadable_source_does_not_block_seeding() {
        let stored: HashSet<String> = ["a1".to_string()].into_iter().collect();
        let sources = vec![
            ("earlier exports", Err(OutputError::Write("permission denied".to_string()))),
            ("the database", Ok(stored)),
        ];

        let known = merge_known("Techno", sources);
        assert_eq!(known.len(), 1);
        assert!(known.contains("a1"));
    }

    #[test]
    fn test_missing_export_dir_seeds_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let known = known_identifiers(&dir.path().join("absent"), None, "Techno");
        assert!(known.is_empty());
    }

    #[test]
    fn test_select_requires_a_genre() {
        assert!(select_genres(&GenreTable::builtin(), &[], 100).is_err());
    }
}
