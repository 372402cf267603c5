//! Crawl engine - genre run orchestration
//!
//! This module contains the run loop that drives one genre from `Idle` to a
//! terminal phase:
//! - Resolving the genre to its style code
//! - Fetching sequential page batches through the [`BatchScheduler`]
//! - Filtering every extracted record (structure, duplicates, tracks, quality)
//! - Publishing progress and freezing the run into a [`RunSnapshot`]

use crate::config::{Config, GenreTable};
use crate::crawler::dedup::Deduplicator;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::parser::RecordExtractor;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scheduler::BatchScheduler;
use crate::record::{QualityScorer, RawRecord};
use crate::state::{RejectionReason, RunPhase, RunProgress, RunSnapshot, RunState};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Run parameters, resolved from configuration and CLI overrides
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub target_count: usize,
    /// Records per batch; a batch spans `ceil(batch_size / page_size)` pages
    pub batch_size: usize,
    pub page_size: usize,
    pub max_concurrent_fetches: usize,
    pub retry: RetryPolicy,
    pub delay_between_batches: Duration,
    pub quality_threshold: f64,
    pub require_tracks: bool,
    /// Consecutive all-failed batches after which the run gives up
    pub max_failed_batches: u32,
    pub time_filter: Option<String>,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        let crawler = &config.crawler;
        Self {
            target_count: crawler.target_count,
            batch_size: crawler.batch_size,
            page_size: config.source.page_size,
            max_concurrent_fetches: crawler.max_concurrent_fetches,
            retry: RetryPolicy::from_config(crawler),
            delay_between_batches: Duration::from_secs_f64(crawler.delay_between_batches.max(0.0)),
            quality_threshold: crawler.quality_threshold,
            require_tracks: crawler.require_tracks,
            max_failed_batches: crawler.max_failed_batches,
            time_filter: None,
        }
    }

    pub fn pages_per_batch(&self) -> usize {
        let page_size = self.page_size.max(1);
        self.batch_size.div_ceil(page_size).max(1)
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        let crawler = crate::config::CrawlerConfig::default();
        Self {
            target_count: crawler.target_count,
            batch_size: crawler.batch_size,
            page_size: crate::config::SourceConfig::default().page_size,
            max_concurrent_fetches: crawler.max_concurrent_fetches,
            retry: RetryPolicy::from_config(&crawler),
            delay_between_batches: Duration::from_secs_f64(crawler.delay_between_batches),
            quality_threshold: crawler.quality_threshold,
            require_tracks: crawler.require_tracks,
            max_failed_batches: crawler.max_failed_batches,
            time_filter: None,
        }
    }
}

/// Genre crawl engine
///
/// One engine can run several genres in turn. Each run gets its own run
/// state, worker pool and deduplicator; only the collaborators, settings and
/// the cancellation token are shared between runs.
pub struct CrawlEngine<F, E> {
    fetcher: Arc<F>,
    extractor: Arc<E>,
    genres: GenreTable,
    settings: CrawlSettings,
    scorer: QualityScorer,
    cancel: CancellationToken,
    progress: watch::Sender<RunProgress>,
}

impl<F, E> CrawlEngine<F, E>
where
    F: PageFetcher + 'static,
    E: RecordExtractor + 'static,
{
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Fetch collaborator (network access)
    /// * `extractor` - Extract collaborator (page markup to raw records)
    /// * `genres` - Genre name to style code table
    /// * `settings` - Run parameters
    pub fn new(fetcher: F, extractor: E, genres: GenreTable, settings: CrawlSettings) -> Self {
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(extractor),
            genres,
            scorer: QualityScorer::new(settings.quality_threshold),
            settings,
            cancel: CancellationToken::new(),
            progress,
        }
    }

    /// Uses an externally owned token, e.g. one wired to Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receives a progress value after every batch
    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn genres(&self) -> &GenreTable {
        &self.genres
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Crawls one genre up to the configured target with a fresh deduplicator
    pub async fn run(&self, genre: &str) -> Result<RunSnapshot> {
        self.run_with(genre, self.settings.target_count, Deduplicator::new())
            .await
    }

    /// Crawls one genre
    ///
    /// # Arguments
    ///
    /// * `genre` - Genre name or alias
    /// * `target` - Accepted records to stop at
    /// * `dedup` - Identifiers to treat as already seen, e.g. from earlier runs
    ///
    /// # Returns
    ///
    /// * `Ok(RunSnapshot)` - The finished run, whatever its terminal phase
    /// * `Err(CrawlError)` - The run lifecycle was violated
    pub async fn run_with(&self, genre: &str, target: usize, dedup: Deduplicator) -> Result<RunSnapshot> {
        let entry = self.genres.lookup(genre);
        let mut state = RunState::new(
            entry.map_or(genre, |e| e.name.as_str()),
            target,
            self.settings.page_size,
            self.settings.time_filter.clone(),
        );

        let Some(entry) = entry else {
            tracing::error!("Unknown genre '{}': no style code configured, aborting", genre);
            state.abort(format!("unknown genre '{}'", genre))?;
            self.publish(&state);
            return Ok(state.finish());
        };

        state.begin(&entry.style_code)?;
        tracing::info!(
            "Crawling {} (style {}) for {} mixes, {} page(s) per batch",
            entry.name,
            entry.style_code,
            target,
            self.settings.pages_per_batch()
        );
        self.publish(&state);

        let mut scheduler = BatchScheduler::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.extractor),
            &self.settings,
            &entry.style_code,
            self.cancel.clone(),
        );
        let pages_per_batch = self.settings.pages_per_batch();
        let max_failed_batches = self.settings.max_failed_batches.max(1);

        let outcome = loop {
            if state.is_target_reached() {
                break RunPhase::Completed;
            }
            if !state.cursor().has_more() {
                break RunPhase::Exhausted;
            }
            if self.cancel.is_cancelled() {
                break RunPhase::Cancelled;
            }

            let Some(batch) = scheduler.fetch_batch(state.cursor(), pages_per_batch).await else {
                break RunPhase::Cancelled;
            };

            state.record_batch(batch.pages.len(), batch.failed_pages());
            for page in batch.pages {
                match page.outcome {
                    Ok(extracted) => {
                        for raw in extracted.records {
                            self.admit(&mut state, &dedup, &entry.name, raw);
                        }
                    }
                    Err(e) => tracing::warn!(
                        "Skipping page {} (offset {}) after {} attempt(s): {}",
                        page.page_number,
                        page.offset,
                        page.attempts,
                        e
                    ),
                }
            }
            state.set_cursor(batch.next_cursor);

            let progress = state.progress();
            tracing::info!(
                "{}: {}/{} mixes after {} page(s), {} page error(s)",
                progress.genre,
                progress.accepted,
                progress.target,
                progress.pages_fetched,
                progress.page_errors
            );
            self.progress.send_replace(progress);

            if state.consecutive_failed_batches() >= max_failed_batches {
                tracing::warn!(
                    "{} consecutive batches failed completely; giving up on {}",
                    state.consecutive_failed_batches(),
                    entry.name
                );
                break RunPhase::Exhausted;
            }
        };

        scheduler.shutdown();
        state.transition(outcome)?;
        self.publish(&state);

        let snapshot = state.finish();
        tracing::info!(
            "{} finished as {}: {} mixes, {} rejected, {} error(s) in {:.1}s",
            snapshot.genre,
            snapshot.phase,
            snapshot.accepted_count(),
            snapshot.rejections.total(),
            snapshot.error_count,
            snapshot.elapsed_seconds
        );
        Ok(snapshot)
    }

    /// Runs one extracted record through the filters and keeps it if it passes
    fn admit(&self, state: &mut RunState, dedup: &Deduplicator, genre: &str, mut raw: RawRecord) {
        raw.genres.insert(genre.to_string());
        let mut record = raw.into_record();

        if let Some(defect) = record.defect() {
            tracing::debug!("Malformed record '{}': {}", record.title, defect);
            state.reject(RejectionReason::Malformed);
            return;
        }

        // Marks the record seen even if a later filter drops it
        if !dedup.check_and_mark(&record.id) {
            state.reject(RejectionReason::Duplicate);
            return;
        }

        if self.settings.require_tracks && record.tracks.is_empty() {
            state.reject(RejectionReason::MissingTracks);
            return;
        }

        let score = self.scorer.score(&record);
        if !self.scorer.accepts(&score) {
            tracing::debug!(
                "Low quality record '{}': {:.2} < {:.2}",
                record.title,
                score.score,
                self.scorer.threshold()
            );
            state.reject(RejectionReason::LowQuality);
            return;
        }

        record.quality_score = score.score;
        record.track_completion = score.track_completion;
        if !state.accept(record) {
            tracing::debug!("Target reached; dropping overflow record");
        }
    }

    fn publish(&self, state: &RunState) {
        self.progress.send_replace(state.progress());
    }
}
