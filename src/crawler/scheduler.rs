//! Batch scheduling for page fetches
//!
//! This module handles:
//! - Concurrent fetches of a page batch on a bounded worker pool
//! - Retry of each page through the [`RetryPolicy`]
//! - Reassembling results in listing order
//! - Global pacing: a batch never starts before `delay_between_batches`
//!   has passed since the previous batch finished

use crate::crawler::fetcher::{FetchError, PageFetcher, PageRequest};
use crate::crawler::parser::{ExtractedPage, RecordExtractor};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::CrawlSettings;
use crate::state::PageCursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of one page: extracted records, or the error that ended it
#[derive(Debug)]
pub struct PageResult {
    pub page_number: u32,
    pub offset: usize,
    /// Attempts made; zero if the page never got a worker
    pub attempts: u32,
    pub outcome: Result<ExtractedPage, FetchError>,
}

impl PageResult {
    fn failed(cursor: PageCursor, error: FetchError) -> Self {
        Self {
            page_number: cursor.page_number(),
            offset: cursor.offset(),
            attempts: 0,
            outcome: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Backoff waits taken before the final attempt
    pub fn backoffs(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Pages of one batch, in listing order
#[derive(Debug)]
pub struct BatchResult {
    pub pages: Vec<PageResult>,
    pub next_cursor: PageCursor,
}

impl BatchResult {
    pub fn has_more(&self) -> bool {
        self.next_cursor.has_more()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_ok()).count()
    }

    pub fn all_failed(&self) -> bool {
        !self.pages.is_empty() && self.failed_pages() == self.pages.len()
    }
}

/// Drives page batches for one run
///
/// The worker pool is created with the scheduler and closed when it is shut
/// down or dropped, whichever comes first.
pub struct BatchScheduler<F, E> {
    fetcher: Arc<F>,
    extractor: Arc<E>,
    retry: RetryPolicy,
    workers: Arc<Semaphore>,
    delay_between_batches: Duration,
    style_code: String,
    time_filter: Option<String>,
    cancel: CancellationToken,
    last_batch_finished: Option<Instant>,
}

impl<F, E> BatchScheduler<F, E>
where
    F: PageFetcher + 'static,
    E: RecordExtractor + 'static,
{
    /// Creates a scheduler for one style code
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Fetch collaborator shared by all workers
    /// * `extractor` - Extract collaborator run on each fetched page
    /// * `settings` - Worker ceiling, retry policy and pacing
    /// * `style_code` - Site filter value for the genre
    /// * `cancel` - Interrupts the pacing wait between batches
    pub fn new(
        fetcher: Arc<F>,
        extractor: Arc<E>,
        settings: &CrawlSettings,
        style_code: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            retry: settings.retry.clone(),
            workers: Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1))),
            delay_between_batches: settings.delay_between_batches,
            style_code: style_code.to_string(),
            time_filter: settings.time_filter.clone(),
            cancel,
            last_batch_finished: None,
        }
    }

    /// Waits until the politeness delay since the last batch has passed
    ///
    /// Returns false if cancellation fired first.
    async fn pace(&self) -> bool {
        let Some(finished) = self.last_batch_finished else {
            return !self.cancel.is_cancelled();
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(finished + self.delay_between_batches) => true,
        }
    }

    /// Fetches the `pages` pages starting at `cursor`
    ///
    /// Every requested page yields a [`PageResult`], failed ones included,
    /// except pages after one that reported the end of the listing.
    ///
    /// # Returns
    ///
    /// * `Some(BatchResult)` - The batch, in listing order
    /// * `None` - Cancelled during the pacing wait; nothing was fetched
    pub async fn fetch_batch(&mut self, cursor: PageCursor, pages: usize) -> Option<BatchResult> {
        if !self.pace().await {
            return None;
        }

        if pages == 0 || !cursor.has_more() {
            return Some(BatchResult {
                pages: Vec::new(),
                next_cursor: cursor,
            });
        }

        let mut tasks = JoinSet::new();
        for (index, page_cursor) in cursor.following(pages).enumerate() {
            let request = PageRequest {
                style_code: self.style_code.clone(),
                time_filter: self.time_filter.clone(),
                cursor: page_cursor,
            };
            let workers = Arc::clone(&self.workers);
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let retry = self.retry.clone();

            tasks.spawn(async move {
                let result = fetch_page_with_retry(workers, fetcher, extractor, retry, request).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<PageResult>> = (0..pages).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!("Page worker task failed: {}", e),
            }
        }
        self.last_batch_finished = Some(Instant::now());

        let mut results = Vec::with_capacity(pages);
        let mut has_more = true;
        for (slot, page_cursor) in slots.into_iter().zip(cursor.following(pages)) {
            let result = slot.unwrap_or_else(|| {
                PageResult::failed(
                    page_cursor,
                    FetchError::Permanent {
                        url: format!("page {}", page_cursor.page_number()),
                        message: "worker task did not complete".to_string(),
                    },
                )
            });
            let ends_listing = matches!(&result.outcome, Ok(page) if !page.has_next_page);
            results.push(result);

            if ends_listing {
                has_more = false;
                break;
            }
        }

        if results.len() < pages {
            tracing::debug!(
                "Listing ended at page {}; dropping {} page(s) past the end",
                results.last().map_or(0, |r| r.page_number),
                pages - results.len()
            );
        }

        Some(BatchResult {
            pages: results,
            next_cursor: cursor.advance(pages, has_more),
        })
    }

    /// Closes the worker pool; pages still waiting for a worker fail
    pub fn shutdown(&self) {
        self.workers.close();
    }
}

impl<F, E> Drop for BatchScheduler<F, E> {
    fn drop(&mut self) {
        self.workers.close();
    }
}

/// Fetches and extracts one page on a pool worker, retrying transient failures
async fn fetch_page_with_retry<F, E>(
    workers: Arc<Semaphore>,
    fetcher: Arc<F>,
    extractor: Arc<E>,
    retry: RetryPolicy,
    request: PageRequest,
) -> PageResult
where
    F: PageFetcher,
    E: RecordExtractor,
{
    let cursor = request.cursor;
    let Ok(_permit) = workers.acquire_owned().await else {
        return PageResult::failed(
            cursor,
            FetchError::Permanent {
                url: format!("page {}", cursor.page_number()),
                message: "worker pool is shut down".to_string(),
            },
        );
    };

    let fetcher = &*fetcher;
    let extractor = &*extractor;
    let request = &request;
    let label = format!("page {}", cursor.page_number());

    let attempted = retry
        .run(&label, move || async move {
            let raw = fetcher.fetch_page(request).await?;
            let mut page = extractor.extract_records(&raw)?;
            if let Some(has_more) = raw.has_more {
                page.has_next_page = has_more;
            }
            Ok(page)
        })
        .await;

    match &attempted.result {
        Ok(page) => tracing::debug!("{}: {} records", label, page.records.len()),
        Err(e) => tracing::warn!("{} failed: {}", label, e),
    }

    PageResult {
        page_number: cursor.page_number(),
        offset: cursor.offset(),
        attempts: attempted.attempts,
        outcome: attempted.result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{bare_record, StubExtractor, StubFetcher};

    fn settings(workers: usize, delay: Duration) -> CrawlSettings {
        CrawlSettings {
            max_concurrent_fetches: workers,
            delay_between_batches: delay,
            retry: RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
            ..CrawlSettings::default()
        }
    }

    fn scheduler(
        fetcher: StubFetcher,
        extractor: StubExtractor,
        settings: &CrawlSettings,
    ) -> (BatchScheduler<StubFetcher, StubExtractor>, Arc<StubFetcher>) {
        let fetcher = Arc::new(fetcher);
        let scheduler = BatchScheduler::new(
            Arc::clone(&fetcher),
            Arc::new(extractor),
            settings,
            "TA",
            CancellationToken::new(),
        );
        (scheduler, fetcher)
    }

    fn listing(pages: u32) -> StubExtractor {
        (1..=pages).fold(StubExtractor::new(), |ex, n| {
            ex.page(n, vec![bare_record(&format!("mix {n}"))], true)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_in_page_order() {
        // Earlier pages are slower, so they finish last
        let fetcher = StubFetcher::ok().with_latency(|page| Duration::from_millis(100 * (5 - page as u64)));
        let (mut scheduler, _) = scheduler(fetcher, listing(4), &settings(4, Duration::ZERO));

        let batch = scheduler.fetch_batch(PageCursor::start(25), 4).await.unwrap();
        let order: Vec<u32> = batch.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(batch.next_cursor.offset(), 100);
        assert!(batch.has_more());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_ceiling_independent_of_batch_size() {
        let fetcher = StubFetcher::ok().with_latency(|_| Duration::from_millis(50));
        let (mut scheduler, fetcher) = scheduler(fetcher, listing(6), &settings(2, Duration::ZERO));

        let batch = scheduler.fetch_batch(PageCursor::start(25), 6).await.unwrap();
        assert_eq!(batch.pages.len(), 6);
        assert_eq!(fetcher.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_is_kept_in_batch() {
        let fetcher = StubFetcher::with_script(|page, _| {
            if page == 2 {
                Err(FetchError::Permanent {
                    url: "stub".to_string(),
                    message: "HTTP 404".to_string(),
                })
            } else {
                Ok(())
            }
        });
        let (mut scheduler, _) = scheduler(fetcher, listing(3), &settings(4, Duration::ZERO));

        let batch = scheduler.fetch_batch(PageCursor::start(25), 3).await.unwrap();
        assert_eq!(batch.pages.len(), 3);
        assert!(batch.pages[0].is_ok());
        assert!(!batch.pages[1].is_ok());
        assert_eq!(batch.pages[1].attempts, 1);
        assert!(batch.pages[2].is_ok());
        assert_eq!(batch.failed_pages(), 1);
        assert!(!batch.all_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_page_retried() {
        let fetcher = StubFetcher::with_script(|_, attempt| {
            if attempt <= 2 {
                Err(FetchError::Transient {
                    url: "stub".to_string(),
                    message: "timeout".to_string(),
                })
            } else {
                Ok(())
            }
        });
        let (mut scheduler, fetcher) = scheduler(fetcher, listing(1), &settings(1, Duration::ZERO));

        let batch = scheduler.fetch_batch(PageCursor::start(25), 1).await.unwrap();
        assert!(batch.pages[0].is_ok());
        assert_eq!(batch.pages[0].backoffs(), 2);
        assert_eq!(fetcher.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_end_truncates_batch() {
        let extractor = StubExtractor::new()
            .page(1, vec![bare_record("a")], true)
            .page(2, vec![bare_record("b")], false);
        let (mut scheduler, _) = scheduler(StubFetcher::ok(), extractor, &settings(4, Duration::ZERO));

        let batch = scheduler.fetch_batch(PageCursor::start(25), 4).await.unwrap();
        assert_eq!(batch.pages.len(), 2);
        assert!(!batch.has_more());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_paced() {
        let delay = Duration::from_secs(2);
        let fetcher = StubFetcher::ok().with_latency(|_| Duration::from_millis(300));
        let (mut scheduler, fetcher) = scheduler(fetcher, listing(2), &settings(1, delay));

        let start = Instant::now();
        let first = scheduler.fetch_batch(PageCursor::start(25), 1).await.unwrap();
        scheduler.fetch_batch(first.next_cursor, 1).await.unwrap();

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 2);
        // The first batch is not delayed
        assert!(calls[0].1.duration_since(start) < Duration::from_millis(1));
        // Measured from the end of the first batch, not its start
        assert!(calls[1].1.duration_since(calls[0].1) >= Duration::from_millis(300) + delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pacing() {
        let token = CancellationToken::new();
        let mut scheduler = BatchScheduler::new(
            Arc::new(StubFetcher::ok()),
            Arc::new(listing(2)),
            &settings(1, Duration::from_secs(60)),
            "TA",
            token.clone(),
        );

        let first = scheduler.fetch_batch(PageCursor::start(25), 1).await.unwrap();
        token.cancel();
        assert!(scheduler.fetch_batch(first.next_cursor, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_fails_waiting_pages() {
        let (mut scheduler, fetcher) = scheduler(StubFetcher::ok(), listing(2), &settings(1, Duration::ZERO));
        scheduler.shutdown();

        let batch = scheduler.fetch_batch(PageCursor::start(25), 2).await.unwrap();
        assert!(batch.all_failed());
        assert_eq!(fetcher.fetch_count(), 0);
    }
}
