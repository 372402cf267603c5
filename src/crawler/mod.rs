//! Crawler module for genre mix runs
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching of Explorer listing pages with error classification
//! - Extraction of mix records and tracklists from listing markup
//! - Bounded retry with exponential backoff
//! - Batch scheduling on a bounded worker pool with global pacing
//! - Run-scoped deduplication
//! - Overall run coordination

mod coordinator;
mod dedup;
mod fetcher;
mod parser;
mod retry;
mod scheduler;

#[cfg(test)]
mod testing;

pub use coordinator::{CrawlEngine, CrawlSettings};
pub use dedup::Deduplicator;
pub use fetcher::{
    build_explorer_url, build_http_client, classify_status, FetchError, HttpFetcher, PageFetcher,
    PageRequest, RawPage, FRESH_TIME_FILTER, MAX_CRAWL_DELAY,
};
pub use parser::{ExtractedPage, MixesDbExtractor, RecordExtractor};
pub use retry::{Attempted, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use scheduler::{BatchResult, BatchScheduler, PageResult};
