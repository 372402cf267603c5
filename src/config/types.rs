use crate::config::genres::GenreTable;
use serde::Deserialize;

/// Main configuration structure for the mix crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "genre")]
    pub genres: Vec<GenreEntry>,
}

impl Config {
    /// Configured genres, or the built-in MixesDB table when none are listed
    pub fn genre_table(&self) -> GenreTable {
        if self.genres.is_empty() {
            GenreTable::builtin()
        } else {
            GenreTable::from_entries(self.genres.clone())
        }
    }
}

/// Crawl run parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of accepted records a run aims for
    #[serde(rename = "target-count")]
    pub target_count: usize,

    /// Records per batch; governs how many pages a batch spans
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Worker ceiling for concurrent page fetches
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: usize,

    /// Total attempts per page before a transient failure becomes permanent
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First retry backoff (milliseconds), doubled per attempt
    #[serde(rename = "retry-base-delay-ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single retry backoff (milliseconds)
    #[serde(rename = "retry-max-delay-ms")]
    pub retry_max_delay_ms: u64,

    /// Politeness throttle between batches (seconds)
    #[serde(rename = "delay-between-batches")]
    pub delay_between_batches: f64,

    /// Minimum quality score for a record to be accepted
    #[serde(rename = "quality-threshold")]
    pub quality_threshold: f64,

    /// Reject records without a tracklist
    #[serde(rename = "require-tracks")]
    pub require_tracks: bool,

    /// Consecutive fully failed batches before a run gives up
    #[serde(rename = "max-failed-batches")]
    pub max_failed_batches: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            target_count: 3000,
            batch_size: 100,
            max_concurrent_fetches: 4,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
            delay_between_batches: 2.0,
            quality_threshold: 0.3,
            require_tracks: true,
            max_failed_batches: 3,
            request_timeout: 30,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Catalog site the crawler walks
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the Explorer listing, relative to `base-url`
    #[serde(rename = "explorer-path")]
    pub explorer_path: String,

    /// Records listed per Explorer page
    #[serde(rename = "page-size")]
    pub page_size: usize,

    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.mixesdb.com".to_string(),
            explorer_path: "/w/MixesDB:Explorer/Mixes".to_string(),
            page_size: 25,
            respect_robots: true,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for JSON run exports
    #[serde(rename = "export-dir")]
    pub export_dir: String,

    /// Optional SQLite database mirroring every export
    #[serde(rename = "database-path")]
    pub database_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            export_dir: "./exports".to_string(),
            database_path: None,
        }
    }
}

/// Genre name to MixesDB style code mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenreEntry {
    pub name: String,

    #[serde(rename = "style-code")]
    pub style_code: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    /// Rough number of mixes the site lists for this genre
    #[serde(default, rename = "estimated-count")]
    pub estimated_count: Option<usize>,
}
