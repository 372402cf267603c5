//! Page fetching
//!
//! This module defines the narrow fetch seam the engine talks to
//! ([`PageFetcher`]) and its HTTP implementation for the MixesDB Explorer:
//! - Building HTTP clients with proper user agent strings
//! - Building Explorer listing URLs in the parameter order the site uses
//! - Honoring robots.txt for the catalog host
//! - Classifying failures as transient or permanent

use crate::config::{Config, SourceConfig, UserAgentConfig};
use crate::robots::{fetch_robots, ParsedRobots};
use crate::state::PageCursor;
use crate::CrawlError;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

/// Time filter value meaning "no year restriction"
pub const FRESH_TIME_FILTER: &str = "Fresh";

/// Longest robots.txt crawl delay honored between batches
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(300);

/// Failure of one unit of page work
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network trouble, timeouts, 5xx: worth another attempt
    #[error("transient failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// HTTP 429; `retry_after` is the server's requested wait, if it sent one
    #[error("rate limited at {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    /// Not found, forbidden, disallowed by robots.txt and the like
    #[error("permanent failure for {url}: {message}")]
    Permanent { url: String, message: String },

    /// The page arrived but could not be read as a listing
    #[error("could not extract records from {url}: {message}")]
    Extraction { url: String, message: String },

    /// A transient failure that outlasted every retry
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Returns true if retrying could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// Server-requested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// One Explorer page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub style_code: String,
    /// `None` or `"Fresh"` means no year filter
    pub time_filter: Option<String>,
    pub cursor: PageCursor,
}

impl PageRequest {
    pub fn page_number(&self) -> u32 {
        self.cursor.page_number()
    }
}

/// A fetched page body, not yet interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub url: String,
    pub page_number: u32,
    pub offset: usize,
    pub body: String,
    /// Continuation signal from the transport, when it knows better than the markup
    pub has_more: Option<bool>,
}

/// Fetches listing pages. Implementations must be shareable across workers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds an Explorer listing URL
///
/// MixesDB expects every filter parameter to be present, in a fixed order,
/// even when empty.
///
/// # Arguments
///
/// * `base_url` - Root of the catalog site
/// * `source` - Source configuration (explorer path, page size)
/// * `request` - The page to build the URL for
pub fn build_explorer_url(
    base_url: &Url,
    source: &SourceConfig,
    request: &PageRequest,
) -> Result<Url, url::ParseError> {
    let mut url = base_url.join(&source.explorer_path)?;

    let year = match request.time_filter.as_deref().map(str::trim) {
        None | Some("") => "",
        Some(filter) if filter.eq_ignore_ascii_case(FRESH_TIME_FILTER) => "",
        Some(filter) => filter,
    };
    let count = source.page_size.to_string();
    let offset = request.cursor.offset().to_string();

    url.query_pairs_mut()
        .clear()
        .append_pair("do", "mx")
        .append_pair("mode", "")
        .append_pair("cat1", "")
        .append_pair("cat2", "")
        .append_pair("jnC", "")
        .append_pair("style", &request.style_code)
        .append_pair("year", year)
        .append_pair("tlC", "1")
        .append_pair("tlI", "1")
        .append_pair("so", "")
        .append_pair("tmatch1", "")
        .append_pair("tmatch2", "")
        .append_pair("jnTm", "")
        .append_pair("usesFile", "")
        .append_pair("minHotnessLevel", "")
        .append_pair("count", &count)
        .append_pair("order", "hotness")
        .append_pair("sort", "desc")
        .append_pair("offset", &offset);

    Ok(url)
}

/// Maps a non-success status to a fetch error
///
/// | Status | Result |
/// |--------|--------|
/// | 2xx | `None` |
/// | 429 | `RateLimited` |
/// | 408, 5xx | `Transient` |
/// | other 4xx, 3xx | `Permanent` |
pub fn classify_status(status: StatusCode, url: &str, retry_after: Option<Duration>) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let error = if status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::RateLimited {
            url: url.to_string(),
            retry_after,
        }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        FetchError::Transient {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        }
    } else {
        FetchError::Permanent {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        }
    };
    Some(error)
}

/// Classifies a transport error from reqwest
fn classify_transport_error(error: &reqwest::Error, url: &str) -> FetchError {
    let message = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    };

    if error.is_builder() || error.is_redirect() {
        FetchError::Permanent {
            url: url.to_string(),
            message,
        }
    } else {
        FetchError::Transient {
            url: url.to_string(),
            message,
        }
    }
}

/// Converts a robots.txt `Crawl-delay` to a pacing delay
///
/// Negative and unrepresentable values are ignored; anything longer than
/// [`MAX_CRAWL_DELAY`] is clamped to it.
fn crawl_delay_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_CRAWL_DELAY);
    Some(delay.min(MAX_CRAWL_DELAY))
}

/// Reads a `Retry-After` header given in seconds
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Fetches Explorer pages over HTTP
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    source: SourceConfig,
    /// Product token matched against robots.txt groups
    robots_agent: String,
    robots: OnceCell<ParsedRobots>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawler.request_timeout),
        )?;
        let base_url = Url::parse(&config.source.base_url)?;

        Ok(Self {
            client,
            base_url,
            source: config.source.clone(),
            robots_agent: config.user_agent.crawler_name.clone(),
            robots: OnceCell::new(),
        })
    }

    pub fn explorer_url(&self, request: &PageRequest) -> Result<Url, url::ParseError> {
        build_explorer_url(&self.base_url, &self.source, request)
    }

    /// robots.txt rules, fetched on first use
    async fn robots(&self) -> &ParsedRobots {
        self.robots
            .get_or_init(|| async {
                if self.source.respect_robots {
                    fetch_robots(&self.client, &self.base_url).await
                } else {
                    ParsedRobots::allow_all()
                }
            })
            .await
    }

    /// Crawl-delay the site asks of this crawler, if any
    pub async fn crawl_delay(&self) -> Option<Duration> {
        self.robots()
            .await
            .crawl_delay(&self.robots_agent)
            .and_then(crawl_delay_from_secs)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, FetchError> {
        let url = self.explorer_url(request).map_err(|e| FetchError::Permanent {
            url: self.source.explorer_path.clone(),
            message: format!("cannot build explorer URL: {}", e),
        })?;
        let url_str = url.to_string();

        if !self.robots().await.is_allowed(&url_str, &self.robots_agent) {
            return Err(FetchError::Permanent {
                url: url_str,
                message: "disallowed by robots.txt".to_string(),
            });
        }

        tracing::debug!("Fetching page {}: {}", request.page_number(), url_str);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &url_str))?;

        if let Some(error) = classify_status(response.status(), &url_str, retry_after(&response)) {
            return Err(error);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient {
                url: url_str.clone(),
                message: format!("failed to read body: {}", e),
            })?;

        Ok(RawPage {
            url: url_str,
            page_number: request.page_number(),
            offset: request.cursor.offset(),
            body,
            has_more: None,
        })
    }
}
