//! Robots.txt handling module
//!
//! The crawler only ever talks to one host, so robots.txt is fetched once per
//! fetcher and kept for its lifetime.

mod parser;

pub use parser::ParsedRobots;

use reqwest::Client;
use url::Url;

/// Fetches robots.txt for the catalog host
///
/// A missing file, an error status or a network failure all yield
/// [`ParsedRobots::allow_all`]; robots.txt never fails a run.
///
/// # Arguments
///
/// * `client` - HTTP client carrying the crawler's user agent
/// * `base_url` - Root URL of the catalog site
pub async fn fetch_robots(client: &Client, base_url: &Url) -> ParsedRobots {
    let robots_url = match base_url.join("/robots.txt") {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Cannot build robots.txt URL from {}: {}", base_url, e);
            return ParsedRobots::allow_all();
        }
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("robots.txt unreachable at {}: {}", robots_url, e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!(
            "robots.txt at {} returned {}; allowing all",
            robots_url,
            response.status()
        );
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => {
            tracing::info!("Loaded robots.txt from {}", robots_url);
            ParsedRobots::from_content(&body)
        }
        Err(e) => {
            tracing::debug!("Failed to read robots.txt body: {}", e);
            ParsedRobots::allow_all()
        }
    }
}
