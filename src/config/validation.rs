use crate::config::types::{Config, CrawlerConfig, GenreEntry, SourceConfig, UserAgentConfig};
use crate::crawler::FRESH_TIME_FILTER;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

const MAX_CONCURRENT_FETCHES: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_source_config(&config.source)?;
    validate_output_config(&config.output)?;
    validate_genres(&config.genres)?;
    Ok(())
}

/// Validates crawl run parameters
pub fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.target_count == 0 {
        return Err(ConfigError::Validation(
            "target_count must be >= 1".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > MAX_CONCURRENT_FETCHES
    {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and {}, got {}",
            MAX_CONCURRENT_FETCHES, config.max_concurrent_fetches
        )));
    }

    if config.max_retries == 0 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1 (it counts total attempts)".to_string(),
        ));
    }

    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry_base_delay_ms ({}) cannot exceed retry_max_delay_ms ({})",
            config.retry_base_delay_ms, config.retry_max_delay_ms
        )));
    }

    if !config.delay_between_batches.is_finite() || config.delay_between_batches < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay_between_batches must be a non-negative number of seconds, got {}",
            config.delay_between_batches
        )));
    }

    if !(0.0..=1.0).contains(&config.quality_threshold) {
        return Err(ConfigError::Validation(format!(
            "quality_threshold must be between 0.0 and 1.0, got {}",
            config.quality_threshold
        )));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the catalog source
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if config.base_url.trim().is_empty() {
        return Err(ConfigError::InvalidUrl("base_url cannot be empty".to_string()));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if !config.explorer_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "explorer_path must start with '/', got '{}'",
            config.explorer_path
        )));
    }

    if config.page_size == 0 {
        return Err(ConfigError::Validation(
            "page_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.export_dir.is_empty() {
        return Err(ConfigError::Validation(
            "export_dir cannot be empty".to_string(),
        ));
    }

    if matches!(config.database_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "database_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates genre entries; names and aliases share one case-insensitive namespace
fn validate_genres(genres: &[GenreEntry]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for entry in genres {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "genre name cannot be empty".to_string(),
            ));
        }

        if entry.style_code.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "genre '{}' must have a style code",
                entry.name
            )));
        }

        for label in std::iter::once(&entry.name).chain(entry.aliases.iter()) {
            let key = label.trim().to_lowercase();
            if key.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "genre '{}' has an empty alias",
                    entry.name
                )));
            }
            if !names.insert(key) {
                return Err(ConfigError::Validation(format!(
                    "genre name or alias '{}' is defined more than once",
                    label
                )));
            }
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}

/// Validates a run time filter: `Fresh`, a year (`2023`) or a decade (`2010s`)
pub fn validate_time_filter(filter: &str) -> Result<(), ConfigError> {
    let filter = filter.trim();
    if filter.eq_ignore_ascii_case(FRESH_TIME_FILTER) {
        return Ok(());
    }

    let is_year = |s: &str| s.len() == 4 && s.chars().all(|c| c.is_ascii_digit());
    let valid = match filter.strip_suffix('s') {
        Some(decade) => is_year(decade) && decade.ends_with('0'),
        None => is_year(filter),
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "time filter must be '{}', a year like 2023 or a decade like 2010s, got '{}'",
            FRESH_TIME_FILTER, filter
        )))
    }
}
