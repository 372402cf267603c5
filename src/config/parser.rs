//! Configuration file loading
//!
//! The file is read once per load; the hash recorded with stored runs is
//! taken over the same bytes that were parsed.

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// # Arguments
///
/// * `content` - TOML document
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration, defaults filled in
/// * `Err(ConfigError)` - Malformed TOML or a value that fails validation
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads a configuration file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use mixdb_crawler::config::load_config;
///
/// let config = load_config(Path::new("mixdb.toml")).unwrap();
/// println!("Batch size: {}", config.crawler.batch_size);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Hex-encoded SHA-256 of configuration text
pub fn hash_config(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a configuration together with the hash of the loaded text
///
/// Recorded with every stored run so results can be traced back to the
/// settings that produced them.
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_config(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const USER_AGENT: &str = r#"
[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"
"#;

    #[test]
    fn test_load_valid_config() {
        let config_content = format!(
            r#"
[crawler]
target-count = 500
batch-size = 50
max-concurrent-fetches = 8
quality-threshold = 0.4
{USER_AGENT}
[output]
export-dir = "./out"
database-path = "./mixes.db"

[[genre]]
name = "Techno"
style-code = "TA"
aliases = ["Techno / Acid"]
estimated-count = 42933
"#
        );

        let file = create_temp_config(&config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.target_count, 500);
        assert_eq!(config.crawler.batch_size, 50);
        assert_eq!(config.crawler.max_concurrent_fetches, 8);
        // Unlisted keys keep their defaults
        assert_eq!(config.crawler.max_retries, 3);
        assert_eq!(config.crawler.delay_between_batches, 2.0);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(config.output.database_path.as_deref(), Some("./mixes.db"));
        assert_eq!(config.genres.len(), 1);
        assert_eq!(config.genres[0].estimated_count, Some(42933));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = create_temp_config(USER_AGENT);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.target_count, 3000);
        assert_eq!(config.crawler.batch_size, 100);
        assert_eq!(config.source.page_size, 25);
        assert_eq!(config.source.base_url, "https://www.mixesdb.com");
        assert_eq!(config.genre_table().len(), 11);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/mixdb.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(parse_config("crawler = [unclosed"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_kebab_case_keys_only() {
        // snake_case keys are unknown and ignored, so the default survives
        let config = parse_config(&format!("[crawler]\ntarget_count = 5\n{USER_AGENT}")).unwrap();
        assert_eq!(config.crawler.target_count, 3000);
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = format!(
            r#"
[crawler]
quality-threshold = 2.0
{USER_AGENT}
"#
        );

        assert!(matches!(parse_config(&config_content), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_hash_tracks_content() {
        assert_eq!(hash_config("a = 1"), hash_config("a = 1"));
        assert_ne!(hash_config("a = 1"), hash_config("a = 2"));
        assert_eq!(hash_config("").len(), 64);
    }

    #[test]
    fn test_loaded_hash_matches_file_hash() {
        let file = create_temp_config(USER_AGENT);
        let (_, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(hash, hash_config(USER_AGENT));
    }
}
