//! Configuration module for the mix crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and resolving genre names to MixesDB style codes.
//!
//! # Example
//!
//! ```no_run
//! use mixdb_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mixdb.toml")).unwrap();
//! println!("Target per genre: {}", config.crawler.target_count);
//! ```

mod genres;
mod parser;
mod types;
mod validation;

// Re-export types
pub use genres::GenreTable;
pub use types::{
    Config, CrawlerConfig, GenreEntry, OutputConfig, SourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{hash_config, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_crawler_config, validate_time_filter};
