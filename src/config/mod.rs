//! Configuration module for AWM
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! file shared by the checker and the persister.
//!
//! # Example
//!
//! ```no_run
//! use awm::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Default check interval: {}s", config.crawler.interval);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, QueueConfig, StorageConfig, TlsConfig, UrlConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, default_config_path, load_config, load_config_with_hash};
