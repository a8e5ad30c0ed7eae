//! AWM: availability website monitor
//!
//! This crate checks a configured set of URLs on independent schedules,
//! publishes every check outcome to a durable event log and persists those
//! events into a relational store.
//!
//! The two halves of the pipeline run as separate processes:
//! - `awm-checker` runs one timed loop per URL ([`crawler`]) and publishes
//!   [`CheckResult`]s to the event log ([`queue`])
//! - `awm-persister` consumes the log ([`persister`]) and inserts one row per
//!   event into the database ([`storage`])

pub mod check;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod persister;
pub mod queue;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for AWM operations
#[derive(Debug, Error)]
pub enum AwmError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Event log error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Malformed check result: {0}")]
    Decode(#[from] check::DecodeError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid check pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid TLS settings: {0}")]
    Tls(String),
}

/// Result type alias for AWM operations
pub type Result<T> = std::result::Result<T, AwmError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use check::{CheckOutcome, CheckResult};
pub use config::Config;
