use crate::config::types::{Config, CrawlerConfig, QueueConfig, StorageConfig, TlsConfig};
use crate::ConfigError;
use regex::Regex;
use std::path::Path;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_queue_config(&config.queue)?;
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates event log configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "queue path cannot be empty".to_string(),
        ));
    }

    validate_topic("topic", &config.topic)?;
    validate_topic("group-id", &config.group_id)?;

    if let Some(dead_letter) = &config.dead_letter_topic {
        validate_topic("dead-letter-topic", dead_letter)?;
        if *dead_letter == config.topic {
            return Err(ConfigError::Validation(format!(
                "dead-letter-topic must differ from topic '{}'",
                config.topic
            )));
        }
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be >= 1".to_string(),
        ));
    }

    if let Some(tls) = config.enabled_tls() {
        validate_tls_config(tls)?;
    }

    Ok(())
}

/// Enabled TLS needs all three files, and they must exist
fn validate_tls_config(config: &TlsConfig) -> Result<(), ConfigError> {
    let files = [
        ("ca-file", &config.ca_file),
        ("cert-file", &config.cert_file),
        ("key-file", &config.key_file),
    ];

    for (name, file) in files {
        let Some(file) = file.as_deref().filter(|f| !f.is_empty()) else {
            return Err(ConfigError::Tls(format!(
                "{} is required when TLS is enabled",
                name
            )));
        };
        if !Path::new(file).is_file() {
            return Err(ConfigError::Tls(format!(
                "{} '{}' does not exist",
                name, file
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.interval < 1 {
        return Err(ConfigError::Validation(format!(
            "crawler interval must be >= 1s, got {}s",
            config.interval
        )));
    }

    for (url, url_config) in &config.urls {
        validate_check_url(url)?;

        if url_config.interval == Some(0) {
            return Err(ConfigError::Validation(format!(
                "interval for '{}' must be >= 1s",
                url
            )));
        }

        if let Some(pattern) = url_config.pattern() {
            Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern(format!("pattern for '{}': {}", url, e))
            })?;
        }
    }

    Ok(())
}

/// Validates result database configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Check URLs must be absolute http(s) URLs
fn validate_check_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid URL '{}': {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "URL '{}' must use the http or https scheme",
            url
        )));
    }

    Ok(())
}

fn validate_topic(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ConfigError::Validation(format!(
            "{} must contain only alphanumeric characters, '-', '_' and '.', got '{}'",
            field, name
        )));
    }

    Ok(())
}
