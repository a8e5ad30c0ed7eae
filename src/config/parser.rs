use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - The file is missing, unreadable, not valid TOML or
///   fails validation
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use awm::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Checking {} URLs", config.crawler.urls.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;

    tracing::info!("using config {}", path.display());
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so the checker and persister of one deployment can be
/// matched to the same configuration.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// `$HOME/.config/awm/config.toml`, or a relative `config.toml` without a home
pub fn default_config_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".config/awm/config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
