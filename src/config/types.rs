use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for AWM
///
/// Both processes read the same document; the checker uses `queue` and
/// `crawler`, the persister uses `queue` and `storage`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub queue: QueueConfig,
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
}

/// Event log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Location of the event log database
    pub path: String,

    /// Topic the check results are published to
    pub topic: String,

    /// Consumer group the persister commits its offsets under
    #[serde(rename = "group-id", default = "default_group_id")]
    pub group_id: String,

    /// Topic receiving payloads the persister could not store
    #[serde(rename = "dead-letter-topic", default)]
    pub dead_letter_topic: Option<String>,

    /// How long a subscriber waits before polling an idle topic again (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Optional TLS material for the transport
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the TLS settings only when they are switched on
    pub fn enabled_tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref().filter(|tls| tls.enabled)
    }
}

/// TLS material for the transport connection
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "ca-file", default)]
    pub ca_file: Option<String>,

    #[serde(rename = "cert-file", default)]
    pub cert_file: Option<String>,

    #[serde(rename = "key-file", default)]
    pub key_file: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Check scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Default check interval in seconds. Also the total request timeout.
    pub interval: u64,

    /// URLs to check, with optional per-URL overrides
    #[serde(default)]
    pub urls: BTreeMap<String, UrlConfig>,
}

impl CrawlerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

/// Per-URL overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlConfig {
    /// Check interval in seconds for this URL
    #[serde(default)]
    pub interval: Option<u64>,

    /// Regular expression searched for in the response body
    #[serde(default)]
    pub pattern: Option<String>,
}

impl UrlConfig {
    /// The per-URL interval if set, else `default`
    pub fn effective_interval(&self, default: Duration) -> Duration {
        self.interval.map(Duration::from_secs).unwrap_or(default)
    }

    /// The configured pattern; an empty string counts as no pattern
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref().filter(|p| !p.is_empty())
    }
}

/// Result database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// How many times the reconnect delay doubles during a storage outage
    ///
    /// Inserts are retried until they succeed or shutdown is requested. Past
    /// this many retries every failure is logged as an error.
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// First pause between reconnect attempts (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl StorageConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_group_id() -> String {
    "awm-group-1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}
