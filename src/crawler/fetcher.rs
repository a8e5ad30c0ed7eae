//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the checker, including:
//! - Building the shared HTTP client with the total request timeout
//! - One GET request per check
//! - Optional pattern matching against the response body
//! - Error classification into check outcomes

use crate::check::CheckResult;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

/// Something that can check a URL
///
/// Failures are data: every call yields a [`CheckResult`].
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, pattern: Option<&Regex>) -> CheckResult;
}

/// [`Fetch`] implementation backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, pattern: Option<&Regex>) -> CheckResult {
        fetch_url(&self.client, url, pattern, self.timeout).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `timeout` - Total time allowed for one request, body included
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!("awm/{}", env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Whether `pattern` matches anywhere in `body`, or `None` without a pattern
pub fn pattern_status(pattern: Option<&Regex>, body: &str) -> Option<bool> {
    pattern.map(|re| re.is_match(body))
}

/// Checks a URL with exactly one GET request
///
/// # Classification
///
/// | Condition | Outcome |
/// |-----------|---------|
/// | Connection could not be established | CLIENT_ERROR |
/// | Request or body read timed out | TIMEOUT |
/// | Any other transport failure | UNKNOWN_ERROR |
/// | Response received (any status code) | SUCCESSFUL |
///
/// The same classification applies to errors raised while reading the body.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to check
/// * `pattern` - Optional pattern searched for in the body
/// * `timeout` - The client's total timeout, reported in timeout messages
pub async fn fetch_url(
    client: &Client,
    url: &str,
    pattern: Option<&Regex>,
    timeout: Duration,
) -> CheckResult {
    let start = Utc::now();

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return classify_error(url, start, &e, timeout),
    };

    let status = response.status().as_u16();

    match response.text().await {
        Ok(body) => {
            let matched = pattern_status(pattern, &body);
            CheckResult::success(url, start, Utc::now(), status, matched)
        }
        Err(e) => classify_error(url, start, &e, timeout),
    }
}

fn classify_error(
    url: &str,
    start: chrono::DateTime<Utc>,
    err: &reqwest::Error,
    timeout: Duration,
) -> CheckResult {
    if err.is_connect() {
        let message = error_chain(err);
        tracing::warn!("{}: connection error: {}", url, message);
        CheckResult::client_error(url, start, message)
    } else if err.is_timeout() {
        tracing::warn!("{}: timeout after {}s", url, timeout.as_secs_f64());
        CheckResult::timeout(
            url,
            start,
            format!("request timed out after {}s", timeout.as_secs_f64()),
        )
    } else {
        tracing::error!("{}: {}", url, err);
        CheckResult::unknown_error(url, start, error_chain(err))
    }
}

/// Renders an error together with all of its sources
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
