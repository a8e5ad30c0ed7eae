//! The check result record and its wire encoding

use crate::check::outcome::{CheckOutcome, UnknownOutcome};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding a wire payload into a [`CheckResult`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("{0}")]
    Outcome(#[from] UnknownOutcome),

    #[error("inconsistent check result: {0}")]
    Invalid(String),
}

/// Immutable record of one check attempt
///
/// Results can only be built through the outcome-specific constructors, so
/// the field presence rules always hold:
/// - a successful result has an end time and a response status, and no message
/// - a failed result has a message, and no end time, status or pattern flag
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    url: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    response_status: Option<u16>,
    pattern_matched: Option<bool>,
    outcome: CheckOutcome,
    message: Option<String>,
}

impl CheckResult {
    /// A response was received (any status code)
    ///
    /// `pattern_matched` must be `None` when no pattern was configured.
    pub fn success(
        url: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        response_status: u16,
        pattern_matched: Option<bool>,
    ) -> Self {
        Self {
            url: url.into(),
            start_time,
            end_time: Some(end_time),
            response_status: Some(response_status),
            pattern_matched,
            outcome: CheckOutcome::Successful,
            message: None,
        }
    }

    /// The request did not complete within the configured timeout
    pub fn timeout(
        url: impl Into<String>,
        start_time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::failed(url, start_time, CheckOutcome::Timeout, message)
    }

    /// The connection could not be established
    pub fn client_error(
        url: impl Into<String>,
        start_time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::failed(url, start_time, CheckOutcome::ClientError, message)
    }

    /// Any other failure
    pub fn unknown_error(
        url: impl Into<String>,
        start_time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::failed(url, start_time, CheckOutcome::UnknownError, message)
    }

    fn failed(
        url: impl Into<String>,
        start_time: DateTime<Utc>,
        outcome: CheckOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            start_time,
            end_time: None,
            response_status: None,
            pattern_matched: None,
            outcome,
            message: Some(message.into()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn response_status(&self) -> Option<u16> {
        self.response_status
    }

    pub fn pattern_matched(&self) -> Option<bool> {
        self.pattern_matched
    }

    pub fn outcome(&self) -> CheckOutcome {
        self.outcome
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Time between start and end, if the request completed
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// [`duration`](Self::duration) in (fractional) seconds
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration()
            .and_then(|d| d.num_microseconds())
            .map(|us| us as f64 / 1_000_000.0)
    }

    /// Encodes the result as the canonical JSON wire payload
    ///
    /// Timestamps are RFC 3339 with an explicit UTC offset, absent values are
    /// `null` and `duration` is given in seconds.
    pub fn encode(&self) -> Vec<u8> {
        json!({
            "url": self.url,
            "start_dt": self.start_time.to_rfc3339(),
            "end_dt": self.end_time.map(|t| t.to_rfc3339()),
            "duration": self.duration_secs(),
            "response_status": self.response_status,
            "response_regex_status": self.pattern_matched,
            "status": self.outcome.as_str(),
            "status_message": self.message,
        })
        .to_string()
        .into_bytes()
    }

    /// Decodes a wire payload produced by [`encode`](Self::encode)
    ///
    /// `duration` is derived and therefore ignored. A failed result without a
    /// message decodes with an empty message.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireResult = serde_json::from_slice(payload)?;

        if wire.url.is_empty() {
            return Err(DecodeError::Invalid("url is empty".to_string()));
        }

        let start_time = parse_timestamp(&wire.start_dt)?;
        let end_time = wire.end_dt.as_deref().map(parse_timestamp).transpose()?;
        let outcome: CheckOutcome = wire.status.parse()?;

        if outcome.is_success() {
            let (Some(end_time), Some(response_status)) = (end_time, wire.response_status) else {
                return Err(DecodeError::Invalid(format!(
                    "{} result for {} needs end_dt and response_status",
                    outcome, wire.url
                )));
            };
            if wire.status_message.is_some() {
                return Err(DecodeError::Invalid(format!(
                    "{} result for {} carries a status message",
                    outcome, wire.url
                )));
            }
            return Ok(Self::success(
                wire.url,
                start_time,
                end_time,
                response_status,
                wire.response_regex_status,
            ));
        }

        if end_time.is_some()
            || wire.response_status.is_some()
            || wire.response_regex_status.is_some()
        {
            return Err(DecodeError::Invalid(format!(
                "{} result for {} carries response fields",
                outcome, wire.url
            )));
        }

        Ok(Self::failed(
            wire.url,
            start_time,
            outcome,
            wire.status_message.unwrap_or_default(),
        ))
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.outcome)?;
        match (self.duration_secs(), self.message()) {
            (Some(secs), _) => write!(f, " took {:.3} s", secs),
            (None, Some(message)) => write!(f, ": {}", message),
            (None, None) => Ok(()),
        }
    }
}

/// Shape of the JSON payload on the event log
#[derive(Debug, Deserialize)]
struct WireResult {
    url: String,
    start_dt: String,
    end_dt: Option<String>,
    response_status: Option<u16>,
    response_regex_status: Option<bool>,
    status: String,
    status_message: Option<String>,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| DecodeError::Timestamp {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 11, 1, 0, 0, 0).unwrap()
    }

    fn all_outcomes() -> Vec<CheckResult> {
        vec![
            CheckResult::success(
                "http://localhost",
                start(),
                start() + Duration::seconds(1),
                200,
                None,
            ),
            CheckResult::success(
                "http://localhost/match",
                start(),
                start() + Duration::milliseconds(250),
                404,
                Some(true),
            ),
            CheckResult::timeout("http://localhost", start(), "timed out after 10s"),
            CheckResult::client_error("http://localhost", start(), "connection refused"),
            CheckResult::unknown_error("http://localhost", start(), ""),
        ]
    }

    #[test]
    fn test_field_presence_follows_outcome() {
        for result in all_outcomes() {
            let success = result.outcome().is_success();
            assert_eq!(result.end_time().is_some(), success, "{}", result);
            assert_eq!(result.response_status().is_some(), success, "{}", result);
            assert_eq!(result.message().is_some(), !success, "{}", result);
            if !success {
                assert!(result.pattern_matched().is_none());
            }
        }
    }

    #[test]
    fn test_encode_decode_preserves_result() {
        for result in all_outcomes() {
            let decoded = CheckResult::decode(&result.encode()).unwrap();
            assert_eq!(decoded, result);
        }
    }

    #[test]
    fn test_decode_keeps_sub_second_precision() {
        let now = Utc::now();
        let result = CheckResult::success("http://localhost", now, now, 200, None);
        let decoded = CheckResult::decode(&result.encode()).unwrap();
        assert_eq!(decoded.start_time(), now);
    }

    #[test]
    fn test_wire_format() {
        let result = CheckResult::client_error("http://localhost", start(), "refused");
        let value: serde_json::Value = serde_json::from_slice(&result.encode()).unwrap();

        assert_eq!(value["url"], "http://localhost");
        assert_eq!(value["start_dt"], "2020-11-01T00:00:00+00:00");
        assert!(value["end_dt"].is_null());
        assert!(value["duration"].is_null());
        assert!(value["response_status"].is_null());
        assert!(value["response_regex_status"].is_null());
        assert_eq!(value["status"], "CLIENT_ERROR");
        assert_eq!(value["status_message"], "refused");
    }

    #[test]
    fn test_duration() {
        let same = CheckResult::success("http://localhost", start(), start(), 200, None);
        assert_eq!(same.duration(), Some(Duration::zero()));

        let one_second = CheckResult::success(
            "http://localhost",
            start(),
            start() + Duration::seconds(1),
            200,
            None,
        );
        assert_eq!(one_second.duration(), Some(Duration::seconds(1)));
        assert_eq!(one_second.duration_secs(), Some(1.0));

        let failed = CheckResult::timeout("http://localhost", start(), "timeout");
        assert_eq!(failed.duration(), None);
        assert_eq!(failed.duration_secs(), None);
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = CheckResult::decode(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let err = CheckResult::decode(br#"{"url": "http://localhost", "status": "TIMEOUT"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        let payload = br#"{"url": "http://localhost", "start_dt": "2020-11-01T00:00:00+00:00",
            "end_dt": null, "response_status": null, "response_regex_status": null,
            "status": "MAYBE", "status_message": "?"}"#;
        let err = CheckResult::decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::Outcome(_)));
    }

    #[test]
    fn test_decode_rejects_bad_timestamp() {
        let payload = br#"{"url": "http://localhost", "start_dt": "yesterday",
            "status": "TIMEOUT", "status_message": "x"}"#;
        let err = CheckResult::decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::Timestamp { .. }));
    }

    #[test]
    fn test_decode_rejects_success_without_status_code() {
        let payload = br#"{"url": "http://localhost", "start_dt": "2020-11-01T00:00:00+00:00",
            "end_dt": "2020-11-01T00:00:01+00:00", "response_status": null,
            "response_regex_status": null, "status": "SUCCESSFUL", "status_message": null}"#;
        let err = CheckResult::decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn test_decode_failure_without_message_gets_empty_message() {
        let payload = br#"{"url": "http://localhost", "start_dt": "2020-11-01T00:00:00Z",
            "end_dt": null, "duration": null, "response_status": null,
            "response_regex_status": null, "status": "UNKNOWN_ERROR", "status_message": null}"#;
        let result = CheckResult::decode(payload).unwrap();
        assert_eq!(result.outcome(), CheckOutcome::UnknownError);
        assert_eq!(result.message(), Some(""));
        assert_eq!(result.start_time(), start());
    }

    #[test]
    fn test_display() {
        let ok = CheckResult::success(
            "http://localhost",
            start(),
            start() + Duration::seconds(1),
            200,
            None,
        );
        assert_eq!(ok.to_string(), "http://localhost (SUCCESSFUL) took 1.000 s");

        let failed = CheckResult::timeout("http://localhost", start(), "too slow");
        assert_eq!(failed.to_string(), "http://localhost (TIMEOUT): too slow");
    }
}
