//! Outcome classification for a single URL check
//!
//! The same literal strings are used on the wire and in the database enum.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mutually exclusive classification of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckOutcome {
    /// A response was received. The status code can be anything, including
    /// 404 and friends
    Successful,

    /// The request exceeded the configured total timeout
    Timeout,

    /// The connection could not be established (DNS, TCP refusal, TLS)
    ClientError,

    /// Any other failure while sending the request or reading the body
    UnknownError,
}

impl CheckOutcome {
    /// Returns true if a response was received
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Successful)
    }

    /// Canonical string literal, used for the wire payload and the storage enum
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "SUCCESSFUL",
            Self::Timeout => "TIMEOUT",
            Self::ClientError => "CLIENT_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Returns all outcomes in declaration order
    pub fn all() -> [Self; 4] {
        [
            Self::Successful,
            Self::Timeout,
            Self::ClientError,
            Self::UnknownError,
        ]
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the four outcome literals
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown check outcome '{0}'")]
pub struct UnknownOutcome(pub String);

impl FromStr for CheckOutcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESSFUL" => Ok(Self::Successful),
            "TIMEOUT" => Ok(Self::Timeout),
            "CLIENT_ERROR" => Ok(Self::ClientError),
            "UNKNOWN_ERROR" => Ok(Self::UnknownError),
            other => Err(UnknownOutcome(other.to_string())),
        }
    }
}
