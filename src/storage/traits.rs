//! Storage traits and error types
//!
//! This module defines the trait interface for result stores and the
//! associated error types.

use crate::check::{CheckOutcome, CheckResult};
use crate::storage::ResultRecord;
use rusqlite::ErrorCode;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown status '{0}' in crawler_results")]
    UnknownStatus(String),
}

impl StorageError {
    /// Returns true for failures that a reconnect and retry can fix
    ///
    /// Busy/locked databases, I/O failures and databases that could not be
    /// opened are transient. Constraint violations and malformed statements
    /// fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for result store implementations
///
/// The persister owns its store exclusively, so mutating operations take
/// `&mut self`.
pub trait ResultStore {
    /// Creates the outcome enum and the results table if they are missing
    fn initialize(&mut self) -> StorageResult<()>;

    /// Inserts exactly one row for `result`
    ///
    /// There is no deduplication: inserting the same result twice produces
    /// two rows.
    fn insert_result(&mut self, result: &CheckResult) -> StorageResult<()>;

    /// Drops the current connection and opens a new one
    fn reconnect(&mut self) -> StorageResult<()>;

    // ===== Queries =====

    /// Total number of stored results
    fn count_results(&self) -> StorageResult<u64>;

    /// Number of stored results per outcome (outcomes without rows are absent)
    fn count_by_status(&self) -> StorageResult<HashMap<CheckOutcome, u64>>;

    /// Number of distinct URLs with at least one stored result
    fn count_unique_urls(&self) -> StorageResult<u64>;

    /// The most recent results for `url`, newest first
    fn results_for_url(&self, url: &str, limit: usize) -> StorageResult<Vec<ResultRecord>>;
}
