//! Storage module for persisting check results
//!
//! This module handles all database operations for the persister, including:
//! - SQLite database initialization and schema management
//! - Translating a check result into its parameterised insert
//! - Read-only queries used for statistics

mod schema;
mod sqlite;
mod statement;
mod stats;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteStorage;
pub use statement::{insert_statement, InsertStatement, INSERT_FAILURE_SQL, INSERT_SUCCESS_SQL};
pub use stats::{load_statistics, print_statistics, ResultStatistics};
pub use traits::{ResultStore, StorageError, StorageResult};

use crate::check::CheckOutcome;
use crate::config::StorageConfig;
use std::path::Path;

/// Opens the database described by the `[storage]` config section
///
/// # Arguments
///
/// * `config` - The storage settings
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Connected storage with the schema in place
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_storage(config: &StorageConfig) -> StorageResult<SqliteStorage> {
    let storage = SqliteStorage::new(Path::new(&config.database_path))?;
    tracing::info!("connected to database {}", config.database_path);
    Ok(storage)
}

/// A stored row of `crawler_results`
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub url: String,
    pub start_time: String,
    pub end_time: Option<String>,
    /// Seconds between start and end
    pub response_time: Option<f64>,
    pub response_status: Option<u16>,
    pub response_regex_status: Option<bool>,
    pub status: CheckOutcome,
    pub status_message: Option<String>,
}
