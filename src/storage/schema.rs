//! Database schema definitions
//!
//! This module contains the SQL schema for the check result database.

use crate::check::CheckOutcome;
use rusqlite::params;

/// SQL schema for the database
///
/// SQLite has no enum types, so the outcome "enum" is a lookup table that
/// `crawler_results.status` references.
pub const SCHEMA_SQL: &str = r#"
-- Allowed check outcomes
CREATE TABLE IF NOT EXISTS result_status (
    name TEXT PRIMARY KEY
);

-- One row per consumed check result
CREATE TABLE IF NOT EXISTS crawler_results (
    url VARCHAR(255) NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    response_time REAL,
    response_status SMALLINT,
    response_regex_status BOOLEAN,
    status TEXT NOT NULL REFERENCES result_status(name),
    status_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawler_results_url ON crawler_results(url, start_time);
CREATE INDEX IF NOT EXISTS idx_crawler_results_status ON crawler_results(status);
"#;

/// Initializes the database schema
///
/// Safe to run against an already initialized database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;

    for outcome in CheckOutcome::all() {
        conn.execute(
            "INSERT OR IGNORE INTO result_status (name) VALUES (?1)",
            params![outcome.as_str()],
        )?;
    }

    Ok(())
}
