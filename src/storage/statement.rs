//! Translation of a check result into its insert statement
//!
//! Every value is bound as a parameter, nothing is interpolated into the SQL.

use crate::check::CheckResult;
use rusqlite::types::Value;

/// Insert used for successful checks
pub const INSERT_SUCCESS_SQL: &str = "INSERT INTO crawler_results
    (url, start_time, end_time, response_time, response_status, response_regex_status, status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Insert used for timeouts and errors; the response columns stay NULL
pub const INSERT_FAILURE_SQL: &str = "INSERT INTO crawler_results
    (url, start_time, status, status_message)
    VALUES (?1, ?2, ?3, ?4)";

/// A parameterised statement ready to be executed
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: &'static str,
    pub params: Vec<Value>,
}

/// Builds the insert for one check result, branching on its outcome
pub fn insert_statement(result: &CheckResult) -> InsertStatement {
    let url = Value::Text(result.url().to_string());
    let start_time = Value::Text(result.start_time().to_rfc3339());
    let status = Value::Text(result.outcome().as_str().to_string());

    if result.outcome().is_success() {
        InsertStatement {
            sql: INSERT_SUCCESS_SQL,
            params: vec![
                url,
                start_time,
                Value::from(result.end_time().map(|t| t.to_rfc3339())),
                Value::from(result.duration_secs()),
                Value::from(result.response_status()),
                Value::from(result.pattern_matched()),
                status,
            ],
        }
    } else {
        InsertStatement {
            sql: INSERT_FAILURE_SQL,
            params: vec![
                url,
                start_time,
                status,
                Value::Text(result.message().unwrap_or_default().to_string()),
            ],
        }
    }
}
