//! Statistics over the stored check results
//!
//! This module provides functionality for extracting and displaying
//! per-outcome counts from the storage layer.

use crate::check::CheckOutcome;
use crate::storage::traits::{ResultStore, StorageResult};
use std::collections::HashMap;

/// Check result statistics summary
#[derive(Debug, Clone)]
pub struct ResultStatistics {
    /// Total number of stored results
    pub total: u64,

    /// Count of results by outcome
    pub by_status: HashMap<CheckOutcome, u64>,

    /// Number of distinct URLs checked
    pub unique_urls: u64,
}

impl ResultStatistics {
    /// Number of results with the given outcome
    pub fn count(&self, outcome: CheckOutcome) -> u64 {
        self.by_status.get(&outcome).copied().unwrap_or(0)
    }

    /// Share of successful checks in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.count(CheckOutcome::Successful) as f64 / self.total as f64) * 100.0
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn ResultStore) -> StorageResult<ResultStatistics> {
    Ok(ResultStatistics {
        total: storage.count_results()?,
        by_status: storage.count_by_status()?,
        unique_urls: storage.count_unique_urls()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ResultStatistics) {
    println!("=== Check Statistics ===\n");

    println!("Overview:");
    println!("  Total results: {}", stats.total);
    println!("  Unique URLs: {}", stats.unique_urls);
    println!();

    println!("Results by Status:");
    for outcome in CheckOutcome::all() {
        let count = stats.count(outcome);
        let percentage = if stats.total > 0 {
            (count as f64 / stats.total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", outcome, count, percentage);
    }
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} checks successful)",
        stats.success_rate(),
        stats.count(CheckOutcome::Successful),
        stats.total
    );
}
