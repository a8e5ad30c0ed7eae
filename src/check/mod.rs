//! Check result model
//!
//! A [`CheckResult`] is produced once per fetch attempt by the crawler,
//! travels through the event log as JSON and ends up as one database row.
//!
//! # Components
//!
//! - `CheckOutcome`: the four-way classification of a fetch attempt
//! - `CheckResult`: the immutable record plus its wire codec

mod outcome;
mod result;

pub use outcome::{CheckOutcome, UnknownOutcome};
pub use result::{CheckResult, DecodeError};
