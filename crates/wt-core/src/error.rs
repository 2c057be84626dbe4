//! Error types for working-time computations.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by registration and query calls.
///
/// Every variant is raised synchronously by the call that received the bad
/// input; nothing is deferred to query time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalcError {
    /// A time-of-day string could not be split into hour/minute(/second).
    #[error("invalid time of day: {value:?} (expected HH:MM, HH:MM:SS or HH:MM:SS.mmm)")]
    InvalidTimeFormat { value: String },

    /// An endpoint could not be parsed into an absolute instant.
    #[error("invalid datetime: {value:?} (expected ISO 8601 with offset, e.g. 2020-10-02T17:25:00+01:00)")]
    InvalidDateFormat { value: String },

    /// A weekday number outside 1 (Monday) ..= 7 (Sunday).
    #[error("invalid weekday number: {0} (expected 1 = Monday through 7 = Sunday)")]
    InvalidWeekday(u8),

    /// An unknown IANA timezone identifier.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// A working window whose start is not strictly before its stop.
    #[error("working window must start before it stops: {start} >= {stop}")]
    InvalidWindow { start: String, stop: String },

    /// An exclusion whose start is not strictly before its end.
    #[error("exclusion must start before it ends: {start} >= {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub type Result<T> = std::result::Result<T, CalcError>;
