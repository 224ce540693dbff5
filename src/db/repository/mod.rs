pub mod events;
pub mod grace;
pub mod preferences;
pub mod runs;
pub mod schedules;
pub mod summaries;

pub use events::*;
pub use grace::*;
pub use preferences::*;
pub use runs::*;
pub use schedules::*;
pub use summaries::*;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::DatabaseError;

/// Parse an RFC3339 timestamp column.
pub(crate) fn parse_utc(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DatabaseError::MalformedValue {
            column: column.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a `YYYY-MM-DD` date column.
pub(crate) fn parse_date(column: &str, value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| DatabaseError::MalformedValue {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an `HH:MM` clock-time column (seconds tolerated).
pub(crate) fn parse_time(column: &str, value: &str) -> Result<NaiveTime, DatabaseError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| DatabaseError::MalformedValue {
            column: column.to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn fmt_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}
