//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current Unix epoch time in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Timestamp `hours` from now; out-of-range offsets are an error, not a panic
pub fn hours_from_now(hours: i64) -> Result<DateTime<Utc>> {
    Duration::try_hours(hours)
        .and_then(|offset| Utc::now().checked_add_signed(offset))
        .ok_or_else(|| Error::Internal(format!("{} hours from now is out of range", hours)))
}

/// Format for storage (RFC 3339, millisecond precision, `Z` suffix)
///
/// Fixed width so stored values compare correctly as text.
pub fn to_column(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a timestamp read back from a text column
pub fn parse_column(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
