//! UUID utilities
//!
//! Identifiers are stored as hyphenated text in SQLite.

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a text column
pub fn parse_column(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in column {}: {}", column, e)))
}
