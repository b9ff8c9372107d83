//! Common error types for BiB

use thiserror::Error;

/// Common result type for BiB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the BiB backend
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller is not allowed to act on the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with current state (duplicate pending invite, existing member)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Debit would push a budget scope past its hard limit
    #[error("Budget exceeded for scope '{scope}': spent {spent} of {hard_limit}, requested {requested}")]
    BudgetExceeded {
        scope: String,
        spent: i64,
        hard_limit: i64,
        requested: i64,
    },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying database error is a UNIQUE constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
    }

    /// True when the underlying database error is a CHECK constraint violation
    pub fn is_check_violation(&self) -> bool {
        matches!(self, Error::Database(sqlx::Error::Database(db)) if db.is_check_violation())
    }
}
