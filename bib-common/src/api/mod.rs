//! Shared HTTP API functionality
//!
//! Contains only pure functions and database operations; the axum middleware
//! wrapping them lives in `bib-server`.

pub mod auth;

pub use auth::{
    calculate_hash, load_shared_secret, sign_request, to_canonical_json, validate_hash,
    validate_timestamp, ServiceAuthError, TimestampWindow,
};
