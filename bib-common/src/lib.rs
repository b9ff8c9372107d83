//! # BiB Common Library
//!
//! Shared code for the BiB backend:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Database initialization and schema
//! - Service-role request signing
//! - Time and identifier helpers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
