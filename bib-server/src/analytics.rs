//! Client analytics events
//!
//! Events are small, validated field by field, logged and dropped. Nothing is
//! persisted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_.:-]{0,63}$").expect("valid name pattern"));
static PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[^\s]*$").expect("valid path pattern"));
static SESSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{8,64}$").expect("valid session pattern"));
static PROP_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,40}$").expect("valid prop key pattern"));

const MAX_PATH_CHARS: usize = 512;
const MAX_PROPS: usize = 24;
const MAX_PROP_STRING_CHARS: usize = 256;
const MAX_PAST_MS: i64 = 24 * 60 * 60 * 1000;
const MAX_FUTURE_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    /// Client clock, Unix epoch ms
    #[serde(alias = "ts")]
    pub timestamp: i64,
    pub path: String,
    #[serde(alias = "sid")]
    pub session_id: String,
    #[serde(default)]
    pub props: Option<Map<String, Value>>,
}

/// First field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

impl AnalyticsEvent {
    /// Check every field against its pattern and limits
    pub fn validate(&self, now_ms: i64) -> Result<(), ValidationError> {
        if !NAME_PATTERN.is_match(&self.name) {
            return Err(ValidationError::new("name", "must match ^[a-z][a-z0-9_.:-]{0,63}$"));
        }

        if self.timestamp < now_ms - MAX_PAST_MS {
            return Err(ValidationError::new("timestamp", "older than 24 hours"));
        }
        if self.timestamp > now_ms + MAX_FUTURE_MS {
            return Err(ValidationError::new("timestamp", "more than 5 minutes in the future"));
        }

        if self.path.chars().count() > MAX_PATH_CHARS {
            return Err(ValidationError::new("path", "longer than 512 characters"));
        }
        if !PATH_PATTERN.is_match(&self.path) {
            return Err(ValidationError::new("path", "must be an absolute path without whitespace"));
        }

        if !SESSION_PATTERN.is_match(&self.session_id) {
            return Err(ValidationError::new("session_id", "must be 8-64 of [A-Za-z0-9_-]"));
        }

        if let Some(props) = &self.props {
            validate_props(props)?;
        }

        Ok(())
    }

    /// Props as a JSON value for logging
    pub fn props_value(&self) -> Value {
        self.props.clone().map(Value::Object).unwrap_or(Value::Null)
    }
}

fn validate_props(props: &Map<String, Value>) -> Result<(), ValidationError> {
    if props.len() > MAX_PROPS {
        return Err(ValidationError::new("props", "more than 24 keys"));
    }

    for (key, value) in props {
        if !PROP_KEY_PATTERN.is_match(key) {
            return Err(ValidationError::new("props", format!("invalid key {:?}", key)));
        }

        let field = format!("props.{}", key);
        match value {
            Value::String(s) if s.chars().count() > MAX_PROP_STRING_CHARS => {
                return Err(ValidationError::new(field, "longer than 256 characters"));
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(ValidationError::new(field, "must be a string, number, bool or null"));
            }
            _ => {}
        }
    }

    Ok(())
}
