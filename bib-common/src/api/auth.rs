//! Service-role request signing
//!
//! Server-side callers (scheduled jobs, the page-rendering tier) prove they
//! hold the shared secret by signing the JSON body of each request:
//! - the body carries `timestamp` (Unix epoch ms) and `hash` (SHA-256, hex)
//! - the timestamp must fall inside a short window around server time
//! - the hash covers the canonical JSON of the body plus the secret
//! - a secret of 0 disables checking (development only)

use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::db::SETTING_SERVICE_SECRET;

/// Placeholder substituted for `hash` before hashing
const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Service-role authentication failures
#[derive(Debug, Clone, Error)]
pub enum ServiceAuthError {
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    #[error("Invalid hash")]
    InvalidHash { provided: String, calculated: String },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Accepted clock skew for request timestamps
#[derive(Debug, Clone, Copy)]
pub struct TimestampWindow {
    pub max_past_ms: i64,
    pub max_future_ms: i64,
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self {
            max_past_ms: 1000,
            max_future_ms: 1,
        }
    }
}

impl From<&AuthConfig> for TimestampWindow {
    fn from(config: &AuthConfig) -> Self {
        Self {
            max_past_ms: config.max_past_ms,
            max_future_ms: config.max_future_ms,
        }
    }
}

/// Load the shared secret
///
/// An explicit override (config or `BIB_SERVICE_SECRET`) wins. Otherwise the
/// secret is read from `settings`, generating and storing a random non-zero
/// one on first use.
pub async fn load_shared_secret(
    db: &SqlitePool,
    override_secret: Option<i64>,
) -> Result<i64, ServiceAuthError> {
    if let Some(secret) = override_secret {
        return Ok(secret);
    }

    let stored: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SETTING_SERVICE_SECRET)
        .fetch_optional(db)
        .await
        .map_err(|e| ServiceAuthError::DatabaseError(e.to_string()))?;

    match stored {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ServiceAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ServiceAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    // INSERT OR IGNORE so two processes racing on first start agree on one secret
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(SETTING_SERVICE_SECRET)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ServiceAuthError::DatabaseError(e.to_string()))?;

    let (value,): (String,) = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SETTING_SERVICE_SECRET)
        .fetch_one(db)
        .await
        .map_err(|e| ServiceAuthError::DatabaseError(e.to_string()))?;

    value
        .parse::<i64>()
        .map_err(|e| ServiceAuthError::DatabaseError(format!("Invalid i64: {}", e)))
}

/// Check `timestamp` against `now` (both Unix epoch ms)
pub fn validate_timestamp(
    timestamp: i64,
    now: i64,
    window: TimestampWindow,
) -> Result<(), ServiceAuthError> {
    let diff = now - timestamp;

    if diff > window.max_past_ms {
        return Err(ServiceAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms too old (max {}ms past)",
                diff, window.max_past_ms
            ),
        });
    }

    if -diff > window.max_future_ms {
        return Err(ServiceAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                -diff, window.max_future_ms
            ),
        });
    }

    Ok(())
}

/// Calculate the request hash
///
/// 1. Replace `hash` with 64 zeros
/// 2. Serialize as canonical JSON (sorted keys, no whitespace)
/// 3. Append the secret as a decimal string
/// 4. SHA-256, lowercase hex
///
/// ```
/// use bib_common::api::auth::calculate_hash;
/// use serde_json::json;
///
/// let body = json!({"scope": "ai:recs", "amount": 10, "timestamp": 1730000000000i64, "hash": ""});
/// let hash = calculate_hash(&body, 123456789);
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let to_hash = format!("{}{}", to_canonical_json(&value), shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical JSON: object keys sorted, no whitespace
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's own escaping for strings and scalars
        other => other.to_string(),
    }
}

/// Verify `provided_hash` against the body
pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ServiceAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);

    if !provided_hash.eq_ignore_ascii_case(&calculated) {
        return Err(ServiceAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

/// Add `timestamp` and `hash` to a JSON object body
///
/// Client-side counterpart of [`validate_timestamp`] + [`validate_hash`].
pub fn sign_request(body: &mut Value, shared_secret: i64, now_ms: i64) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("timestamp".to_string(), Value::from(now_ms));
    }
    let hash = calculate_hash(body, shared_secret);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn test_timestamp_window_boundaries() {
        let window = TimestampWindow::default();

        assert!(validate_timestamp(NOW, NOW, window).is_ok());
        assert!(validate_timestamp(NOW - 1000, NOW, window).is_ok());
        assert!(validate_timestamp(NOW + 1, NOW, window).is_ok());

        assert!(validate_timestamp(NOW - 1001, NOW, window).is_err());
        assert!(validate_timestamp(NOW + 2, NOW, window).is_err());
    }

    #[test]
    fn test_wider_window_from_config() {
        let config = AuthConfig {
            max_past_ms: 30_000,
            max_future_ms: 5_000,
            ..AuthConfig::default()
        };
        let window = TimestampWindow::from(&config);

        assert!(validate_timestamp(NOW - 29_000, NOW, window).is_ok());
        assert!(validate_timestamp(NOW + 4_000, NOW, window).is_ok());
        assert!(validate_timestamp(NOW + 6_000, NOW, window).is_err());
    }

    #[test]
    fn test_hash_ignores_provided_hash_value() {
        let a = json!({"scope": "ai", "timestamp": NOW, "hash": "anything"});
        let b = json!({"scope": "ai", "timestamp": NOW, "hash": "something-else"});
        assert_eq!(calculate_hash(&a, 42), calculate_hash(&b, 42));
        assert_ne!(calculate_hash(&a, 42), calculate_hash(&a, 43));
    }

    #[test]
    fn test_canonical_json_sorted_and_compact() {
        let value = json!({"z": [1, {"b": true, "a": null}], "a": "x\"y"});
        assert_eq!(
            to_canonical_json(&value),
            r#"{"a":"x\"y","z":[1,{"a":null,"b":true}]}"#
        );
    }

    #[test]
    fn test_sign_then_validate() {
        let mut body = json!({"scope": "ai:recs", "amount": 5});
        sign_request(&mut body, 987_654_321, NOW);

        let hash = body["hash"].as_str().unwrap().to_string();
        assert_eq!(body["timestamp"], NOW);
        assert!(validate_hash(&hash, &body, 987_654_321).is_ok());
        assert!(validate_hash(&hash, &body, 1).is_err());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let mut body = json!({"scope": "ai:recs", "amount": 5});
        sign_request(&mut body, 7, NOW);
        let hash = body["hash"].as_str().unwrap().to_string();

        body["amount"] = json!(5000);
        assert!(matches!(
            validate_hash(&hash, &body, 7),
            Err(ServiceAuthError::InvalidHash { .. })
        ));
    }
}
