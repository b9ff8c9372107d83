//! Caller sessions
//!
//! A session token is 32 random bytes rendered as hex. Only its SHA-256 is
//! stored, so a database dump does not yield usable tokens.

use bib_common::{time, uuid_utils, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Freshly issued session; the only time the raw token is visible
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub async fn issue_session(
    pool: &SqlitePool,
    user_id: Uuid,
    ttl_hours: i64,
) -> Result<IssuedSession> {
    let token = generate_token();
    let now = time::now();
    let expires_at = time::hours_from_now(ttl_hours)?;

    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(user_id.to_string())
    .bind(time::to_column(now))
    .bind(time::to_column(expires_at))
    .execute(pool)
    .await?;

    debug!(user_id = %user_id, "Issued session");

    Ok(IssuedSession {
        token,
        user_id,
        expires_at,
    })
}

/// User behind an unexpired session token
pub async fn resolve_session(pool: &SqlitePool, token: &str) -> Result<Option<Uuid>> {
    // Fixed-width RFC 3339 text compares chronologically
    let user_id: Option<String> = sqlx::query_scalar(
        "SELECT user_id FROM sessions WHERE token_hash = ? AND expires_at > ?",
    )
    .bind(hash_token(token))
    .bind(time::to_column(time::now()))
    .fetch_optional(pool)
    .await?;

    user_id
        .map(|id| uuid_utils::parse_column("user_id", &id))
        .transpose()
}

/// Returns false when the token was unknown
pub async fn revoke_session(pool: &SqlitePool, token: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn purge_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(time::to_column(time::now()))
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_64_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_stored_hash_differs_from_token() {
        let token = generate_token();
        let hashed = hash_token(&token);
        assert_ne!(hashed, token);
        assert_eq!(hashed, hash_token(&token));
    }
}
