//! User records
//!
//! Users are created by the page tier when it first issues a session for
//! them; there is no sign-up flow here.

use bib_common::{time, uuid_utils, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: uuid_utils::parse_column("id", row.get("id"))?,
        display_name: row.get("display_name"),
        created_at: time::parse_column("created_at", row.get("created_at"))?,
    })
}

/// Trimmed display name of 1..=80 characters
fn normalize_display_name(display_name: &str) -> Result<String> {
    let name = display_name.trim();
    let len = name.chars().count();
    if len == 0 || len > 80 {
        return Err(Error::InvalidInput(
            "display_name must be 1-80 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Insert the user, or refresh the display name of an existing one
pub async fn ensure_user(pool: &SqlitePool, id: Uuid, display_name: &str) -> Result<User> {
    let display_name = normalize_display_name(display_name)?;

    sqlx::query(
        r#"
        INSERT INTO users (id, display_name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name
        "#,
    )
    .bind(id.to_string())
    .bind(&display_name)
    .bind(time::to_column(time::now()))
    .execute(pool)
    .await?;

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("User {} vanished after upsert", id)))
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, display_name, created_at FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}
