//! Groups and group membership
//!
//! The creator of a group is its owner and only member until invites are
//! accepted. Membership gates every read of the group's roster.

use bib_common::{time, uuid_utils, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Member => "member",
        }
    }

    fn from_column(value: &str) -> Result<Self> {
        match value {
            "owner" => Ok(MemberRole::Owner),
            "member" => Ok(MemberRole::Member),
            other => Err(Error::Internal(format!("Unknown member role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Member {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

fn group_from_row(row: &SqliteRow) -> Result<Group> {
    Ok(Group {
        id: uuid_utils::parse_column("id", row.get("id"))?,
        name: row.get("name"),
        owner_id: uuid_utils::parse_column("owner_id", row.get("owner_id"))?,
        created_at: time::parse_column("created_at", row.get("created_at"))?,
    })
}

fn normalize_group_name(name: &str) -> Result<String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > 80 {
        return Err(Error::InvalidInput("name must be 1-80 characters".to_string()));
    }
    Ok(name.to_string())
}

/// Create a group with `owner` as its first member
pub async fn create_group(pool: &SqlitePool, owner: Uuid, name: &str) -> Result<Group> {
    let name = normalize_group_name(name)?;
    let group = Group {
        id: uuid_utils::generate(),
        name,
        owner_id: owner,
        created_at: time::now(),
    };
    let created_at = time::to_column(group.created_at);

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO groups (id, name, owner_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(owner.to_string())
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(group.id.to_string())
    .bind(owner.to_string())
    .bind(MemberRole::Owner.as_str())
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(group_id = %group.id, owner_id = %owner, "Created group");
    Ok(group)
}

pub async fn get_group(pool: &SqlitePool, id: Uuid) -> Result<Option<Group>> {
    let row = sqlx::query("SELECT id, name, owner_id, created_at FROM groups WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(group_from_row).transpose()
}

pub async fn is_member(pool: &SqlitePool, group_id: Uuid, user_id: Uuid) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(found.is_some())
}

/// Groups the user belongs to, newest first
pub async fn list_groups_for(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Group>> {
    let rows = sqlx::query(
        r#"
        SELECT g.id, g.name, g.owner_id, g.created_at
        FROM groups g
        JOIN group_members m ON m.group_id = g.id
        WHERE m.user_id = ?
        ORDER BY g.created_at DESC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(group_from_row).collect()
}

/// Roster of a group; only visible to its members
pub async fn list_members(pool: &SqlitePool, caller: Uuid, group_id: Uuid) -> Result<Vec<Member>> {
    if get_group(pool, group_id).await?.is_none() {
        return Err(Error::NotFound(format!("group {}", group_id)));
    }
    if !is_member(pool, group_id, caller).await? {
        return Err(Error::Forbidden("only members can list members".to_string()));
    }

    let rows = sqlx::query(
        r#"
        SELECT m.user_id, u.display_name, m.role, m.joined_at
        FROM group_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.group_id = ?
        ORDER BY m.joined_at, u.display_name
        "#,
    )
    .bind(group_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Member {
                user_id: uuid_utils::parse_column("user_id", row.get("user_id"))?,
                display_name: row.get("display_name"),
                role: MemberRole::from_column(row.get("role"))?,
                joined_at: time::parse_column("joined_at", row.get("joined_at"))?,
            })
        })
        .collect()
}

/// Remove the caller from a group; the owner cannot leave
pub async fn leave_group(pool: &SqlitePool, caller: Uuid, group_id: Uuid) -> Result<()> {
    let group = get_group(pool, group_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("group {}", group_id)))?;

    if group.owner_id == caller {
        return Err(Error::InvalidInput("the owner cannot leave their group".to_string()));
    }

    let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id.to_string())
        .bind(caller.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("not a member of this group".to_string()));
    }

    info!(group_id = %group_id, user_id = %caller, "Left group");
    Ok(())
}
