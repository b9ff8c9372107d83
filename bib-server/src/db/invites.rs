//! Group invites
//!
//! Lifecycle: `pending` → `accepted` | `rejected` (by the invitee) or
//! `canceled` (by the inviter). Resolved invites never change again.
//!
//! The schema guarantees at most one pending invite per (group, invitee) and
//! that nobody invites themselves; these functions add the role checks.

use bib_common::{time, uuid_utils, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{groups, users};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Rejected => "rejected",
            InviteStatus::Canceled => "canceled",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, InviteStatus::Pending)
    }
}

impl FromStr for InviteStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "rejected" => Ok(InviteStatus::Rejected),
            "canceled" => Ok(InviteStatus::Canceled),
            other => Err(Error::InvalidInput(format!("unknown invite status: {}", other))),
        }
    }
}

/// Invitee's answer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InviteDecision {
    Accept,
    Reject,
}

impl InviteDecision {
    pub fn resulting_status(&self) -> InviteStatus {
        match self {
            InviteDecision::Accept => InviteStatus::Accepted,
            InviteDecision::Reject => InviteStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Invite {
    pub id: Uuid,
    pub group_id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_id: Uuid,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

const INVITE_COLUMNS: &str =
    "i.id, i.group_id, i.inviter_id, i.invitee_id, i.status, i.created_at, i.responded_at";

fn invite_from_row(row: &SqliteRow) -> Result<Invite> {
    let status: String = row.get("status");
    let responded_at: Option<String> = row.get("responded_at");

    Ok(Invite {
        id: uuid_utils::parse_column("id", row.get("id"))?,
        group_id: uuid_utils::parse_column("group_id", row.get("group_id"))?,
        inviter_id: uuid_utils::parse_column("inviter_id", row.get("inviter_id"))?,
        invitee_id: uuid_utils::parse_column("invitee_id", row.get("invitee_id"))?,
        status: status
            .parse()
            .map_err(|_| Error::Internal(format!("Unknown invite status in database: {}", status)))?,
        created_at: time::parse_column("created_at", row.get("created_at"))?,
        responded_at: responded_at
            .as_deref()
            .map(|ts| time::parse_column("responded_at", ts))
            .transpose()?,
    })
}

/// Invite `invitee_id` to a group owned by `caller`
pub async fn create_invite(
    pool: &SqlitePool,
    caller: Uuid,
    group_id: Uuid,
    invitee_id: Uuid,
) -> Result<Invite> {
    if caller == invitee_id {
        return Err(Error::InvalidInput("cannot invite yourself".to_string()));
    }

    let group = groups::get_group(pool, group_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("group {}", group_id)))?;
    if group.owner_id != caller {
        return Err(Error::Forbidden("only the group owner can invite".to_string()));
    }

    if users::get_user(pool, invitee_id).await?.is_none() {
        return Err(Error::NotFound(format!("user {}", invitee_id)));
    }
    if groups::is_member(pool, group_id, invitee_id).await? {
        return Err(Error::Conflict("user is already a member".to_string()));
    }

    let invite = Invite {
        id: uuid_utils::generate(),
        group_id,
        inviter_id: caller,
        invitee_id,
        status: InviteStatus::Pending,
        created_at: time::now(),
        responded_at: None,
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO group_invites (id, group_id, inviter_id, invitee_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(invite.id.to_string())
    .bind(group_id.to_string())
    .bind(caller.to_string())
    .bind(invitee_id.to_string())
    .bind(InviteStatus::Pending.as_str())
    .bind(time::to_column(invite.created_at))
    .execute(pool)
    .await
    .map_err(Error::from);

    match inserted {
        Ok(_) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(Error::Conflict(
                "a pending invite already exists for this user".to_string(),
            ));
        }
        Err(e) => return Err(e),
    }

    info!(invite_id = %invite.id, group_id = %group_id, invitee_id = %invitee_id, "Created invite");
    Ok(invite)
}

pub async fn get_invite(pool: &SqlitePool, id: Uuid) -> Result<Option<Invite>> {
    let sql = format!("SELECT {} FROM group_invites i WHERE i.id = ?", INVITE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(invite_from_row).transpose()
}

/// Answer an invite as its invitee
///
/// Moves a pending invite addressed to `caller` to accepted/rejected and, on
/// accept, adds the membership, all in one transaction. The conditional
/// UPDATE is the first statement, so it takes SQLite's write lock and
/// concurrent answers to the same invite are serialized: one wins, the rest
/// see the resolved row.
///
/// Answering an already-resolved invite is not an error: its current status
/// is returned unchanged.
pub async fn respond_to_invite(
    pool: &SqlitePool,
    caller: Uuid,
    invite_id: Uuid,
    decision: InviteDecision,
) -> Result<InviteStatus> {
    let new_status = decision.resulting_status();
    let now = time::to_column(time::now());

    let mut tx = pool.begin().await?;

    let group_id: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE group_invites
        SET status = ?, responded_at = ?
        WHERE id = ? AND invitee_id = ? AND status = 'pending'
        RETURNING group_id
        "#,
    )
    .bind(new_status.as_str())
    .bind(&now)
    .bind(invite_id.to_string())
    .bind(caller.to_string())
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(group_id) = group_id {
        if new_status == InviteStatus::Accepted {
            sqlx::query(
                r#"
                INSERT INTO group_members (group_id, user_id, role, joined_at)
                VALUES (?, ?, 'member', ?)
                ON CONFLICT(group_id, user_id) DO NOTHING
                "#,
            )
            .bind(&group_id)
            .bind(caller.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(invite_id = %invite_id, status = new_status.as_str(), "Invite answered");
        return Ok(new_status);
    }

    // Nothing pending matched: explain why from the row as it stands
    let current: Option<(String, String)> =
        sqlx::query_as("SELECT invitee_id, status FROM group_invites WHERE id = ?")
            .bind(invite_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
    tx.rollback().await?;

    match current {
        None => Err(Error::NotFound(format!("invite {}", invite_id))),
        Some((invitee_id, _)) if invitee_id != caller.to_string() => Err(Error::Forbidden(
            "only the invitee can answer this invite".to_string(),
        )),
        Some((_, status)) => status.parse(),
    }
}

/// Withdraw a pending invite as its inviter
///
/// Canceling an already-resolved invite returns its current status unchanged.
pub async fn cancel_invite(pool: &SqlitePool, caller: Uuid, invite_id: Uuid) -> Result<InviteStatus> {
    let updated = sqlx::query(
        r#"
        UPDATE group_invites
        SET status = 'canceled', responded_at = ?
        WHERE id = ? AND inviter_id = ? AND status = 'pending'
        "#,
    )
    .bind(time::to_column(time::now()))
    .bind(invite_id.to_string())
    .bind(caller.to_string())
    .execute(pool)
    .await?;

    if updated.rows_affected() == 1 {
        info!(invite_id = %invite_id, "Invite canceled");
        return Ok(InviteStatus::Canceled);
    }

    match get_invite(pool, invite_id).await? {
        None => Err(Error::NotFound(format!("invite {}", invite_id))),
        Some(invite) if invite.inviter_id != caller => Err(Error::Forbidden(
            "only the inviter can cancel this invite".to_string(),
        )),
        Some(invite) => Ok(invite.status),
    }
}

/// Invites visible to the caller: sent, received, or for groups they own
pub async fn list_invites(
    pool: &SqlitePool,
    caller: Uuid,
    status: Option<InviteStatus>,
) -> Result<Vec<Invite>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM group_invites i
        JOIN groups g ON g.id = i.group_id
        WHERE (i.invitee_id = ? OR i.inviter_id = ? OR g.owner_id = ?)
          AND (? IS NULL OR i.status = ?)
        ORDER BY i.created_at DESC
        "#,
        INVITE_COLUMNS
    );
    let caller = caller.to_string();
    let status = status.map(|s| s.as_str());

    let rows = sqlx::query(&sql)
        .bind(&caller)
        .bind(&caller)
        .bind(&caller)
        .bind(status)
        .bind(status)
        .fetch_all(pool)
        .await?;

    rows.iter().map(invite_from_row).collect()
}
