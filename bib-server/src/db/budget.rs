//! AI spend guard
//!
//! Each scope (e.g. `ai:recs:2026-10`) owns a counter with a hard limit.
//! Debits are all-or-nothing: a debit that would push `spent` past
//! `hard_limit` is refused and the counter is left as it was.
//!
//! Amounts are integer micro-units of currency.

use bib_common::config::BudgetConfig;
use bib_common::{time, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

static SCOPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9:._-]{0,63}$").expect("valid scope pattern"));

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BudgetStatus {
    pub scope: String,
    pub spent: i64,
    pub hard_limit: i64,
    pub remaining: i64,
}

impl BudgetStatus {
    fn new(scope: &str, spent: i64, hard_limit: i64) -> Self {
        Self {
            scope: scope.to_string(),
            spent,
            hard_limit,
            remaining: hard_limit - spent,
        }
    }
}

pub fn validate_scope(scope: &str) -> Result<()> {
    if !SCOPE_PATTERN.is_match(scope) {
        return Err(Error::InvalidInput(format!(
            "scope must match {}",
            SCOPE_PATTERN.as_str()
        )));
    }
    Ok(())
}

/// Atomically debit `amount` from `scope`
///
/// The scope row is created on first use with `limit_if_new`; an existing
/// row keeps the limit it was created with.
pub async fn consume_budget(
    pool: &SqlitePool,
    scope: &str,
    amount: i64,
    limit_if_new: i64,
) -> Result<BudgetStatus> {
    validate_scope(scope)?;
    if amount <= 0 {
        return Err(Error::InvalidInput("amount must be positive".to_string()));
    }

    let now = time::to_column(time::now());
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO budget_guards (scope, spent, hard_limit, created_at, updated_at)
        VALUES (?, 0, ?, ?, ?)
        ON CONFLICT(scope) DO NOTHING
        "#,
    )
    .bind(scope)
    .bind(limit_if_new.max(0))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    // `amount <= hard_limit - spent` rather than `spent + amount <= hard_limit`
    // so a huge amount cannot overflow the addition
    let debited: Option<(i64, i64)> = sqlx::query_as(
        r#"
        UPDATE budget_guards
        SET spent = spent + ?, updated_at = ?
        WHERE scope = ? AND ? <= hard_limit - spent
        RETURNING spent, hard_limit
        "#,
    )
    .bind(amount)
    .bind(&now)
    .bind(scope)
    .bind(amount)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some((spent, hard_limit)) = debited {
        tx.commit().await?;
        info!(scope = %scope, amount, spent, hard_limit, "Budget debited");
        return Ok(BudgetStatus::new(scope, spent, hard_limit));
    }

    let (spent, hard_limit): (i64, i64) =
        sqlx::query_as("SELECT spent, hard_limit FROM budget_guards WHERE scope = ?")
            .bind(scope)
            .fetch_one(&mut *tx)
            .await?;
    // Keep the lazily created row even though the debit was refused
    tx.commit().await?;

    warn!(scope = %scope, amount, spent, hard_limit, "Budget debit refused");
    Err(Error::BudgetExceeded {
        scope: scope.to_string(),
        spent,
        hard_limit,
        requested: amount,
    })
}

pub async fn budget_status(pool: &SqlitePool, scope: &str) -> Result<BudgetStatus> {
    validate_scope(scope)?;

    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT spent, hard_limit FROM budget_guards WHERE scope = ?")
            .bind(scope)
            .fetch_optional(pool)
            .await?;

    row.map(|(spent, hard_limit)| BudgetStatus::new(scope, spent, hard_limit))
        .ok_or_else(|| Error::NotFound(format!("budget scope {}", scope)))
}

/// Budget handle for server-side callers of paid APIs
///
/// Charge before making the external call; a refused charge means the call
/// must not be made.
#[derive(Debug, Clone)]
pub struct BudgetGuard {
    pool: SqlitePool,
    config: BudgetConfig,
}

impl BudgetGuard {
    pub fn new(pool: SqlitePool, config: BudgetConfig) -> Self {
        Self { pool, config }
    }

    pub async fn charge(&self, scope: &str, amount: i64) -> Result<BudgetStatus> {
        consume_budget(&self.pool, scope, amount, self.config.limit_for(scope)).await
    }

    pub async fn status(&self, scope: &str) -> Result<BudgetStatus> {
        budget_status(&self.pool, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_pattern() {
        for ok in ["ai", "ai:recs", "ai:recs:2026-10", "trivia.gen_v2"] {
            assert!(validate_scope(ok).is_ok(), "{} should be valid", ok);
        }
        for bad in ["", "AI", ":ai", "ai recs", &"a".repeat(65)] {
            assert!(validate_scope(bad).is_err(), "{:?} should be invalid", bad);
        }
    }

    #[test]
    fn test_remaining_computed() {
        let status = BudgetStatus::new("ai", 30, 100);
        assert_eq!(status.remaining, 70);
    }
}
