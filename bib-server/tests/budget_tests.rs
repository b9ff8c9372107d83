//! Integration tests for the AI spend guard
//!
//! Tests cover:
//! - debits through the signed `/rpc/consume_budget` RPC
//! - refusal leaves the counter unchanged
//! - concurrent debits never overshoot the hard limit

mod helpers;

use axum::http::StatusCode;
use bib_common::Error;
use bib_server::db::{budget_status, consume_budget};
use helpers::*;
use serde_json::json;
use tokio::task::JoinSet;

fn limited_config(limit: i64) -> bib_common::config::TomlConfig {
    let mut config = test_config();
    config.budget.scope_limits.insert("ai".to_string(), limit);
    config
}

#[tokio::test]
async fn test_debit_until_limit_then_refuse() {
    let app = create_test_app(limited_config(100)).await;

    let consume = |amount: i64| {
        signed_request(
            "/rpc/consume_budget",
            json!({"scope": "ai:recs:2026-10", "amount": amount}),
            app.secret,
        )
    };

    let (status, body) = app.send_json(consume(60)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["spent"], 60);
    assert_eq!(body["hard_limit"], 100);
    assert_eq!(body["remaining"], 40);

    let (status, body) = app.send_json(consume(50)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "BUDGET_EXCEEDED");
    assert_eq!(body["error"]["spent"], 60);
    assert_eq!(body["error"]["hard_limit"], 100);
    assert_eq!(body["error"]["requested"], 50);

    // Exactly reaching the limit is allowed
    let (status, body) = app.send_json(consume(40)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], 0);

    let (status, body) = app
        .send_json(signed_request(
            "/rpc/budget_status",
            json!({"scope": "ai:recs:2026-10"}),
            app.secret,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["spent"], 100);
}

#[tokio::test]
async fn test_invalid_debits_rejected() {
    let app = create_test_app(test_config()).await;

    for body in [
        json!({"scope": "ai:test", "amount": 0}),
        json!({"scope": "ai:test", "amount": -5}),
        json!({"scope": "Bad Scope", "amount": 1}),
        json!({"scope": "", "amount": 1}),
    ] {
        let (status, _) = app
            .send_json(signed_request("/rpc/consume_budget", body.clone(), app.secret))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should be rejected", body);
    }
}

#[tokio::test]
async fn test_status_of_unknown_scope() {
    let app = create_test_app(test_config()).await;

    let (status, body) = app
        .send_json(signed_request(
            "/rpc/budget_status",
            json!({"scope": "ai:never-used"}),
            app.secret,
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_refused_debit_leaves_counter_unchanged() {
    let app = create_test_app(test_config()).await;

    consume_budget(&app.pool, "ai:unit", 7, 10).await.unwrap();
    let err = consume_budget(&app.pool, "ai:unit", 4, 10).await.unwrap_err();
    assert!(matches!(
        err,
        Error::BudgetExceeded {
            spent: 7,
            hard_limit: 10,
            requested: 4,
            ..
        }
    ));

    let status = budget_status(&app.pool, "ai:unit").await.unwrap();
    assert_eq!(status.spent, 7);
}

#[tokio::test]
async fn test_first_refusal_still_creates_scope() {
    let app = create_test_app(test_config()).await;

    let err = consume_budget(&app.pool, "ai:tiny", 5, 3).await.unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { spent: 0, .. }));

    let status = budget_status(&app.pool, "ai:tiny").await.unwrap();
    assert_eq!(status.spent, 0);
    assert_eq!(status.hard_limit, 3);
}

#[tokio::test]
async fn test_existing_scope_keeps_original_limit() {
    let app = create_test_app(test_config()).await;

    consume_budget(&app.pool, "ai:fixed", 1, 10).await.unwrap();
    let status = consume_budget(&app.pool, "ai:fixed", 1, 1_000).await.unwrap();

    assert_eq!(status.hard_limit, 10);
    assert_eq!(status.spent, 2);
}

#[tokio::test]
async fn test_concurrent_debits_never_overshoot() {
    let app = create_test_app(test_config()).await;
    let mut join_set = JoinSet::new();

    for _ in 0..25 {
        let pool = app.pool.clone();
        join_set.spawn(async move { consume_budget(&pool, "ai:race", 3, 30).await });
    }

    let mut granted = 0;
    let mut refused = 0;
    while let Some(result) = join_set.join_next().await {
        match result.unwrap() {
            Ok(_) => granted += 1,
            Err(Error::BudgetExceeded { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(granted, 10);
    assert_eq!(refused, 15);
    let status = budget_status(&app.pool, "ai:race").await.unwrap();
    assert_eq!(status.spent, 30);
    assert_eq!(status.remaining, 0);
}
