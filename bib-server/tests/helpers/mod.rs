//! Test helpers shared by the bib-server integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use bib_common::api::{load_shared_secret, sign_request};
use bib_common::config::TomlConfig;
use bib_common::db::init_database;
use bib_common::time;
use bib_server::db::{sessions, users};
use bib_server::{build_router, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: i64 = 4_242_424_242;

/// Router over a throwaway database; `_dir` must outlive the test
pub struct TestApp {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub router: Router,
    pub secret: i64,
}

/// Config with a fixed service secret and a timestamp window wide enough for
/// a loaded test machine
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.auth.service_secret = Some(TEST_SECRET);
    config.auth.max_past_ms = 60_000;
    config.auth.max_future_ms = 60_000;
    config
}

pub async fn create_test_app(config: TomlConfig) -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("bib.db")).await.unwrap();
    let secret = load_shared_secret(&pool, config.auth.service_secret)
        .await
        .unwrap();

    let state = AppState::new(pool.clone(), config, secret).unwrap();
    TestApp {
        _dir: dir,
        pool,
        router: build_router(state),
        secret,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send and decode the JSON body (Null when empty or not JSON)
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response.into_body()).await)
    }

    /// User with a live session; returns (user id, bearer token)
    pub async fn create_user(&self, name: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        users::ensure_user(&self.pool, id, name).await.unwrap();
        let session = sessions::issue_session(&self.pool, id, 1).await.unwrap();
        (id, session.token)
    }
}

pub async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn authed_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Service-role request signed with `secret` at the current time
pub fn signed_request(uri: &str, mut body: Value, secret: i64) -> Request<Body> {
    sign_request(&mut body, secret, time::now_millis());
    json_request("POST", uri, &body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
