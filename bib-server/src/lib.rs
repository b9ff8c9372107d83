//! bib-server library
//!
//! HTTP surface of the BiB backend:
//! - public: health, build info, catalog proxy, analytics intake
//! - authenticated (bearer session): groups, invites, invite responses
//! - service role (signed body): budget debits, session issuance

use axum::extract::DefaultBodyLimit;
use axum::Router;
use bib_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod analytics;
pub mod api;
pub mod catalog;
pub mod db;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use crate::catalog::CatalogProxy;
use crate::db::BudgetGuard;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<TomlConfig>,
    pub catalog: Arc<CatalogProxy>,
    pub budget: BudgetGuard,
    /// Service-role shared secret; 0 disables service-role checks
    pub service_secret: i64,
}

impl AppState {
    pub fn new(db: SqlitePool, config: TomlConfig, service_secret: i64) -> bib_common::Result<Self> {
        let catalog = CatalogProxy::new(&config.catalog)?;
        let budget = BudgetGuard::new(db.clone(), config.budget.clone());

        Ok(Self {
            db,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            budget,
            service_secret,
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Service role: body signed with the shared secret
    let service = Router::new()
        .route("/rpc/consume_budget", post(api::consume_budget))
        .route("/rpc/budget_status", post(api::budget_status))
        .route("/rpc/issue_session", post(api::issue_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::service_auth_middleware,
        ));

    // Authenticated role: bearer session token
    let authenticated = Router::new()
        .route("/rpc/respond_to_invite", post(api::respond_to_invite))
        .route("/api/invites", get(api::list_invites).post(api::create_invite))
        .route("/api/invites/:id/cancel", post(api::cancel_invite))
        .route("/api/groups", get(api::list_groups).post(api::create_group))
        .route("/api/groups/:id/members", get(api::list_members))
        .route("/api/groups/:id/leave", post(api::leave_group))
        .route("/api/session/revoke", post(api::revoke_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::session_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/catalog", get(api::proxy_catalog))
        .route("/api/analytics", post(api::record_event))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .merge(service)
        .merge(authenticated)
        .merge(public)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
