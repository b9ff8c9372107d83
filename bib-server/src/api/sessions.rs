//! Session issuance and revocation

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::{ApiJson, Caller};
use crate::db::{sessions, users, IssuedSession};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct IssueSessionRequest {
    pub user_id: Uuid,
    pub display_name: String,
}

/// POST /rpc/issue_session (service role)
///
/// Called by the page tier after it has authenticated a user. Creates the
/// user on first sight and returns a fresh bearer token.
pub async fn issue_session(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<IssueSessionRequest>,
) -> ApiResult<(StatusCode, Json<IssuedSession>)> {
    users::ensure_user(&state.db, request.user_id, &request.display_name).await?;
    let session = sessions::issue_session(
        &state.db,
        request.user_id,
        state.config.auth.session_ttl_hours,
    )
    .await?;

    info!(user_id = %request.user_id, "Session issued");
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/session/revoke
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Value>> {
    let revoked = sessions::revoke_session(&state.db, &caller.token).await?;
    Ok(Json(json!({ "revoked": revoked })))
}
