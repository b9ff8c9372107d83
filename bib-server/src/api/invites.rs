//! Invite endpoints and the invite-response RPC

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath, ApiQuery, Caller};
use crate::db::{invites, Invite, InviteDecision, InviteStatus};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub group_id: Uuid,
    pub invitee_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListInvitesQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondToInviteRequest {
    pub invite_id: Uuid,
    pub decision: InviteDecision,
}

/// Outcome of an answer or cancellation
#[derive(Debug, Serialize)]
pub struct InviteOutcome {
    pub invite_id: Uuid,
    pub status: InviteStatus,
}

/// POST /api/invites
pub async fn create_invite(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(request): ApiJson<CreateInviteRequest>,
) -> ApiResult<(StatusCode, Json<Invite>)> {
    let invite =
        invites::create_invite(&state.db, caller.user_id, request.group_id, request.invitee_id)
            .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

/// GET /api/invites?status=pending
pub async fn list_invites(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<ListInvitesQuery>,
) -> ApiResult<Json<Vec<Invite>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<InviteStatus>)
        .transpose()?;
    Ok(Json(invites::list_invites(&state.db, caller.user_id, status).await?))
}

/// POST /api/invites/:id/cancel
pub async fn cancel_invite(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(invite_id): ApiPath<Uuid>,
) -> ApiResult<Json<InviteOutcome>> {
    let status = invites::cancel_invite(&state.db, caller.user_id, invite_id).await?;
    Ok(Json(InviteOutcome { invite_id, status }))
}

/// POST /rpc/respond_to_invite
///
/// Idempotent: answering a resolved invite returns its current status.
pub async fn respond_to_invite(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(request): ApiJson<RespondToInviteRequest>,
) -> ApiResult<Json<InviteOutcome>> {
    let status =
        invites::respond_to_invite(&state.db, caller.user_id, request.invite_id, request.decision)
            .await?;
    Ok(Json(InviteOutcome {
        invite_id: request.invite_id,
        status,
    }))
}
