//! Group endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath, Caller};
use crate::db::{groups, Group, Member};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

/// POST /api/groups
pub async fn create_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(request): ApiJson<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    let group = groups::create_group(&state.db, caller.user_id, &request.name).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /api/groups
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(groups::list_groups_for(&state.db, caller.user_id).await?))
}

/// GET /api/groups/:id/members
pub async fn list_members(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(group_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<Member>>> {
    Ok(Json(groups::list_members(&state.db, caller.user_id, group_id).await?))
}

/// POST /api/groups/:id/leave
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(group_id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    groups::leave_group(&state.db, caller.user_id, group_id).await?;
    Ok(Json(json!({ "left": group_id })))
}
