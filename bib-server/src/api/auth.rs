//! Authentication middleware
//!
//! Two caller roles:
//! - authenticated: `Authorization: Bearer <session token>`; the resolved user
//!   is attached to the request as a [`Caller`] extension
//! - service role: JSON body carrying `timestamp` and `hash` signed with the
//!   shared secret

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use bib_common::api::{validate_hash, validate_timestamp, ServiceAuthError, TimestampWindow};
use bib_common::time;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::db::sessions;
use crate::{ApiError, AppState};

/// Authenticated caller, inserted by [`session_middleware`]
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    /// Raw bearer token, kept for revocation
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Resolve the bearer session and attach the [`Caller`]
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let user_id = sessions::resolve_session(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired session".to_string()))?;

    request.extensions_mut().insert(Caller { user_id, token });
    Ok(next.run(request).await)
}

/// Verify the signed body of a service-role request
///
/// The body is buffered (bounded by `server.max_body_bytes`), checked, and
/// handed on unchanged to the handler.
pub async fn service_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // A zero secret disables service-role checks
    if state.service_secret == 0 {
        return Ok(next.run(request).await);
    }

    let limit = state.config.server.max_body_bytes;
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(format!("body exceeds {} bytes", limit)))?;

    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let timestamp = json_value
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::Unauthorized("missing timestamp".to_string()))?;
    let hash = json_value
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Unauthorized("missing hash".to_string()))?;

    let window = TimestampWindow::from(&state.config.auth);
    validate_timestamp(timestamp, time::now_millis(), window).map_err(|e| {
        warn!("Service request rejected: {}", e);
        ApiError::Unauthorized(e.to_string())
    })?;

    validate_hash(hash, &json_value, state.service_secret).map_err(|e| {
        if let ServiceAuthError::InvalidHash { provided, .. } = &e {
            warn!(provided = %provided, "Service request hash mismatch");
        }
        ApiError::Unauthorized("invalid hash".to_string())
    })?;

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}
