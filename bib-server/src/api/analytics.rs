//! Analytics intake endpoint

use axum::{
    body::Bytes, extract::rejection::BytesRejection, http::StatusCode, response::IntoResponse,
    Json,
};
use bib_common::time;
use serde_json::json;
use tracing::info;

use crate::analytics::AnalyticsEvent;
use crate::{ApiError, ApiResult};

/// POST /api/analytics
///
/// Validates, logs and acknowledges one event. Bodies over the router's
/// limit are refused with 413.
pub async fn record_event(
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = body?;
    let event: AnalyticsEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid event: {}", e)))?;

    event
        .validate(time::now_millis())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        target: "bib::analytics",
        name = %event.name,
        timestamp = event.timestamp,
        path = %event.path,
        session_id = %event.session_id,
        props = %event.props_value(),
        "event"
    );

    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}
