//! Error types for bib-server
//!
//! Every failure reaches the client as
//! `{"error": {"code": "...", "message": "..."}}` with a matching status.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the role for this resource (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request body over the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Body is not JSON (415)
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Well-formed JSON of the wrong shape (422)
    #[error("Unprocessable entity: {0}")]
    Unprocessable(String),

    /// Budget scope would exceed its hard limit (429)
    #[error("Budget exceeded for scope '{scope}'")]
    BudgetExceeded {
        scope: String,
        spent: i64,
        hard_limit: i64,
        requested: i64,
    },

    /// Catalog upstream unreachable or timed out (502)
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<bib_common::Error> for ApiError {
    fn from(err: bib_common::Error) -> Self {
        use bib_common::Error;

        if err.is_unique_violation() {
            return ApiError::Conflict("record already exists".to_string());
        }
        if err.is_check_violation() {
            return ApiError::BadRequest("value rejected by database constraint".to_string());
        }

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Forbidden(msg) => ApiError::Forbidden(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::BudgetExceeded {
                scope,
                spent,
                hard_limit,
                requested,
            } => ApiError::BudgetExceeded {
                scope,
                spent,
                hard_limit,
                requested,
            },
            other => {
                error!("Unhandled error: {}", other);
                ApiError::Internal("internal error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            ApiError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg.clone(),
            ),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE_ENTITY", msg.clone())
            }
            ApiError::BudgetExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "BUDGET_EXCEEDED", self.to_string())
            }
            ApiError::UpstreamUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", msg.clone())
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        if let ApiError::BudgetExceeded {
            spent,
            hard_limit,
            requested,
            ..
        } = &self
        {
            body["error"]["spent"] = json!(spent);
            body["error"]["hard_limit"] = json!(hard_limit);
            body["error"]["requested"] = json!(requested);
        }

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::UpstreamUnavailable(_)) {
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-store"),
            );
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
