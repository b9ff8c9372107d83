//! Catalog proxy endpoint

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Deserialize;
use tracing::warn;

use crate::api::ApiQuery;
use crate::catalog::{cache_key, TargetError};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    /// base64url-encoded upstream URL
    pub u: Option<String>,
}

/// GET /api/catalog?u=<base64url>
///
/// Relays the upstream status, content type and body. Successful responses
/// are edge-cacheable; everything else is `no-store`.
pub async fn proxy_catalog(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> ApiResult<Response> {
    let encoded = query
        .u
        .ok_or_else(|| ApiError::BadRequest("missing 'u' parameter".to_string()))?;

    let target = state.catalog.resolve(&encoded).map_err(|e| match e {
        TargetError::Malformed(_) => ApiError::BadRequest(e.to_string()),
        TargetError::Disallowed(_) => {
            warn!("Catalog proxy refused target: {}", e);
            ApiError::Forbidden(e.to_string())
        }
    })?;

    let upstream = state.catalog.fetch(&target).await.map_err(|e| {
        warn!(key = %cache_key(&target), "Catalog upstream failed: {}", e);
        ApiError::UpstreamUnavailable("catalog upstream unavailable".to_string())
    })?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let cache_control = if upstream.is_success() {
        state.catalog.cache_control()
    } else {
        "no-store"
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CACHE_CONTROL, cache_control)
        .header("x-catalog-key", cache_key(&target));
    if let Some(content_type) = upstream
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    builder
        .body(Body::from(upstream.body.clone()))
        .map_err(|e| ApiError::Internal(format!("response build failed: {}", e)))
}
