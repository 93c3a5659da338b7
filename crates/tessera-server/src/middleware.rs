//! Tessera Middleware
//!
//! HTTP middleware for request ID generation and JSON:API media type
//! negotiation.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::handlers::{ApiError, JSONAPI_MEDIA_TYPE};
use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response},
    middleware::Next,
    response::IntoResponse,
};
use tessera_common::TesseraError;
use uuid::Uuid;

// =============================================================================
// Request ID Middleware
// =============================================================================

/// Add a unique request ID to each request.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    let mut response = next.run(request).await;

    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    response
}

// =============================================================================
// Media Type Middleware
// =============================================================================

/// True when a `Content-Type` names the JSON:API media type with parameters.
pub fn has_media_type_parameters(content_type: &str) -> bool {
    let mut parts = content_type.split(';');
    let essence = parts.next().unwrap_or("").trim();
    essence.eq_ignore_ascii_case(JSONAPI_MEDIA_TYPE) && parts.any(|p| !p.trim().is_empty())
}

/// Reject request documents sent as `application/vnd.api+json` with media
/// type parameters.
pub async fn media_type(request: Request<Body>, next: Next) -> Response<Body> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if has_media_type_parameters(content_type) {
        tracing::debug!(content_type = %content_type, "rejecting media type parameters");
        return ApiError(TesseraError::UnsupportedMediaType(format!(
            "The media type `{}` must not carry parameters.",
            JSONAPI_MEDIA_TYPE
        )))
        .into_response();
    }

    next.run(request).await
}

// =============================================================================
// Tests
// =============================================================================
