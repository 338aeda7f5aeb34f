//! Per-request spans.
//!
//! # Responsibilities
//! - Assign every dispatched request a UUID v4 correlation ID
//! - Create the span all dispatch events are recorded under
//!
//! # Design Decisions
//! - An incoming `X-Request-Id` header is reused when present

use axum::http::HeaderMap;
use tracing::Span;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The caller-supplied request ID, or a fresh UUID v4.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn request_span(request_id: &str, method: &str, path: &str) -> Span {
    tracing::info_span!("request", request_id = %request_id, method = %method, path = %path)
}
