//! Request ID middleware for the HTTP services
//!
//! Every request handled by a node or the router carries an `X-Request-ID`.
//! An incoming ID is propagated, otherwise a fresh UUID is generated; the ID
//! is attached to a tracing span and echoed in the response headers.

use axum::{
    body::Body,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a new unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Adds a request ID and logs request completion with its latency.
pub async fn request_tracing_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_request_id);

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let mut response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    if status.is_success() {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    } else {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request failed"
        );
    }

    response
}
