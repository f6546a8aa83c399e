// ABOUTME: Request tracing middleware for correlation and structured logging
// ABOUTME: Propagates or generates request IDs and wraps every HTTP request in a span
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;
use tracing::{field::Empty, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::constants::headers::REQUEST_ID;

/// Request context that flows through the request lifecycle
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation identifier echoed in the `x-request-id` response header
    pub request_id: String,
}

impl RequestContext {
    /// Create new request context with generated request ID
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: format!("req_{}", Uuid::new_v4().simple()),
        }
    }

    /// Record context in current tracing span
    pub fn record_in_span(&self) {
        Span::current().record("request_id", &self.request_id);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Axum middleware that assigns a request ID and traces the request
///
/// An incoming `x-request-id` is reused when present. The resulting
/// [`RequestContext`] is stored in request extensions for handlers.
pub async fn request_tracing(mut request: Request, next: Next) -> Response {
    let context = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map_or_else(RequestContext::new, |value| RequestContext {
            request_id: value.to_owned(),
        });

    let span = create_request_span(request.method().as_str(), request.uri().path());
    span.record("request_id", &context.request_id);
    request.extensions_mut().insert(context.clone());

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    span.record("status_code", response.status().as_u16());
    span.record("duration_ms", duration_ms);
    info!(
        parent: &span,
        status = response.status().as_u16(),
        duration_ms,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&context.request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// Create a tracing span for HTTP requests
pub fn create_request_span(method: &str, path: &str) -> Span {
    info_span!(
        "http_request",
        method = %method,
        path = %path,
        request_id = Empty,
        user_id = Empty,
        status_code = Empty,
        duration_ms = Empty,
    )
}

/// Create a tracing span for MCP operations
pub fn create_mcp_span(operation: &str) -> Span {
    info_span!(
        "mcp_operation",
        operation = %operation,
        request_id = Empty,
        tool_name = Empty,
        duration_ms = Empty,
        success = Empty,
    )
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(request_tracing));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(REQUEST_ID).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(request_tracing));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers().get(REQUEST_ID).unwrap().to_str().unwrap();
        assert!(id.starts_with("req_"));
    }
}
