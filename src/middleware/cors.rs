// ABOUTME: CORS middleware configuration for HTTP API endpoints
// ABOUTME: Allows any origin with the method and header set browser chat clients send
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::time::Duration;

use http::{header::HeaderName, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Preflight cache lifetime
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(300);

/// Configure CORS for the gateway
///
/// # Allowed Headers
///
/// - `accept`, `authorization`, `content-type`
/// - `x-csrf-token`
///
/// The `link` header is exposed to scripts and preflight responses are cached
/// for five minutes.
#[must_use]
pub fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_headers([
            HeaderName::from_static("accept"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .expose_headers([HeaderName::from_static("link")])
        .max_age(PREFLIGHT_MAX_AGE)
}
