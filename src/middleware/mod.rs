// ABOUTME: HTTP middleware for request tracing, CORS and bearer authentication
// ABOUTME: Provides request ID propagation, per-request spans and cross-origin policy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub mod auth;
pub mod cors;
pub mod tracing;

// Bearer authentication
pub use auth::require_bearer;

// CORS configuration
pub use cors::setup_cors;

// Request tracing and context management
pub use tracing::{create_mcp_span, create_request_span, request_tracing, RequestContext};
