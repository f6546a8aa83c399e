// ABOUTME: Prometheus scrape route
// ABOUTME: Renders the process-wide metrics recorder in text exposition format
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use http::header::CONTENT_TYPE;

use crate::server::ServerResources;

/// Metrics routes implementation
pub struct MetricsRoutes;

impl MetricsRoutes {
    /// `GET /metrics`
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        Router::new()
            .route("/metrics", get(Self::render))
            .with_state(Arc::clone(resources))
    }

    async fn render(State(resources): State<Arc<ServerResources>>) -> impl IntoResponse {
        (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            resources.metrics.render(),
        )
    }
}
