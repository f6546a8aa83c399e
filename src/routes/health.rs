// ABOUTME: Liveness route for load balancers and uptime checks
// ABOUTME: Answers GET /ping with a fixed JSON body
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// `GET /ping`
    pub fn routes() -> Router {
        Router::new().route("/ping", get(Self::ping))
    }

    async fn ping() -> Json<Value> {
        Json(json!({ "ping": "Pong" }))
    }
}
