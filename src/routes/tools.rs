// ABOUTME: Tool listing route backed by the MCP tool catalog
// ABOUTME: Returns the name and description of every advertised tool
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::errors::AppResult;
use crate::server::ServerResources;
use crate::tools::ToolDescriptor;

/// Tool routes implementation
pub struct ToolRoutes;

impl ToolRoutes {
    /// `GET /api/tools`
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/tools", get(Self::list))
            .with_state(Arc::clone(resources))
    }

    async fn list(
        State(resources): State<Arc<ServerResources>>,
    ) -> AppResult<Json<Vec<ToolDescriptor>>> {
        let tools = resources.orchestrator.catalog().list().await?;
        Ok(Json(tools))
    }
}
