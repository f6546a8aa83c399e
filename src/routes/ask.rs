// ABOUTME: Blocking and streaming turn routes
// ABOUTME: Hands validated request bodies to the orchestrator under a per-request cancellation token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};

use super::invalid_body;
use crate::errors::AppResult;
use crate::middleware::require_bearer;
use crate::orchestrator::{AskRequest, AskResponse};
use crate::server::ServerResources;
use crate::streaming::sse_response;

/// Ask routes implementation
pub struct AskRoutes;

impl AskRoutes {
    /// `POST /ask` and `POST /ask-stream`
    ///
    /// Public unless the deployment opts into protecting them.
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        let router = Router::new()
            .route("/ask", post(Self::ask))
            .route("/ask-stream", post(Self::ask_stream));

        let router = match (&resources.validator, resources.protect_ask) {
            (Some(validator), true) => {
                router.route_layer(from_fn_with_state(Arc::clone(validator), require_bearer))
            }
            _ => router,
        };
        router.with_state(Arc::clone(resources))
    }

    async fn ask(
        State(resources): State<Arc<ServerResources>>,
        body: Result<Json<AskRequest>, JsonRejection>,
    ) -> AppResult<Json<AskResponse>> {
        let Json(request) = body.map_err(|rejection| invalid_body(&rejection))?;
        let cancel = resources.request_token();
        let _abort_on_disconnect = cancel.clone().drop_guard();
        let response = resources.orchestrator.ask(request, cancel).await?;
        Ok(Json(response))
    }

    async fn ask_stream(
        State(resources): State<Arc<ServerResources>>,
        body: Result<Json<AskRequest>, JsonRejection>,
    ) -> AppResult<Response> {
        let Json(request) = body.map_err(|rejection| invalid_body(&rejection))?;
        let cancel = resources.request_token();
        let events = Arc::clone(&resources.orchestrator)
            .ask_stream(request, cancel.clone())
            .await?;
        Ok(sse_response(events, cancel))
    }
}
