// ABOUTME: Route module organization for the gateway HTTP surface
// ABOUTME: Assembles health, metrics, provider, ask, chat, tool and OAuth routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Each domain module exposes a `*Routes::routes` constructor returning a
//! stateless [`Router`]; [`router`] merges them. Middleware that applies to
//! every route is added by [`Server`](crate::server::Server).

/// Blocking and streaming turns
pub mod ask;
/// Conversation history
pub mod chats;
/// Liveness
pub mod health;
/// Supported LLM providers and models
pub mod llm_providers;
/// Prometheus scrape endpoint
pub mod metrics;
/// Third-party OAuth redirect flow
pub mod oauth;
/// MCP tool listing
pub mod tools;

pub use ask::AskRoutes;
pub use chats::ChatRoutes;
pub use health::HealthRoutes;
pub use llm_providers::LlmProviderRoutes;
pub use metrics::MetricsRoutes;
pub use oauth::OAuthRoutes;
pub use tools::ToolRoutes;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::Router;

use crate::errors::AppError;
use crate::server::ServerResources;

/// Every gateway route
#[must_use]
pub fn router(resources: &Arc<ServerResources>) -> Router {
    let router = Router::new()
        .merge(HealthRoutes::routes())
        .merge(MetricsRoutes::routes(resources))
        .merge(LlmProviderRoutes::routes())
        .merge(AskRoutes::routes(resources))
        .merge(ChatRoutes::routes(resources))
        .merge(ToolRoutes::routes(resources));

    match &resources.oauth {
        Some(broker) => router.merge(OAuthRoutes::routes(broker)),
        None => router,
    }
}

/// 400 for a body that is not valid JSON for the endpoint
pub(crate) fn invalid_body(rejection: &JsonRejection) -> AppError {
    AppError::invalid_input(format!("invalid request body: {}", rejection.body_text()))
}
