// ABOUTME: Static listing of the LLM providers and models a turn may select
// ABOUTME: Serves the provider catalog used by request validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use axum::routing::get;
use axum::{Json, Router};

use crate::llm::catalog::{catalog, ProviderCatalog};

/// Provider catalog routes implementation
pub struct LlmProviderRoutes;

impl LlmProviderRoutes {
    /// `GET /llm-providers`
    pub fn routes() -> Router {
        Router::new().route("/llm-providers", get(Self::list))
    }

    async fn list() -> Json<ProviderCatalog> {
        Json(catalog())
    }
}
