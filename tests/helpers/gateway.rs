// ABOUTME: Builds a gateway over stub collaborators for route and orchestration tests
// ABOUTME: Exposes the router plus handles on the provider, catalog, store and MCP stub
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use axum::Router;
use tool_gateway::auth::TokenValidator;
use tool_gateway::config::HttpConfig;
use tool_gateway::oauth::OAuthTokenBroker;
use tool_gateway::orchestrator::RequestOrchestrator;
use tool_gateway::prompts::PromptTemplateClient;
use tool_gateway::server::{Server, ServerResources};
use tool_gateway::storage::{ConversationStore, InMemoryConversationStore};

use super::stubs::{ScriptedProvider, StubCatalog, StubFactory, StubMcp};

/// A gateway wired to stubs
pub struct TestGateway {
    pub resources: Arc<ServerResources>,
    pub provider: Arc<ScriptedProvider>,
    pub factory: Arc<StubFactory>,
    pub catalog: Arc<StubCatalog>,
    pub store: Arc<InMemoryConversationStore>,
    pub mcp: Arc<StubMcp>,
}

impl TestGateway {
    /// Router with the production middleware stack
    pub fn router(&self) -> Router {
        Server::new(Arc::clone(&self.resources), HttpConfig::default()).router()
    }

    /// Orchestrator behind the routes
    pub fn orchestrator(&self) -> Arc<RequestOrchestrator> {
        Arc::clone(&self.resources.orchestrator)
    }
}

/// Knobs for [`create_test_gateway`]
pub struct GatewayBuilder {
    provider: ScriptedProvider,
    catalog: StubCatalog,
    tool_budget: Option<usize>,
    validator: Option<Arc<dyn TokenValidator>>,
    oauth: Option<Arc<OAuthTokenBroker>>,
    protect_ask: bool,
}

impl GatewayBuilder {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self {
            provider,
            catalog: StubCatalog::new(),
            tool_budget: None,
            validator: None,
            oauth: None,
            protect_ask: false,
        }
    }

    pub fn catalog(mut self, catalog: StubCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub const fn tool_budget(mut self, budget: usize) -> Self {
        self.tool_budget = Some(budget);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn oauth(mut self, broker: Arc<OAuthTokenBroker>) -> Self {
        self.oauth = Some(broker);
        self
    }

    pub const fn protect_ask(mut self) -> Self {
        self.protect_ask = true;
        self
    }

    pub fn build(self) -> TestGateway {
        let provider = Arc::new(self.provider);
        let factory = Arc::new(StubFactory::new(Arc::clone(&provider)));
        let catalog = Arc::new(self.catalog);
        let store = Arc::new(InMemoryConversationStore::new());
        let mcp = Arc::new(StubMcp::new());

        let store_handle: Arc<dyn ConversationStore> = store.clone();
        let mut orchestrator = RequestOrchestrator::new(
            store_handle,
            Arc::new(PromptTemplateClient::new(mcp.clone())),
            catalog.clone(),
            factory.clone(),
        );
        if let Some(budget) = self.tool_budget {
            orchestrator = orchestrator.with_tool_budget(budget);
        }

        let mut resources =
            ServerResources::new(Arc::new(orchestrator)).with_protect_ask(self.protect_ask);
        if let Some(validator) = self.validator {
            resources = resources.with_validator(validator);
        }
        if let Some(broker) = self.oauth {
            resources = resources.with_oauth(broker);
        }

        TestGateway {
            resources: Arc::new(resources),
            provider,
            factory,
            catalog,
            store,
            mcp,
        }
    }
}

/// Gateway answering from `provider` with no tools and auth disabled
pub fn create_test_gateway(provider: ScriptedProvider) -> TestGateway {
    GatewayBuilder::new(provider).build()
}
