// ABOUTME: HTTP server assembly: shared resources, middleware stack and graceful shutdown
// ABOUTME: Wires MCP, templates, tools, providers, auth and OAuth into the axum router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Server
//!
//! [`ServerResources`] holds every collaborator a handler needs and is shared
//! behind an `Arc`. [`Server`] binds the listener, applies the middleware
//! stack and drives graceful shutdown:
//!
//! 1. the MCP connection is closed,
//! 2. the listener stops accepting and in-flight requests keep running,
//! 3. after the shutdown deadline the root cancellation token aborts the rest.

use std::future::{pending, Future};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::middleware::from_fn;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use crate::auth::{JwksValidator, TokenValidator};
use crate::config::{HttpConfig, ServerConfig};
use crate::constants::limits::MAX_REQUEST_BODY_BYTES;
use crate::errors::{AppError, AppResult};
use crate::llm::LlmProviderFactory;
use crate::mcp::{McpClient, McpConnection};
use crate::metrics;
use crate::middleware::{request_tracing, setup_cors};
use crate::oauth::{
    FileTokenStorage, InMemoryTokenStorage, OAuthTokenBroker, ProviderConfig, TokenStorage,
};
use crate::orchestrator::RequestOrchestrator;
use crate::prompts::PromptTemplateClient;
use crate::routes;
use crate::storage::InMemoryConversationStore;
use crate::tools::McpToolCatalog;

/// Collaborators shared by every handler
pub struct ServerResources {
    /// Turn orchestration, conversation store and tool catalog
    pub orchestrator: Arc<RequestOrchestrator>,
    /// Bearer validation; `None` leaves every route public
    pub validator: Option<Arc<dyn TokenValidator>>,
    /// Third-party OAuth broker; `None` leaves `/oauth/*` unmounted
    pub oauth: Option<Arc<OAuthTokenBroker>>,
    /// Prometheus render handle
    pub metrics: PrometheusHandle,
    /// Require a bearer on `/ask` and `/ask-stream` as well
    pub protect_ask: bool,
    /// Root of every per-request cancellation token
    pub shutdown: CancellationToken,
}

impl ServerResources {
    /// Resources around `orchestrator` with auth and OAuth disabled
    #[must_use]
    pub fn new(orchestrator: Arc<RequestOrchestrator>) -> Self {
        Self {
            orchestrator,
            validator: None,
            oauth: None,
            metrics: metrics::install(),
            protect_ask: false,
            shutdown: CancellationToken::new(),
        }
    }

    /// Protect routes with `validator`
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Mount the OAuth routes over `broker`
    #[must_use]
    pub fn with_oauth(mut self, broker: Arc<OAuthTokenBroker>) -> Self {
        self.oauth = Some(broker);
        self
    }

    /// Require a bearer on the ask routes
    #[must_use]
    pub const fn with_protect_ask(mut self, protect_ask: bool) -> Self {
        self.protect_ask = protect_ask;
        self
    }

    /// Cancellation token for one request, cancelled on shutdown
    #[must_use]
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

fn token_storage(path: Option<&Path>) -> Arc<dyn TokenStorage> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Persisting OAuth tokens to file");
            Arc::new(FileTokenStorage::new(path))
        }
        None => Arc::new(InMemoryTokenStorage::new()),
    }
}

/// The gateway HTTP server
pub struct Server {
    resources: Arc<ServerResources>,
    http: HttpConfig,
    mcp: Option<Arc<McpConnection>>,
}

impl Server {
    /// Server over prepared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>, http: HttpConfig) -> Self {
        Self {
            resources,
            http,
            mcp: None,
        }
    }

    /// Close `connection` first during shutdown
    #[must_use]
    pub fn with_mcp(mut self, connection: Arc<McpConnection>) -> Self {
        self.mcp = Some(connection);
        self
    }

    /// Connect to MCP and build every collaborator from `config`
    ///
    /// # Errors
    ///
    /// Fails when the MCP server cannot be reached within the retry budget,
    /// or when auth or OAuth is enabled with incomplete settings.
    pub async fn from_config(config: &ServerConfig) -> AppResult<Self> {
        let connection = McpConnection::connect(config.mcp.clone()).await?;
        let mcp: Arc<dyn McpClient> = connection.clone();

        let orchestrator = RequestOrchestrator::new(
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(PromptTemplateClient::new(Arc::clone(&mcp))),
            Arc::new(McpToolCatalog::new(mcp)),
            Arc::new(LlmProviderFactory::new(config.providers.clone())),
        )
        .with_request_timeout(config.http.request_timeout);

        let mut resources = ServerResources::new(Arc::new(orchestrator))
            .with_protect_ask(config.auth.protect_ask);

        if config.auth.enabled {
            let validator = JwksValidator::from_config(&config.auth)?;
            resources = resources.with_validator(Arc::new(validator));
        }

        let google = &config.google_oauth;
        if google.enabled {
            let broker = OAuthTokenBroker::new(
                ProviderConfig::from(google),
                token_storage(google.token_file.as_deref()),
                google.state_cookie.clone(),
            )?;
            resources = resources.with_oauth(Arc::new(broker));
        }

        Ok(Self::new(Arc::new(resources), config.http.clone()).with_mcp(connection))
    }

    /// Shared resources
    #[must_use]
    pub fn resources(&self) -> &Arc<ServerResources> {
        &self.resources
    }

    /// Routes with the middleware stack applied
    #[must_use]
    pub fn router(&self) -> Router {
        routes::router(&self.resources)
            .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
            .layer(setup_cors())
            .layer(from_fn(request_tracing))
    }

    /// Bind the configured address and serve until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound or the server stops abnormally.
    pub async fn run(self) -> AppResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.http.host, self.http.port)
            .parse()
            .map_err(|e| AppError::config(format!("Invalid listen address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
        info!(%addr, "HTTP server listening");
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Fails when the server stops abnormally.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let stopping = CancellationToken::new();

        let trigger = stopping.clone();
        let mcp = self.mcp.clone();
        let graceful = async move {
            shutdown.await;
            info!("Shutdown requested");
            trigger.cancel();
            if let Some(mcp) = mcp {
                mcp.disconnect().await;
                info!("MCP connection closed");
            }
        };

        let root = self.resources.shutdown.clone();
        let deadline = self.http.shutdown_timeout;
        let watchdog = tokio::spawn(async move {
            stopping.cancelled().await;
            sleep(deadline).await;
            warn!(
                deadline_secs = deadline.as_secs(),
                "Shutdown deadline reached; aborting in-flight requests"
            );
            root.cancel();
        });

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await;
        watchdog.abort();
        self.resources.shutdown.cancel();

        result.map_err(|e| AppError::internal(format!("HTTP server error: {e}")))?;
        info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}
