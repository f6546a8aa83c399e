// ABOUTME: ToolCatalog backed by the MCP server with a short TTL cache
// ABOUTME: The cache is dropped whenever the server reports an unknown tool
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::{ToolCatalog, ToolDescriptor, ToolOutput};
use crate::constants::timeouts::TOOL_CACHE_TTL_SECS;
use crate::errors::{AppResult, ErrorCode};
use crate::mcp::{McpClient, ToolInfo};

struct CachedTools {
    fetched_at: Instant,
    tools: Arc<Vec<ToolDescriptor>>,
}

/// Tool catalog over an MCP connection
pub struct McpToolCatalog {
    mcp: Arc<dyn McpClient>,
    ttl: Duration,
    cache: RwLock<Option<CachedTools>>,
}

impl From<ToolInfo> for ToolDescriptor {
    fn from(info: ToolInfo) -> Self {
        Self {
            name: info.name,
            description: info.description.unwrap_or_default(),
            input_schema: info.input_schema,
        }
    }
}

impl McpToolCatalog {
    /// Catalog with the default cache lifetime
    #[must_use]
    pub fn new(mcp: Arc<dyn McpClient>) -> Self {
        Self::with_ttl(mcp, Duration::from_secs(TOOL_CACHE_TTL_SECS))
    }

    /// Catalog with an explicit cache lifetime; zero disables caching
    #[must_use]
    pub fn with_ttl(mcp: Arc<dyn McpClient>, ttl: Duration) -> Self {
        Self {
            mcp,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Forget the cached listing
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn cached(&self) -> Option<Arc<Vec<ToolDescriptor>>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.tools))
    }

    async fn refresh(&self) -> AppResult<Arc<Vec<ToolDescriptor>>> {
        let tools: Arc<Vec<ToolDescriptor>> = Arc::new(
            self.mcp
                .list_tools()
                .await?
                .into_iter()
                .map(ToolDescriptor::from)
                .collect(),
        );
        debug!(count = tools.len(), "Refreshed tool catalog");
        *self.cache.write().await = Some(CachedTools {
            fetched_at: Instant::now(),
            tools: Arc::clone(&tools),
        });
        Ok(tools)
    }
}

#[async_trait]
impl ToolCatalog for McpToolCatalog {
    async fn list(&self) -> AppResult<Vec<ToolDescriptor>> {
        let tools = match self.cached().await {
            Some(tools) => tools,
            None => self.refresh().await?,
        };
        Ok(tools.as_ref().clone())
    }

    #[instrument(skip(self, arguments), fields(tool = %name))]
    async fn invoke(&self, name: &str, arguments: Value) -> AppResult<ToolOutput> {
        match self.mcp.call_tool(name, arguments).await {
            Ok(result) => Ok(ToolOutput {
                content: result.text(),
                is_error: result.is_error,
            }),
            Err(e) if e.code == ErrorCode::UnknownTool => {
                warn!(tool = name, "Tool server does not know tool; refreshing catalog");
                self.invalidate().await;
                if let Err(refresh_error) = self.refresh().await {
                    warn!("Tool catalog refresh failed: {refresh_error}");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
