// ABOUTME: Client side of the Model Context Protocol used to reach the tool server
// ABOUTME: Defines the McpClient contract and the reconnecting HTTP implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # MCP Client
//!
//! The tool server publishes prompt templates and tools. The gateway consumes
//! both through [`McpClient`]; [`McpConnection`] is the production
//! implementation over streamable HTTP, and tests substitute in-process stubs.

mod connection;
pub mod protocol;
mod reconnect;

pub use connection::McpConnection;
pub use protocol::{
    CallToolResult, Content, GetPromptResult, PromptArgument, PromptInfo, PromptMessage, ToolInfo,
};
pub use reconnect::ReconnectPolicy;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppResult;

/// Operations the gateway needs from the tool server
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Every tool the server advertises, across all pages
    async fn list_tools(&self) -> AppResult<Vec<ToolInfo>>;

    /// Invoke a tool
    ///
    /// Fails with `UnknownTool` when the server does not know `name`.
    async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<CallToolResult>;

    /// Every prompt the server advertises, across all pages
    async fn list_prompts(&self) -> AppResult<Vec<PromptInfo>>;

    /// Render a prompt server-side
    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> AppResult<GetPromptResult>;

    /// Liveness check
    async fn ping(&self) -> AppResult<()>;
}
