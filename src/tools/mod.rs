// ABOUTME: Tool catalog contract exposing MCP tools as invocable descriptors
// ABOUTME: Listing, lookup and conversion into LLM function specs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Tool Catalog
//!
//! The orchestrator consults the catalog inside the tool-use loop: once to
//! decide which tools to expose to the model, and once per requested call.
//! [`McpToolCatalog`] is backed by the tool server with a short-lived cache.

mod catalog;

pub use catalog::McpToolCatalog;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppResult;
use crate::llm::ToolSpec;

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Human description
    pub description: String,
    /// JSON schema of the arguments
    #[serde(skip)]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Function spec handed to an LLM provider
    #[must_use]
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Output of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Text handed back to the model
    pub content: String,
    /// The tool itself reported failure
    pub is_error: bool,
}

/// Source of callable tools
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Tools currently advertised
    async fn list(&self) -> AppResult<Vec<ToolDescriptor>>;

    /// Invoke `name` with `arguments`
    ///
    /// Fails with `UnknownTool` or `ToolInvocationFailed`.
    async fn invoke(&self, name: &str, arguments: Value) -> AppResult<ToolOutput>;
}

/// Restrict `tools` to `selected` names; an empty selection keeps everything
#[must_use]
pub fn select(tools: Vec<ToolDescriptor>, selected: &[String]) -> Vec<ToolDescriptor> {
    if selected.is_empty() {
        return tools;
    }
    tools
        .into_iter()
        .filter(|tool| selected.iter().any(|name| name == &tool.name))
        .collect()
}
