// ABOUTME: Main library entry point for the tool gateway
// ABOUTME: Brokers chat turns between HTTP clients, LLM providers and an MCP tool server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Tool Gateway
//!
//! An HTTP gateway that answers chat questions through a configurable LLM
//! provider, letting the model call tools published by a Model Context
//! Protocol server.
//!
//! ## Features
//!
//! - **Provider choice per request**: Anthropic, `OpenAI`, Amazon Bedrock and `DeepSeek`
//! - **Tool-use loop**: model tool calls are executed over MCP and fed back
//! - **Prompt templates**: system prompts are rendered by the MCP server
//! - **Streaming**: answers stream as server-sent events
//! - **Conversation history**: every turn is recorded per chat id
//! - **Auth**: JWKS-validated bearer tokens and a third-party `OAuth2` broker
//!
//! ## Architecture
//!
//! - **Orchestrator**: drives one turn from validation to the recorded reply
//! - **LLM**: provider factory and the vendor adapters behind [`llm::LlmProvider`]
//! - **MCP**: the reconnecting client, prompt templates and the tool catalog
//! - **Storage**: the conversation store
//! - **Routes**: the HTTP surface, assembled by [`server::Server`]
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tool_gateway::config::ServerConfig;
//! use tool_gateway::errors::AppResult;
//! use tool_gateway::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     Server::from_config(&config).await?.run().await
//! }
//! ```

/// Bearer token validation
pub mod auth;

/// Environment configuration
pub mod config;

/// Shared constants
pub mod constants;

/// Error taxonomy and HTTP mapping
pub mod errors;

/// JSON-RPC 2.0 envelopes for the MCP transport
pub mod jsonrpc;

/// LLM providers, provider factory and model catalog
pub mod llm;

/// Structured logging setup
pub mod logging;

/// Model Context Protocol client
pub mod mcp;

/// Prometheus metrics
pub mod metrics;

/// HTTP middleware
pub mod middleware;

/// Conversation data model
pub mod models;

/// Third-party `OAuth2` token broker
pub mod oauth;

/// Turn orchestration and the tool-use loop
pub mod orchestrator;

/// Prompt templates rendered by the MCP server
pub mod prompts;

/// HTTP routes
pub mod routes;

/// Server assembly and graceful shutdown
pub mod server;

/// Conversation storage
pub mod storage;

/// Server-sent event responses
pub mod streaming;

/// Span export
pub mod telemetry;

/// Tool catalog
pub mod tools;
