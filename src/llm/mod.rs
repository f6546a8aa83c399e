// ABOUTME: LLM provider abstraction layer for pluggable chat-completion backends
// ABOUTME: Defines the provider contract, request options, completions and stream chunks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # LLM Provider Interface
//!
//! Every backend (Anthropic, OpenAI, Amazon Bedrock, `DeepSeek`) implements
//! [`LlmProvider`]. The orchestrator only ever holds an `Arc<dyn LlmProvider>`
//! obtained from a [`ProviderFactory`].
//!
//! ## Key Concepts
//!
//! - **`LlmCapabilities`**: Bitflags describing provider features
//! - **`ChatRequest`**: Conversation messages, generation options and exposed tools
//! - **`Completion`**: Text, requested tool calls, token usage and elapsed time
//! - **`StreamChunk`**: Text delta, tool-call announcement or terminal marker
//!
//! ## Example: Using a Provider
//!
//! ```rust,no_run
//! use tool_gateway::llm::{ChatRequest, GenerationOptions, LlmProvider};
//! use tool_gateway::models::Message;
//!
//! async fn example(provider: &dyn LlmProvider) {
//!     let request = ChatRequest::new(vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("What time is it in Lisbon?"),
//!     ])
//!     .with_options(GenerationOptions::default().with_max_tokens(256));
//!
//!     let completion = provider.generate(&request).await;
//! }
//! ```

mod anthropic;
mod bedrock;
pub mod catalog;
mod factory;
mod openai_compatible;
mod provider;
pub mod sse_parser;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use bedrock::{BedrockConfig, BedrockProvider};
pub use factory::{LlmProviderFactory, ProviderFactory, ProviderKind};
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use provider::ChatProvider;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::Stream;

use crate::constants::generation::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::errors::AppResult;
use crate::models::{Message, MessageRole, TokenUsage, ToolCall};

// ============================================================================
// Capability Flags
// ============================================================================

bitflags::bitflags! {
    /// LLM provider capability flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LlmCapabilities: u8 {
        /// Provider streams responses incrementally
        const STREAMING = 0b0000_0001;
        /// Provider supports function/tool calling
        const FUNCTION_CALLING = 0b0000_0010;
        /// Provider accepts system messages
        const SYSTEM_MESSAGES = 0b0000_0100;
    }
}

impl LlmCapabilities {
    /// Streaming, tools and system messages
    #[must_use]
    pub const fn full_featured() -> Self {
        Self::STREAMING
            .union(Self::FUNCTION_CALLING)
            .union(Self::SYSTEM_MESSAGES)
    }

    /// Check if streaming is supported
    #[must_use]
    pub const fn supports_streaming(&self) -> bool {
        self.contains(Self::STREAMING)
    }

    /// Check if function calling is supported
    #[must_use]
    pub const fn supports_function_calling(&self) -> bool {
        self.contains(Self::FUNCTION_CALLING)
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Sampling and length settings sent to the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling mass
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff
    pub top_k: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: None,
            top_k: None,
        }
    }
}

impl GenerationOptions {
    /// Set the maximum tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Tool exposed to the model as a callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Function name
    pub name: String,
    /// Human description shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: Value,
}

/// Configuration for a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Model identifier (provider-specific)
    pub model: Option<String>,
    /// Generation options
    pub options: GenerationOptions,
    /// Tools the model may call; empty disables tool use
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    /// Create a new chat request with messages
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            options: GenerationOptions::default(),
            tools: Vec::new(),
        }
    }

    /// Set the model to use
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set generation options
    #[must_use]
    pub const fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Expose tools to the model
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// System messages joined for providers that take a single system field
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.text.as_str())
            .filter(|text| !text.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Result of a non-streaming completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Tool invocations the model asked for, in order
    pub tool_calls: Vec<ToolCall>,
    /// Token usage
    pub usage: TokenUsage,
    /// Wall-clock time of the provider round-trip
    pub elapsed: Duration,
    /// Finish reason reported by the provider
    pub finish_reason: Option<String>,
    /// Model that produced the completion
    pub model: String,
}

impl Completion {
    /// Whether the model is waiting on tool results
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A chunk of a streaming response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamChunk {
    /// Incremental text
    Delta(String),
    /// Complete tool call assembled from the stream
    ToolCall(ToolCall),
    /// End of stream with aggregated usage
    Done {
        /// Token usage for the whole response
        usage: TokenUsage,
        /// Finish reason reported by the provider
        finish_reason: Option<String>,
    },
}

/// Stream type for chat completion responses
pub type ChatStream = Pin<Box<dyn Stream<Item = AppResult<StreamChunk>> + Send>>;

// ============================================================================
// Provider Trait
// ============================================================================

/// LLM provider trait for chat completion
///
/// Dropping a [`ChatStream`] mid-iteration closes the underlying HTTP
/// response.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Unique provider identifier (e.g., "anthropic", "openai")
    fn name(&self) -> &'static str;

    /// Human-readable display name for the provider
    fn display_name(&self) -> &'static str;

    /// Provider capabilities
    fn capabilities(&self) -> LlmCapabilities;

    /// Model used when the request does not name one
    fn model(&self) -> &str;

    /// Perform a chat completion (non-streaming)
    async fn generate(&self, request: &ChatRequest) -> AppResult<Completion>;

    /// Perform a streaming chat completion
    ///
    /// The stream always ends with one [`StreamChunk::Done`] on success.
    async fn stream(&self, request: &ChatRequest) -> AppResult<ChatStream>;
}
