// ABOUTME: Tagged dispatch over the concrete LLM providers
// ABOUTME: One variant per supported vendor, each delegating to its client
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Chat Provider
//!
//! [`ChatProvider`] closes the set of vendors the factory can produce. It
//! implements [`LlmProvider`] itself, so callers hold either a `ChatProvider`
//! or any other `Arc<dyn LlmProvider>` (test stubs) interchangeably.

use std::fmt;

use async_trait::async_trait;

use super::{
    AnthropicProvider, BedrockProvider, ChatRequest, ChatStream, Completion, LlmCapabilities,
    LlmProvider, OpenAiCompatibleProvider,
};
use crate::errors::AppResult;

/// Unified chat provider over the supported vendors
pub enum ChatProvider {
    /// Anthropic Messages API
    Anthropic(AnthropicProvider),
    /// `OpenAI` Chat Completions API
    OpenAi(OpenAiCompatibleProvider),
    /// Amazon Bedrock Converse API
    Bedrock(BedrockProvider),
    /// `DeepSeek` via its OpenAI-compatible endpoint
    DeepSeek(OpenAiCompatibleProvider),
}

impl ChatProvider {
    fn inner(&self) -> &dyn LlmProvider {
        match self {
            Self::Anthropic(provider) => provider,
            Self::OpenAi(provider) | Self::DeepSeek(provider) => provider,
            Self::Bedrock(provider) => provider,
        }
    }
}

impl fmt::Debug for ChatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatProvider")
            .field("provider", &self.name())
            .field("model", &self.model())
            .finish()
    }
}

#[async_trait]
impl LlmProvider for ChatProvider {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn display_name(&self) -> &'static str {
        self.inner().display_name()
    }

    fn capabilities(&self) -> LlmCapabilities {
        self.inner().capabilities()
    }

    fn model(&self) -> &str {
        self.inner().model()
    }

    async fn generate(&self, request: &ChatRequest) -> AppResult<Completion> {
        self.inner().generate(request).await
    }

    async fn stream(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        self.inner().stream(request).await
    }
}
