// ABOUTME: Builds LLM provider handles from a provider tag and model id
// ABOUTME: Credentials are injected at construction; no environment reads per request
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Provider Factory
//!
//! [`ProviderFactory`] is the seam the orchestrator builds providers through.
//! [`LlmProviderFactory`] is the production implementation; it fails with
//! `ConfigMissing` before any network traffic when a vendor's key is absent.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::bedrock::DEFAULT_REGION;
use super::{
    AnthropicConfig, AnthropicProvider, BedrockConfig, BedrockProvider, ChatProvider, LlmProvider,
    OpenAiCompatibleConfig, OpenAiCompatibleProvider,
};
use crate::config::{ProviderCredentials, SecretString};
use crate::errors::{AppError, AppResult};

/// Supported provider tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Anthropic direct API
    Anthropic,
    /// `OpenAI` direct API
    OpenAi,
    /// Amazon Bedrock
    Bedrock,
    /// `DeepSeek` OpenAI-compatible API
    DeepSeek,
}

impl ProviderKind {
    /// Parse a tag or display name, case-insensitively
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            "bedrock" | "amazon bedrock" | "amazon-bedrock" => Some(Self::Bedrock),
            "deepseek" => Some(Self::DeepSeek),
            _ => None,
        }
    }

    /// Canonical lowercase tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Bedrock => "bedrock",
            Self::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constructs provider handles for a `(provider, model)` pair
pub trait ProviderFactory: Send + Sync {
    /// Build a provider handle
    ///
    /// # Errors
    ///
    /// `UnsupportedProvider` for unknown tags, `ConfigMissing` when the
    /// vendor's credential is not configured.
    fn build(&self, provider: &str, model: &str) -> AppResult<Arc<dyn LlmProvider>>;
}

/// Production factory backed by start-up credentials
#[derive(Debug, Clone)]
pub struct LlmProviderFactory {
    credentials: ProviderCredentials,
}

fn require<'a>(key: Option<&'a SecretString>, variable: &str) -> AppResult<&'a SecretString> {
    key.ok_or_else(|| AppError::missing_credential(variable))
}

impl LlmProviderFactory {
    /// Create a factory over the given credentials
    #[must_use]
    pub const fn new(credentials: ProviderCredentials) -> Self {
        Self { credentials }
    }

    /// Build the concrete provider for `kind`
    ///
    /// # Errors
    ///
    /// `ConfigMissing` if the credential is absent, or an internal error if
    /// the HTTP client cannot be created.
    pub fn build_kind(&self, kind: ProviderKind, model: &str) -> AppResult<ChatProvider> {
        let creds = &self.credentials;
        let provider = match kind {
            ProviderKind::Anthropic => {
                let key = require(creds.anthropic_api_key.as_ref(), "ANTHROPIC_API_KEY")?;
                ChatProvider::Anthropic(AnthropicProvider::new(AnthropicConfig::new(
                    key.expose(),
                    model,
                    creds.anthropic_base_url.as_deref(),
                ))?)
            }
            ProviderKind::OpenAi => {
                let key = require(creds.openai_api_key.as_ref(), "OPENAI_API_KEY")?;
                ChatProvider::OpenAi(OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::openai(
                    key.expose(),
                    model,
                    creds.openai_base_url.as_deref(),
                ))?)
            }
            ProviderKind::Bedrock => {
                let key = require(creds.bedrock_api_key.as_ref(), "AMAZON_BEDROCK_API_KEY")?;
                ChatProvider::Bedrock(BedrockProvider::new(BedrockConfig {
                    api_key: key.clone(),
                    model: model.to_owned(),
                    region: creds
                        .aws_region
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REGION.to_owned()),
                    profile: creds.aws_profile.clone(),
                    base_url: creds.bedrock_base_url.clone(),
                })?)
            }
            ProviderKind::DeepSeek => {
                let key = require(creds.deepseek_api_key.as_ref(), "DEEPSEEK_API_KEY")?;
                ChatProvider::DeepSeek(OpenAiCompatibleProvider::new(
                    OpenAiCompatibleConfig::deepseek(
                        key.expose(),
                        model,
                        creds.deepseek_base_url.as_deref(),
                    ),
                )?)
            }
        };
        debug!(provider = %kind, model, "Built LLM provider");
        Ok(provider)
    }
}

impl ProviderFactory for LlmProviderFactory {
    fn build(&self, provider: &str, model: &str) -> AppResult<Arc<dyn LlmProvider>> {
        let kind = ProviderKind::parse(provider).ok_or_else(|| {
            AppError::unsupported_provider(format!("unsupported LLM provider: {provider}"))
        })?;
        Ok(Arc::new(self.build_kind(kind, model)?))
    }
}
