// ABOUTME: Static catalog of supported LLM providers and their model ids
// ABOUTME: Backs the /llm-providers listing and request validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::Serialize;

use super::factory::ProviderKind;

/// One selectable model
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelEntry {
    /// Human-readable name
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
    /// Identifier passed to the provider API
    #[serde(rename = "modelId")]
    pub model_id: &'static str,
}

/// One provider and the models it offers
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderEntry {
    /// Display name
    pub name: &'static str,
    /// Models offered
    pub models: &'static [ModelEntry],
    #[serde(skip)]
    kind: ProviderKind,
}

impl ProviderEntry {
    /// Factory tag for this provider
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Whether `model_id` is listed for this provider
    #[must_use]
    pub fn offers(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m.model_id == model_id)
    }
}

/// Body of `GET /llm-providers`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderCatalog {
    /// Every supported provider
    pub providers: &'static [ProviderEntry],
}

const fn model(name: &'static str, description: &'static str, model_id: &'static str) -> ModelEntry {
    ModelEntry {
        name,
        description,
        model_id,
    }
}

const ANTHROPIC_MODELS: &[ModelEntry] = &[
    model("Claude 3.5 Haiku Latest", "Fast and cost-effective model", "claude-3-5-haiku-latest"),
    model("Claude 3.5 Haiku 2024-10-22", "Fast and cost-effective model", "claude-3-5-haiku-20241022"),
    model("Claude 3.5 Sonnet Latest", "Our most intelligent model", "claude-3-5-sonnet-latest"),
    model("Claude 3.5 Sonnet 2024-10-22", "Our most intelligent model", "claude-3-5-sonnet-20241022"),
    model("Claude 3.5 Sonnet 2024-06-20", "Our previous most intelligent model", "claude-3-5-sonnet-20240620"),
    model("Claude 3 Opus Latest", "Excels at writing and complex tasks", "claude-3-opus-latest"),
    model("Claude 3 Opus 2024-02-29", "Excels at writing and complex tasks", "claude-3-opus-20240229"),
    model("Claude 3 Sonnet 2024-02-29", "Balance of speed and intelligence", "claude-3-sonnet-20240229"),
    model("Claude 3 Haiku 2024-03-07", "Our previous fast and cost-effective", "claude-3-haiku-20240307"),
    model("Claude 2.1", "Powerful language model for general-purpose tasks", "claude-2.1"),
    model("Claude 2.0", "Advanced language model optimized for reliability and thoughtful responses", "claude-2.0"),
];

const OPENAI_MODELS: &[ModelEntry] = &[
    model("GPT-4o Latest", "Latest GPT-4o model", "chatgpt-4o-latest"),
    model("GPT-4o Mini", "Optimized GPT-4o Mini model", "gpt-4o-mini"),
    model("GPT-4", "Standard GPT-4 model", "gpt-4"),
    model("GPT-4 Turbo", "Most capable GPT-4 model for various tasks", "gpt-4-turbo"),
    model("GPT-3.5 Turbo", "Efficient model balancing performance and speed", "gpt-3.5-turbo"),
];

const BEDROCK_MODELS: &[ModelEntry] = &[
    model("Claude 3 Haiku 2024-03-07", "Optimized for quick, detailed responses", "anthropic.claude-3-haiku-20240307-v1:0"),
    model("Claude 3 Opus 2024-02-29", "Excels at writing and complex tasks", "anthropic.claude-3-opus-20240229-v1:0"),
    model("Claude 3 Sonnet 2024-02-29", "Balanced performance and intelligence", "anthropic.claude-3-sonnet-20240229-v1:0"),
    model("Claude 3.5 Haiku 2024-10-22", "Our most recent fast and cost-effective model", "anthropic.claude-3-5-haiku-20241022-v1:0"),
    model("Claude 3.5 Sonnet 2024-10-22", "Intelligent and fine-tuned for deep tasks", "anthropic.claude-3-5-sonnet-20241022-v2:0"),
    model("Claude 3.5 Sonnet 2024-06-20", "Balanced for intelligent and previous updates", "anthropic.claude-3-5-sonnet-20240620-v1:0"),
    model("Titan Text G1 - Express", "Amazon's express text model for versatile use cases", "amazon.titan-text-express-v1"),
    model("Cohere: Command R+", "Advanced command response model", "cohere.command-r-plus-v1:0"),
    model("Cohere: Command R", "Command-response optimized model", "cohere.command-r-v1:0"),
    model("Llama 3 8B Instruct", "Meta's mid-range instruct model", "meta.llama3-8b-instruct-v1:0"),
    model("Llama 3 70B Instruct", "Meta's large instruct model", "meta.llama3-70b-instruct-v1:0"),
    model("Llama 3.1 8B Instruct", "Updated 8B instruct model by Meta", "meta.llama3-1-8b-instruct-v1:0"),
    model("Llama 3.1 70B Instruct", "Updated comprehensive instruct model by Meta", "meta.llama3-1-70b-instruct-v1:0"),
    model("Llama 3.1 405B Instruct", "Meta's groundbreaking large instruct model", "meta.llama3-1-405b-instruct-v1:0"),
    model("Llama 3.2 1B Instruct", "Compact instruct model for lightweight tasks", "meta.llama3-2-1b-instruct-v1:0"),
    model("Llama 3.2 3B Instruct", "Balanced model for intelligence and agility", "meta.llama3-2-3b-instruct-v1:0"),
    model("Llama 3.2 11B Instruct", "High-precision instruct model at 11B scale", "meta.llama3-2-11b-instruct-v1:0"),
    model("Llama 3.2 90B Instruct", "Meta's premier 90B-scale instruct model", "meta.llama3-2-90b-instruct-v1:0"),
    model("Llama 3.3 70B Instruct", "Meta's latest iteration of 70B instruct", "meta.llama3-3-70b-instruct-v1:0"),
    model("Mistral 7B Instruct", "Compact yet powerful instruct model by MistralAI", "mistral.mistral-7b-instruct-v0:2"),
    model("Mistral Large (24.02)", "Latest large model optimized by MistralAI", "mistral.mistral-large-2402-v1:0"),
];

const DEEPSEEK_MODELS: &[ModelEntry] = &[
    model("DeepSeek Chat", "Conversational AI model optimized for interactive chats", "deepseek-chat"),
    model("DeepSeek Reasoner", "Advanced reasoning model for analytical tasks", "deepseek-reasoner"),
];

const PROVIDERS: &[ProviderEntry] = &[
    ProviderEntry {
        name: "Anthropic",
        models: ANTHROPIC_MODELS,
        kind: ProviderKind::Anthropic,
    },
    ProviderEntry {
        name: "OpenAI",
        models: OPENAI_MODELS,
        kind: ProviderKind::OpenAi,
    },
    ProviderEntry {
        name: "Amazon Bedrock",
        models: BEDROCK_MODELS,
        kind: ProviderKind::Bedrock,
    },
    ProviderEntry {
        name: "DeepSeek",
        models: DEEPSEEK_MODELS,
        kind: ProviderKind::DeepSeek,
    },
];

/// The full provider catalog
#[must_use]
pub const fn catalog() -> ProviderCatalog {
    ProviderCatalog {
        providers: PROVIDERS,
    }
}

/// Look up a provider by factory tag or display name, case-insensitively
#[must_use]
pub fn find_provider(provider: &str) -> Option<&'static ProviderEntry> {
    let kind = ProviderKind::parse(provider)?;
    PROVIDERS.iter().find(|entry| entry.kind == kind)
}

/// Whether `model_id` is listed under `provider`
#[must_use]
pub fn is_supported(provider: &str, model_id: &str) -> bool {
    find_provider(provider).is_some_and(|entry| entry.offers(model_id))
}
