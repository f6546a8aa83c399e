// ABOUTME: Request orchestrator driving one user turn from validation to reply
// ABOUTME: Resolves the chat, renders the template, builds the provider and runs the tool loop
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Request Orchestrator
//!
//! One turn runs through a fixed sequence of steps:
//!
//! 1. **Validate** the question and provider selection against the catalog.
//! 2. **Resolve** the conversation, creating one when no id is given.
//! 3. **Record** the user message before any external call.
//! 4. **Compose** generation options from defaults and overrides.
//! 5. **Render** `llm_with_tools` or `llm_general` over MCP.
//! 6. **Build** the provider through the [`ProviderFactory`].
//! 7. **Invoke** the provider, looping through tool calls.
//! 8. **Record** the assistant message with aggregate token counts.
//!
//! Steps 5 onwards run under a per-request deadline and the caller's
//! [`CancellationToken`]. A failure there leaves the user message in place;
//! blocking turns also record the error text as the assistant reply, while
//! streaming turns end with an `error` event.

pub mod history;
mod tool_loop;

pub use tool_loop::{guarded, ToolLoop, TurnOutcome};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::field::{display, Empty};
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::constants::limits::{MAX_CHAT_HISTORY_MESSAGES, MAX_TOOL_ITERATIONS};
use crate::constants::templates::{LLM_GENERAL, LLM_WITH_TOOLS, QUESTION_ARGUMENT};
use crate::constants::timeouts::REQUEST_TIMEOUT_SECS;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::llm::catalog::find_provider;
use crate::llm::{ChatRequest, GenerationOptions, ProviderFactory, ProviderKind};
use crate::metrics;
use crate::models::{Conversation, Message, MessageRole, TokenUsage};
use crate::prompts::PromptTemplateClient;
use crate::storage::ConversationStore;
use crate::tools::{self, ToolCatalog, ToolDescriptor};
use tool_loop::failure_event;

// ============================================================================
// Wire types
// ============================================================================

/// Optional generation overrides; zero means "use the default"
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Nucleus sampling mass
    pub top_p: f32,
    /// Top-k cutoff
    pub top_k: u32,
}

/// Provider and model chosen by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSelection {
    /// Provider tag or display name
    pub provider: String,
    /// Model identifier
    pub model_id: String,
}

/// Body of `/ask` and `/ask-stream`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskRequest {
    /// Existing conversation; absent, empty or nil starts a new one
    pub chat_uuid: Option<String>,
    /// User question
    pub question: String,
    /// Expose the tool catalog to the model
    #[serde(rename = "useTools")]
    pub use_tools: bool,
    /// Restrict exposed tools to these names; non-empty implies tool use
    #[serde(rename = "selectedTools")]
    pub selected_tools: Vec<String>,
    /// Generation overrides
    #[serde(rename = "modelSettings")]
    pub model_settings: ModelSettings,
    /// Provider and model
    #[serde(rename = "llmProvider")]
    pub llm_provider: ProviderSelection,
}

/// Reply of `/ask`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    /// Conversation the turn was recorded in
    pub chat_uuid: Uuid,
    /// Final answer
    pub answer: String,
    /// Input tokens summed over the turn
    pub input_token: u32,
    /// Output tokens summed over the turn
    pub output_token: u32,
}

/// One event of a streaming turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// Incremental answer text
    Delta(String),
    /// Turn recorded; always the last event of a successful turn
    Done {
        /// Conversation the turn was recorded in
        chat_id: Uuid,
        /// Token counts summed over the turn
        usage: TokenUsage,
    },
    /// Turn failed after streaming began
    Error(String),
}

// ============================================================================
// Validation
// ============================================================================

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
struct ValidatedTurn {
    chat_id: Option<Uuid>,
    question: String,
    provider: ProviderKind,
    model: String,
    options: GenerationOptions,
    use_tools: bool,
    selected_tools: Vec<String>,
}

fn parse_chat_id(raw: Option<&str>) -> AppResult<Option<Uuid>> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => {
            let id = Uuid::parse_str(raw).map_err(|_| AppError::invalid_format("Invalid chat ID"))?;
            Ok((!id.is_nil()).then_some(id))
        }
    }
}

fn validate(request: AskRequest) -> AppResult<ValidatedTurn> {
    if request.question.trim().is_empty() {
        return Err(AppError::invalid_input("question cannot be empty"));
    }

    let selection = &request.llm_provider;
    if selection.provider.trim().is_empty() || selection.model_id.trim().is_empty() {
        return Err(AppError::new(
            ErrorCode::MissingRequiredField,
            "LLM provider is required",
        ));
    }
    let entry = find_provider(&selection.provider).ok_or_else(|| {
        AppError::unsupported_provider(format!(
            "unsupported LLM provider: {}",
            selection.provider
        ))
    })?;
    if !entry.offers(&selection.model_id) {
        return Err(AppError::invalid_input(format!(
            "model {} is not supported by {}",
            selection.model_id, entry.name
        )));
    }

    let chat_id = parse_chat_id(request.chat_uuid.as_deref())?;
    let use_tools = request.use_tools || !request.selected_tools.is_empty();

    Ok(ValidatedTurn {
        chat_id,
        question: request.question,
        provider: entry.kind(),
        model: request.llm_provider.model_id,
        options: compose_options(&request.model_settings),
        use_tools,
        selected_tools: request.selected_tools,
    })
}

/// Defaults overridden by every non-zero setting
#[must_use]
pub fn compose_options(settings: &ModelSettings) -> GenerationOptions {
    let mut options = GenerationOptions::default();
    if settings.temperature.abs() > f32::EPSILON {
        options.temperature = settings.temperature;
    }
    if settings.max_tokens > 0 {
        options.max_tokens = settings.max_tokens;
    }
    if settings.top_p.abs() > f32::EPSILON {
        options.top_p = Some(settings.top_p);
    }
    if settings.top_k > 0 {
        options.top_k = Some(settings.top_k);
    }
    options
}

// ============================================================================
// Orchestrator
// ============================================================================

/// A turn whose user message is recorded
struct PreparedTurn {
    chat_id: Uuid,
    prior: Vec<Message>,
    turn: ValidatedTurn,
}

/// Drives user turns end-to-end
pub struct RequestOrchestrator {
    store: Arc<dyn ConversationStore>,
    prompts: Arc<PromptTemplateClient>,
    catalog: Arc<dyn ToolCatalog>,
    factory: Arc<dyn ProviderFactory>,
    request_timeout: Duration,
    tool_budget: usize,
    history_limit: usize,
}

impl RequestOrchestrator {
    /// Orchestrator over its collaborators with default limits
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        prompts: Arc<PromptTemplateClient>,
        catalog: Arc<dyn ToolCatalog>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            store,
            prompts,
            catalog,
            factory,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            tool_budget: MAX_TOOL_ITERATIONS,
            history_limit: MAX_CHAT_HISTORY_MESSAGES,
        }
    }

    /// Per-request deadline
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Maximum tool rounds per turn
    #[must_use]
    pub const fn with_tool_budget(mut self, budget: usize) -> Self {
        self.tool_budget = budget;
        self
    }

    /// Conversation store shared with the chat routes
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Tool catalog shared with the tool listing route
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn ToolCatalog> {
        &self.catalog
    }

    async fn resolve(&self, chat_id: Option<Uuid>) -> AppResult<Conversation> {
        match chat_id {
            None => self.store.create().await,
            Some(id) => self.store.get(id).await,
        }
    }

    /// Validate, resolve the conversation and record the user message
    async fn prepare(&self, request: AskRequest) -> AppResult<PreparedTurn> {
        let turn = validate(request)?;
        let conversation = self.resolve(turn.chat_id).await?;

        let span = Span::current();
        span.record("chat_id", display(conversation.id));
        span.record("provider", turn.provider.as_str());
        span.record("model", turn.model.as_str());

        self.store
            .append(conversation.id, Message::user(turn.question.clone()))
            .await?;

        Ok(PreparedTurn {
            chat_id: conversation.id,
            prior: conversation.messages,
            turn,
        })
    }

    /// Render the template, choose tools and build the provider
    async fn plan(&self, prepared: PreparedTurn) -> AppResult<(ToolLoop, ChatRequest)> {
        let PreparedTurn {
            chat_id,
            prior,
            turn,
        } = prepared;

        let tools = if turn.use_tools {
            let listed = self
                .catalog
                .list()
                .await
                .map_err(|e| e.with_step("tool_list"))?;
            tools::select(listed, &turn.selected_tools)
        } else {
            Vec::new()
        };
        if !tools.is_empty() {
            metrics::record_tools_enabled(turn.provider.as_str(), &turn.model);
        }

        let template = if turn.use_tools { LLM_WITH_TOOLS } else { LLM_GENERAL };
        let arguments = HashMap::from([(QUESTION_ARGUMENT.to_owned(), turn.question.clone())]);
        let rendered = self
            .prompts
            .render(template, &arguments)
            .await
            .map_err(|e| e.with_step("template_fetch"))?;

        let mut messages = history::window(&prior, self.history_limit, !tools.is_empty());
        let carries_question = rendered.iter().any(|m| m.role == MessageRole::User);
        messages.extend(rendered);
        if !carries_question {
            messages.push(Message::user(turn.question.clone()));
        }

        let provider = self
            .factory
            .build(turn.provider.as_str(), &turn.model)
            .map_err(|e| e.with_step("provider_build"))?;

        let request = ChatRequest::new(messages)
            .with_model(turn.model.clone())
            .with_options(turn.options)
            .with_tools(tools.iter().map(ToolDescriptor::to_spec).collect());
        let tool_loop = ToolLoop::new(
            provider,
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
            chat_id,
            self.tool_budget,
        );
        Ok((tool_loop, request))
    }

    async fn answer(&self, prepared: PreparedTurn) -> AppResult<TurnOutcome> {
        let (tool_loop, request) = self.plan(prepared).await?;
        let outcome = tool_loop.run(request).await?;
        tool_loop.finish(&outcome).await?;
        Ok(outcome)
    }

    async fn record_failure(&self, chat_id: Uuid, e: &AppError) {
        let span = Span::current();
        span.record("error", display(e));
        error!(
            chat_id = %chat_id,
            step = e.step().unwrap_or("unknown"),
            error = %e,
            "Turn failed"
        );
        if e.code == ErrorCode::RequestCancelled {
            return;
        }
        let reply = Message::assistant(format!("Error: {}", e.client_message()));
        if let Err(store_error) = self.store.append(chat_id, reply).await {
            warn!(chat_id = %chat_id, error = %store_error, "Failed to record error reply");
        }
    }

    /// Answer one turn and return the full reply
    ///
    /// # Errors
    ///
    /// Validation failures (400), unknown conversation (404), template,
    /// provider or storage failures, timeout (504) and cancellation (499).
    #[instrument(skip_all, fields(chat_id = Empty, provider = Empty, model = Empty, error = Empty))]
    pub async fn ask(&self, request: AskRequest, cancel: CancellationToken) -> AppResult<AskResponse> {
        let deadline = Instant::now() + self.request_timeout;
        let prepared = self.prepare(request).await?;
        let chat_id = prepared.chat_id;

        match guarded(&cancel, deadline, self.answer(prepared)).await {
            Ok(outcome) => {
                info!(
                    chat_id = %chat_id,
                    iterations = outcome.iterations,
                    input_tokens = outcome.usage.input_tokens,
                    output_tokens = outcome.usage.output_tokens,
                    "Turn completed"
                );
                Ok(AskResponse {
                    chat_uuid: chat_id,
                    answer: outcome.text,
                    input_token: outcome.usage.input_tokens,
                    output_token: outcome.usage.output_tokens,
                })
            }
            Err(e) => {
                self.record_failure(chat_id, &e).await;
                Err(e)
            }
        }
    }

    /// Answer one turn as a stream of [`TurnEvent`]s
    ///
    /// Validation and conversation errors are returned before streaming
    /// begins; later failures arrive as a final [`TurnEvent::Error`].
    ///
    /// # Errors
    ///
    /// Validation failures (400) and unknown conversation (404).
    #[instrument(skip_all, fields(chat_id = Empty, provider = Empty, model = Empty, error = Empty))]
    pub async fn ask_stream(
        self: Arc<Self>,
        request: AskRequest,
        cancel: CancellationToken,
    ) -> AppResult<impl Stream<Item = TurnEvent> + Send + 'static> {
        let deadline = Instant::now() + self.request_timeout;
        let prepared = self.prepare(request).await?;
        let chat_id = prepared.chat_id;

        Ok(stream! {
            let (tool_loop, request) = match guarded(&cancel, deadline, self.plan(prepared)).await {
                Ok(planned) => planned,
                Err(e) => {
                    if let Some(event) = failure_event(chat_id, &e) {
                        yield event;
                    }
                    return;
                }
            };

            let mut events = Box::pin(tool_loop.stream(request, cancel, deadline));
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(question: &str, provider: &str, model: &str) -> AskRequest {
        AskRequest {
            question: question.to_owned(),
            llm_provider: ProviderSelection {
                provider: provider.to_owned(),
                model_id: model.to_owned(),
            },
            ..AskRequest::default()
        }
    }

    #[test]
    fn test_request_wire_format() {
        let parsed: AskRequest = serde_json::from_value(serde_json::json!({
            "question": "hello",
            "useTools": true,
            "selectedTools": ["get_weather"],
            "modelSettings": {"temperature": 0.9, "maxTokens": 256},
            "llmProvider": {"provider": "anthropic", "modelId": "claude-3-5-sonnet-latest"}
        }))
        .unwrap();
        assert!(parsed.use_tools);
        assert_eq!(parsed.model_settings.max_tokens, 256);
        assert_eq!(parsed.llm_provider.model_id, "claude-3-5-sonnet-latest");
        assert!(parsed.chat_uuid.is_none());
    }

    #[test]
    fn test_validation_precedence() {
        let err = validate(request("", "mystery", "")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let err = validate(request("hi", "", "")).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);

        let err = validate(request("hi", "mystery", "m")).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedProvider);

        let err = validate(request("hi", "anthropic", "gpt-4o")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let turn = validate(request("hi", "Anthropic", "claude-3-5-sonnet-latest")).unwrap();
        assert_eq!(turn.provider, ProviderKind::Anthropic);
        assert!(turn.chat_id.is_none());
    }

    #[test]
    fn test_chat_id_parsing() {
        assert_eq!(parse_chat_id(None).unwrap(), None);
        assert_eq!(parse_chat_id(Some("")).unwrap(), None);
        assert_eq!(
            parse_chat_id(Some("00000000-0000-0000-0000-000000000000")).unwrap(),
            None
        );
        assert!(parse_chat_id(Some("00000000-0000-0000-0000-000000000001"))
            .unwrap()
            .is_some());
        assert_eq!(
            parse_chat_id(Some("not-a-uuid")).unwrap_err().code,
            ErrorCode::InvalidFormat
        );
    }

    #[test]
    fn test_selected_tools_imply_tool_use() {
        let mut req = request("hi", "openai", "gpt-4o");
        req.selected_tools = vec!["get_weather".to_owned()];
        assert!(validate(req).unwrap().use_tools);
    }

    #[test]
    fn test_compose_options_overrides_only_set_fields() {
        let defaults = compose_options(&ModelSettings::default());
        assert_eq!(defaults, GenerationOptions::default());
        assert_eq!(defaults.max_tokens, 1000);
        assert!((defaults.temperature - 0.5).abs() < f32::EPSILON);

        let options = compose_options(&ModelSettings {
            temperature: 0.9,
            max_tokens: 0,
            top_p: 0.8,
            top_k: 40,
        });
        assert!((options.temperature - 0.9).abs() < f32::EPSILON);
        assert_eq!(options.max_tokens, 1000);
        assert!(options.top_p.is_some_and(|p| (p - 0.8).abs() < f32::EPSILON));
        assert_eq!(options.top_k, Some(40));
    }
}
