// ABOUTME: Anthropic Messages API provider with tool use and SSE streaming
// ABOUTME: Converts conversation messages to content blocks and assembles streamed tool input
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Anthropic Provider
//!
//! Talks to `POST /v1/messages`. System messages are lifted into the
//! top-level `system` field; tool calls and tool results travel as
//! `tool_use` / `tool_result` content blocks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};

use super::sse_parser::{
    body_preview, create_sse_stream, provider_error, send_with_retry, RetryConfig,
    SseChunkParser,
};
use super::{ChatRequest, ChatStream, Completion, LlmCapabilities, LlmProvider, StreamChunk};
use crate::config::SecretString;
use crate::constants::timeouts::CONNECT_TIMEOUT_SECS;
use crate::errors::{AppError, AppResult};
use crate::models::{Message, MessageRole, TokenUsage, ToolCall};

/// Anthropic API base URL
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header
const ANTHROPIC_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "Anthropic";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

/// Streaming events, discriminated by `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StreamMessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: AnthropicUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicErrorDetail,
    },
}

#[derive(Debug, Deserialize)]
struct StreamMessageStart {
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

// ============================================================================
// Message Conversion
// ============================================================================

/// Convert non-system conversation messages into Anthropic turns
///
/// Tool results are sent back as a `user` turn holding `tool_result` blocks.
fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .filter_map(|message| {
            let (role, content) = match message.role {
                MessageRole::User => ("user", vec![ContentBlock::Text {
                    text: message.text.clone(),
                }]),
                MessageRole::Assistant => {
                    let mut blocks = Vec::new();
                    if !message.text.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: message.text.clone(),
                        });
                    }
                    blocks.extend(message.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }));
                    ("assistant", blocks)
                }
                MessageRole::Tool => (
                    "user",
                    message
                        .tool_results
                        .iter()
                        .map(|result| ContentBlock::ToolResult {
                            tool_use_id: result.call_id.clone(),
                            content: result.content.clone(),
                            is_error: result.is_error,
                        })
                        .collect(),
                ),
                MessageRole::System => return None,
            };
            (!content.is_empty()).then_some(AnthropicMessage { role, content })
        })
        .collect()
}

// ============================================================================
// Streaming
// ============================================================================

#[derive(Debug)]
struct PendingToolUse {
    index: usize,
    id: String,
    name: String,
    input_json: String,
}

/// Stateful parser for the Messages streaming protocol
#[derive(Debug, Default)]
struct AnthropicChunkParser {
    usage: TokenUsage,
    stop_reason: Option<String>,
    pending: Vec<PendingToolUse>,
}

impl AnthropicChunkParser {
    fn complete_tool_use(&mut self, index: usize) -> Option<StreamChunk> {
        let position = self.pending.iter().position(|p| p.index == index)?;
        let pending = self.pending.remove(position);
        let arguments = if pending.input_json.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&pending.input_json).unwrap_or_else(|e| {
                warn!("Anthropic tool input is not valid JSON: {e}");
                Value::String(pending.input_json.clone())
            })
        };
        Some(StreamChunk::ToolCall(ToolCall {
            id: pending.id,
            name: pending.name,
            arguments,
        }))
    }

    fn done(&mut self) -> StreamChunk {
        StreamChunk::Done {
            usage: self.usage,
            finish_reason: self.stop_reason.take(),
        }
    }
}

impl SseChunkParser for AnthropicChunkParser {
    fn parse(&mut self, data: &str) -> Vec<AppResult<StreamChunk>> {
        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                debug!("Skipping unrecognised Anthropic stream event: {e}");
                return Vec::new();
            }
        };

        match event {
            StreamEvent::MessageStart { message } => {
                self.usage.input_tokens = message.usage.input_tokens;
                Vec::new()
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, .. },
            } => {
                self.pending.push(PendingToolUse {
                    index,
                    id,
                    name,
                    input_json: String::new(),
                });
                Vec::new()
            }
            StreamEvent::ContentBlockStart {
                content_block: ContentBlock::Text { text },
                ..
            } => vec![Ok(StreamChunk::Delta(text))],
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![Ok(StreamChunk::Delta(text))],
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.pending.iter_mut().find(|p| p.index == index) {
                        pending.input_json.push_str(&partial_json);
                    }
                    Vec::new()
                }
                BlockDelta::Other => Vec::new(),
            },
            StreamEvent::ContentBlockStop { index } => {
                self.complete_tool_use(index).map(Ok).into_iter().collect()
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = delta.stop_reason;
                self.usage.output_tokens = usage.output_tokens;
                Vec::new()
            }
            StreamEvent::MessageStop => vec![Ok(self.done())],
            StreamEvent::Error { error } => vec![Err(AppError::external_service(
                PROVIDER,
                error.message,
            ))],
            StreamEvent::ContentBlockStart { .. } | StreamEvent::Ping => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<AppResult<StreamChunk>> {
        vec![Ok(self.done())]
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Configuration for the Anthropic provider
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key sent as `x-api-key`
    pub api_key: SecretString,
    /// Model to use
    pub model: String,
    /// API base URL
    pub base_url: String,
}

impl AnthropicConfig {
    /// Configuration against the public API, with an optional base URL override
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            model: model.to_owned(),
            base_url: base_url.unwrap_or(ANTHROPIC_BASE_URL).to_owned(),
        }
    }
}

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
    retry: RetryConfig,
}

impl AnthropicProvider {
    /// Create a new provider
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: AnthropicConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            retry: RetryConfig::default_config(),
        })
    }

    fn build_request<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> MessagesRequest<'a> {
        MessagesRequest {
            model: request.model.as_deref().unwrap_or(&self.config.model),
            max_tokens: request.options.max_tokens,
            system: request.system_prompt(),
            messages: convert_messages(&request.messages),
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            top_k: request.options.top_k,
            tools: request
                .tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.input_schema,
                })
                .collect(),
            stream,
        }
    }

    async fn post(&self, body: &MessagesRequest<'_>) -> AppResult<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let response = send_with_retry(&self.retry, PROVIDER, || {
            self.client
                .post(&url)
                .header("x-api-key", self.config.api_key.expose())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(body)
        })
        .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AnthropicErrorResponse>(&body)
            .map_or_else(|_| body_preview(&body), |parsed| parsed.error.message);
        error!(status = status.as_u16(), "Anthropic request failed: {message}");
        Err(provider_error(PROVIDER, status, &message))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn display_name(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::full_featured()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(provider = "anthropic", model = %request.model.as_deref().unwrap_or(&self.config.model)))]
    async fn generate(&self, request: &ChatRequest) -> AppResult<Completion> {
        let started = Instant::now();
        let body = self.build_request(request, false);
        let response = self.post(&body).await?;

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            AppError::external_service(PROVIDER, format!("Failed to parse response: {e}"))
        })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::ToolResult { .. } | ContentBlock::Unsupported => {}
            }
        }

        debug!(
            tool_calls = tool_calls.len(),
            stop_reason = ?parsed.stop_reason,
            "Received Anthropic completion"
        );

        Ok(Completion {
            text,
            tool_calls,
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
            elapsed: started.elapsed(),
            finish_reason: parsed.stop_reason,
            model: if parsed.model.is_empty() {
                body.model.to_owned()
            } else {
                parsed.model
            },
        })
    }

    #[instrument(skip(self, request), fields(provider = "anthropic", model = %request.model.as_deref().unwrap_or(&self.config.model)))]
    async fn stream(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        let body = self.build_request(request, true);
        let response = self.post(&body).await?;
        Ok(create_sse_stream(
            response.bytes_stream(),
            AnthropicChunkParser::default(),
            PROVIDER,
        ))
    }
}
