// ABOUTME: OpenAI chat-completions provider shared by OpenAI and DeepSeek
// ABOUTME: Maps conversation messages, tools and streamed tool-call deltas to the gateway contract
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # `OpenAI`-Compatible Provider
//!
//! One implementation for every endpoint speaking the `OpenAI` chat completions
//! API. The gateway uses it for `OpenAI` itself and for `DeepSeek`.
//!
//! ## Supported Backends
//!
//! - **`OpenAI`**: <https://api.openai.com/v1>
//! - **`DeepSeek`**: <https://api.deepseek.com>
//!
//! ## Example
//!
//! ```rust,no_run
//! use tool_gateway::llm::{ChatRequest, LlmProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider};
//! use tool_gateway::models::Message;
//! use tool_gateway::errors::AppError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AppError> {
//!     let config = OpenAiCompatibleConfig::openai("sk-...", "gpt-4o-mini", None);
//!     let provider = OpenAiCompatibleProvider::new(config)?;
//!     let completion = provider
//!         .generate(&ChatRequest::new(vec![Message::user("What is MCP?")]))
//!         .await?;
//!     println!("{}", completion.text);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::mem;
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
use super::{
    ChatRequest, ChatStream, Completion, LlmCapabilities, LlmProvider, StreamChunk, ToolSpec,
};
use crate::config::SecretString;
use crate::constants::timeouts::CONNECT_TIMEOUT_SECS;
use crate::errors::{AppError, AppResult};
use crate::models::{Message, MessageRole, TokenUsage, ToolCall};

// ============================================================================
// Configuration Constants
// ============================================================================

/// `OpenAI` API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// `DeepSeek` API base URL
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSpec> for OpenAiTool<'a> {
    fn from(tool: &'a ToolSpec) -> Self {
        Self {
            tool_type: "function",
            function: OpenAiFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for an `OpenAI`-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Base URL for the API, without the `chat/completions` suffix
    pub base_url: String,
    /// Bearer API key
    pub api_key: SecretString,
    /// Model to use
    pub model: String,
    /// Provider tag for logging and metrics
    pub provider_name: &'static str,
    /// Provider display name
    pub display_name: &'static str,
    /// Capabilities of this provider
    pub capabilities: LlmCapabilities,
}

impl OpenAiCompatibleConfig {
    /// Configuration for `OpenAI`
    #[must_use]
    pub fn openai(api_key: impl Into<String>, model: &str, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url.unwrap_or(OPENAI_BASE_URL).to_owned(),
            api_key: SecretString::new(api_key),
            model: model.to_owned(),
            provider_name: "openai",
            display_name: "OpenAI",
            capabilities: LlmCapabilities::full_featured(),
        }
    }

    /// Configuration for `DeepSeek`
    #[must_use]
    pub fn deepseek(api_key: impl Into<String>, model: &str, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEEPSEEK_BASE_URL).to_owned(),
            api_key: SecretString::new(api_key),
            model: model.to_owned(),
            provider_name: "deepseek",
            display_name: "DeepSeek",
            capabilities: LlmCapabilities::full_featured(),
        }
    }
}

// ============================================================================
// Message Conversion
// ============================================================================

/// Convert conversation messages to the chat completions shape
///
/// A tool message carrying several results becomes one `tool` message per
/// result, as the API requires.
fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
    let mut converted = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            MessageRole::System | MessageRole::User => converted.push(OpenAiMessage {
                role: message.role.as_str(),
                content: Some(message.text.clone()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }),
            MessageRole::Assistant => converted.push(OpenAiMessage {
                role: "assistant",
                content: (!message.text.is_empty() || message.tool_calls.is_empty())
                    .then(|| message.text.clone()),
                tool_calls: message
                    .tool_calls
                    .iter()
                    .map(|call| OpenAiToolCall {
                        id: call.id.clone(),
                        call_type: function_type(),
                        function: OpenAiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            }),
            MessageRole::Tool => {
                converted.extend(message.tool_results.iter().map(|result| OpenAiMessage {
                    role: "tool",
                    content: Some(result.content.clone()),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(result.call_id.clone()),
                }));
            }
        }
    }
    converted
}

/// Parse a JSON-encoded arguments string, falling back to an empty object
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Tool call arguments are not valid JSON ({e}), passing them as a string");
        Value::String(raw.to_owned())
    })
}

fn convert_tool_call(call: OpenAiToolCall) -> ToolCall {
    ToolCall {
        arguments: parse_arguments(&call.function.arguments),
        id: call.id,
        name: call.function.name,
    }
}

// ============================================================================
// Streaming
// ============================================================================

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates streamed tool-call fragments by index
#[derive(Debug)]
struct OpenAiChunkParser {
    provider_name: &'static str,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: TokenUsage,
    finish_reason: Option<String>,
}

impl OpenAiChunkParser {
    fn new(provider_name: &'static str) -> Self {
        Self {
            provider_name,
            tool_calls: BTreeMap::new(),
            usage: TokenUsage::default(),
            finish_reason: None,
        }
    }

    fn drain_tool_calls(&mut self) -> Vec<AppResult<StreamChunk>> {
        mem::take(&mut self.tool_calls)
            .into_values()
            .map(|partial| {
                Ok(StreamChunk::ToolCall(ToolCall {
                    arguments: parse_arguments(&partial.arguments),
                    id: partial.id,
                    name: partial.name,
                }))
            })
            .collect()
    }
}

impl SseChunkParser for OpenAiChunkParser {
    fn parse(&mut self, data: &str) -> Vec<AppResult<StreamChunk>> {
        let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(provider = self.provider_name, "Failed to parse stream chunk: {e}");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        if let Some(usage) = chunk.usage {
            self.usage = usage.into();
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                out.push(Ok(StreamChunk::Delta(content)));
            }
            for fragment in choice.delta.tool_calls {
                let entry = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    entry.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
                out.extend(self.drain_tool_calls());
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<AppResult<StreamChunk>> {
        let mut out = self.drain_tool_calls();
        out.push(Ok(StreamChunk::Done {
            usage: self.usage,
            finish_reason: self.finish_reason.take(),
        }));
        out
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// `OpenAI`-compatible LLM provider
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
    retry: RetryConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: OpenAiCompatibleConfig) -> AppResult<Self> {
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

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: request.model.as_deref().unwrap_or(&self.config.model),
            messages: convert_messages(&request.messages),
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            tools: request.tools.iter().map(OpenAiTool::from).collect(),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn post(&self, body: &OpenAiRequest<'_>) -> AppResult<reqwest::Response> {
        let url = self.api_url("chat/completions");
        let response = send_with_retry(&self.retry, self.config.display_name, || {
            self.client
                .post(&url)
                .bearer_auth(self.config.api_key.expose())
                .json(body)
        })
        .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
            .map_or_else(|_| body_preview(&body), |parsed| parsed.error.message);
        error!(
            provider = self.config.provider_name,
            status = status.as_u16(),
            "Chat completion request failed: {message}"
        );
        Err(provider_error(self.config.display_name, status, &message))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.config.provider_name
    }

    fn display_name(&self) -> &'static str {
        self.config.display_name
    }

    fn capabilities(&self) -> LlmCapabilities {
        self.config.capabilities
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(provider = self.config.provider_name, model = %request.model.as_deref().unwrap_or(&self.config.model)))]
    async fn generate(&self, request: &ChatRequest) -> AppResult<Completion> {
        let started = Instant::now();
        let body = self.build_request(request, false);
        debug!(
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat completion request"
        );

        let response = self.post(&body).await?;
        let parsed: OpenAiResponse = response.json().await.map_err(|e| {
            AppError::external_service(
                self.config.display_name,
                format!("Failed to parse response: {e}"),
            )
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            AppError::external_service(self.config.display_name, "API returned no choices")
        })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(convert_tool_call)
            .collect();

        debug!(
            tool_calls = tool_calls.len(),
            finish_reason = ?choice.finish_reason,
            "Received chat completion"
        );

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: parsed.usage.map(TokenUsage::from).unwrap_or_default(),
            elapsed: started.elapsed(),
            finish_reason: choice.finish_reason,
            model: if parsed.model.is_empty() {
                body.model.to_owned()
            } else {
                parsed.model
            },
        })
    }

    #[instrument(skip(self, request), fields(provider = self.config.provider_name, model = %request.model.as_deref().unwrap_or(&self.config.model)))]
    async fn stream(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        let body = self.build_request(request, true);
        debug!(messages = body.messages.len(), "Sending streaming chat completion request");

        let response = self.post(&body).await?;
        Ok(create_sse_stream(
            response.bytes_stream(),
            OpenAiChunkParser::new(self.config.provider_name),
            self.config.display_name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::ToolResult;

    #[test]
    fn test_tool_round_trip_messages() {
        let call = ToolCall {
            id: "call_1".to_owned(),
            name: "get_weather".to_owned(),
            arguments: json!({"city": "Paris"}),
        };
        let messages = vec![
            Message::user("weather?"),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::tool_results(vec![ToolResult {
                call_id: "call_1".to_owned(),
                content: "Sunny".to_owned(),
                is_error: false,
            }]),
        ];

        let encoded = serde_json::to_value(convert_messages(&messages)).unwrap();
        assert_eq!(encoded[1]["role"], "assistant");
        assert!(encoded[1].get("content").is_none());
        assert_eq!(encoded[1]["tool_calls"][0]["function"]["arguments"], "{\"city\":\"Paris\"}");
        assert_eq!(encoded[2]["role"], "tool");
        assert_eq!(encoded[2]["tool_call_id"], "call_1");
        assert_eq!(encoded[2]["content"], "Sunny");
    }

    #[test]
    fn test_stream_parser_assembles_tool_calls() {
        let mut parser = OpenAiChunkParser::new("openai");
        let mut chunks = Vec::new();
        for data in [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"get_weather","arguments":"{\"ci"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ty\":\"Oslo\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":5,"total_tokens":17}}"#,
        ] {
            chunks.extend(parser.parse(data));
        }
        chunks.extend(parser.finish());

        let chunks: Vec<StreamChunk> = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 2);
        match &chunks[0] {
            StreamChunk::ToolCall(call) => {
                assert_eq!(call.id, "c1");
                assert_eq!(call.name, "get_weather");
                assert_eq!(call.arguments, json!({"city": "Oslo"}));
            }
            other => panic!("unexpected chunk {other:?}"),
        }
        assert_eq!(
            chunks[1],
            StreamChunk::Done {
                usage: TokenUsage::new(12, 5),
                finish_reason: Some("tool_calls".to_owned()),
            }
        );
    }

    #[test]
    fn test_request_carries_options_and_tools() {
        let provider =
            OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::deepseek("k", "deepseek-chat", None))
                .unwrap();
        let mut request = ChatRequest::new(vec![Message::user("hi")]).with_tools(vec![ToolSpec {
            name: "echo".to_owned(),
            description: "Echo input".to_owned(),
            input_schema: json!({"type": "object"}),
        }]);
        request.options.top_p = Some(0.9);

        let encoded = serde_json::to_value(provider.build_request(&request, true)).unwrap();
        assert_eq!(encoded["model"], "deepseek-chat");
        assert_eq!(encoded["max_tokens"], 1000);
        assert_eq!(encoded["tools"][0]["type"], "function");
        assert_eq!(encoded["stream_options"]["include_usage"], true);
        assert!((encoded["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(provider.api_url("chat/completions"), "https://api.deepseek.com/chat/completions");
    }
}
