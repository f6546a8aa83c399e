// ABOUTME: Amazon Bedrock provider using the Converse API with API-key bearer auth
// ABOUTME: Streams by replaying a single completion since Converse is request/response
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Amazon Bedrock Provider
//!
//! Calls `POST /model/{modelId}/converse` on the regional runtime endpoint,
//! authenticated with a Bedrock API key (`AMAZON_BEDROCK_API_KEY`). The region
//! comes from `AWS_REGION` / `AWS_DEFAULT_REGION`.

use std::time::{Duration, Instant};

use async_stream::stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};
use url::form_urlencoded::byte_serialize;

use super::sse_parser::{body_preview, provider_error, send_with_retry, RetryConfig};
use super::{ChatRequest, ChatStream, Completion, LlmCapabilities, LlmProvider, StreamChunk};
use crate::config::SecretString;
use crate::constants::timeouts::CONNECT_TIMEOUT_SECS;
use crate::errors::{AppError, AppResult};
use crate::models::{Message, MessageRole, TokenUsage, ToolCall};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

const PROVIDER: &str = "Amazon Bedrock";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    messages: Vec<BedrockMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemBlock>,
    inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ToolConfig {
    tools: Vec<BedrockTool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BedrockTool {
    tool_spec: BedrockToolSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BedrockToolSpec {
    name: String,
    description: String,
    input_schema: InputSchema,
}

#[derive(Debug, Serialize)]
struct InputSchema {
    json: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BedrockMessage {
    role: String,
    content: Vec<BedrockContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum BedrockContent {
    Text(String),
    ToolUse(BedrockToolUse),
    ToolResult(BedrockToolResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BedrockToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BedrockToolResult {
    tool_use_id: String,
    content: Vec<ToolResultContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolResultContent {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: BedrockUsage,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BedrockUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct BedrockErrorResponse {
    #[serde(alias = "Message")]
    message: String,
}

// ============================================================================
// Message Conversion
// ============================================================================

fn convert_messages(messages: &[Message]) -> Vec<BedrockMessage> {
    messages
        .iter()
        .filter_map(|message| {
            let (role, content) = match message.role {
                MessageRole::System => return None,
                MessageRole::User => ("user", vec![BedrockContent::Text(message.text.clone())]),
                MessageRole::Assistant => {
                    let mut content = Vec::new();
                    if !message.text.is_empty() {
                        content.push(BedrockContent::Text(message.text.clone()));
                    }
                    content.extend(message.tool_calls.iter().map(|call| {
                        BedrockContent::ToolUse(BedrockToolUse {
                            tool_use_id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        })
                    }));
                    ("assistant", content)
                }
                MessageRole::Tool => (
                    "user",
                    message
                        .tool_results
                        .iter()
                        .map(|result| {
                            BedrockContent::ToolResult(BedrockToolResult {
                                tool_use_id: result.call_id.clone(),
                                content: vec![ToolResultContent {
                                    text: result.content.clone(),
                                }],
                                status: result.is_error.then(|| "error".to_owned()),
                            })
                        })
                        .collect(),
                ),
            };
            (!content.is_empty()).then(|| BedrockMessage {
                role: role.to_owned(),
                content,
            })
        })
        .collect()
}

/// Read text and tool-use blocks out of the response content
///
/// Blocks this provider does not understand (reasoning, images) are skipped.
fn collect_output(content: Vec<Value>) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in content {
        match serde_json::from_value::<BedrockContent>(block) {
            Ok(BedrockContent::Text(part)) => text.push_str(&part),
            Ok(BedrockContent::ToolUse(tool_use)) => tool_calls.push(ToolCall {
                id: tool_use.tool_use_id,
                name: tool_use.name,
                arguments: tool_use.input,
            }),
            Ok(BedrockContent::ToolResult(_)) | Err(_) => {}
        }
    }
    (text, tool_calls)
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Configuration for the Bedrock provider
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// Bedrock API key sent as a bearer token
    pub api_key: SecretString,
    /// Model id, e.g. `anthropic.claude-3-5-sonnet-20240620-v1:0`
    pub model: String,
    /// AWS region of the runtime endpoint
    pub region: String,
    /// Named AWS profile, recorded for diagnostics
    pub profile: Option<String>,
    /// Endpoint override; defaults to the regional runtime host
    pub base_url: Option<String>,
}

impl BedrockConfig {
    /// Runtime endpoint for the configured region
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
        })
    }
}

/// Amazon Bedrock Converse provider
pub struct BedrockProvider {
    client: Client,
    config: BedrockConfig,
    retry: RetryConfig,
}

impl BedrockProvider {
    /// Create a new provider
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: BedrockConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        debug!(
            region = %config.region,
            profile = ?config.profile,
            "Initialized Bedrock provider"
        );

        Ok(Self {
            client,
            config,
            retry: RetryConfig::default_config(),
        })
    }

    fn build_request(request: &ChatRequest) -> ConverseRequest {
        let tools: Vec<BedrockTool> = request
            .tools
            .iter()
            .map(|tool| BedrockTool {
                tool_spec: BedrockToolSpec {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: InputSchema {
                        json: tool.input_schema.clone(),
                    },
                },
            })
            .collect();

        ConverseRequest {
            messages: convert_messages(&request.messages),
            system: request
                .system_prompt()
                .map(|text| vec![SystemBlock { text }])
                .unwrap_or_default(),
            inference_config: InferenceConfig {
                max_tokens: request.options.max_tokens,
                temperature: request.options.temperature,
                top_p: request.options.top_p,
            },
            tool_config: (!tools.is_empty()).then_some(ToolConfig { tools }),
        }
    }

    fn converse_url(&self, model: &str) -> String {
        format!(
            "{}/model/{}/converse",
            self.config.endpoint().trim_end_matches('/'),
            byte_serialize(model.as_bytes()).collect::<String>()
        )
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    fn display_name(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::FUNCTION_CALLING | LlmCapabilities::SYSTEM_MESSAGES
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(provider = "bedrock", model = %request.model.as_deref().unwrap_or(&self.config.model)))]
    async fn generate(&self, request: &ChatRequest) -> AppResult<Completion> {
        let started = Instant::now();
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let body = Self::build_request(request);
        let url = self.converse_url(model);

        let response = send_with_retry(&self.retry, PROVIDER, || {
            self.client
                .post(&url)
                .bearer_auth(self.config.api_key.expose())
                .json(&body)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BedrockErrorResponse>(&text)
                .map_or_else(|_| body_preview(&text), |parsed| parsed.message);
            error!(status = status.as_u16(), "Bedrock request failed: {message}");
            return Err(provider_error(PROVIDER, status, &message));
        }

        let parsed: ConverseResponse = response.json().await.map_err(|e| {
            AppError::external_service(PROVIDER, format!("Failed to parse response: {e}"))
        })?;

        let (text, tool_calls) =
            collect_output(parsed.output.message.map(|m| m.content).unwrap_or_default());

        Ok(Completion {
            text,
            tool_calls,
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
            elapsed: started.elapsed(),
            finish_reason: parsed.stop_reason,
            model: model.to_owned(),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        let completion = self.generate(request).await?;
        Ok(Box::pin(stream! {
            if !completion.text.is_empty() {
                yield Ok(StreamChunk::Delta(completion.text));
            }
            for call in completion.tool_calls {
                yield Ok(StreamChunk::ToolCall(call));
            }
            yield Ok(StreamChunk::Done {
                usage: completion.usage,
                finish_reason: completion.finish_reason,
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::ToolSpec;
    use crate::models::ToolResult;

    fn config() -> BedrockConfig {
        BedrockConfig {
            api_key: SecretString::new("k"),
            model: "anthropic.claude-3-haiku-20240307-v1:0".to_owned(),
            region: "eu-west-1".to_owned(),
            profile: None,
            base_url: None,
        }
    }

    #[test]
    fn test_converse_url_escapes_model_id() {
        let provider = BedrockProvider::new(config()).unwrap();
        assert_eq!(
            provider.converse_url("anthropic.claude-3-haiku-20240307-v1:0"),
            "https://bedrock-runtime.eu-west-1.amazonaws.com/model/anthropic.claude-3-haiku-20240307-v1%3A0/converse"
        );
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest::new(vec![
            Message::system("sys"),
            Message::user("q"),
            Message::assistant("").with_tool_calls(vec![ToolCall {
                id: "t1".to_owned(),
                name: "echo".to_owned(),
                arguments: json!({"v": 1}),
            }]),
            Message::tool_results(vec![ToolResult {
                call_id: "t1".to_owned(),
                content: "boom".to_owned(),
                is_error: true,
            }]),
        ])
        .with_tools(vec![ToolSpec {
            name: "echo".to_owned(),
            description: "Echo".to_owned(),
            input_schema: json!({"type": "object"}),
        }]);

        let encoded = serde_json::to_value(BedrockProvider::build_request(&request)).unwrap();
        assert_eq!(encoded["system"][0]["text"], "sys");
        assert_eq!(encoded["inferenceConfig"]["maxTokens"], 1000);
        assert_eq!(encoded["messages"][1]["content"][0]["toolUse"]["toolUseId"], "t1");
        assert_eq!(encoded["messages"][2]["content"][0]["toolResult"]["status"], "error");
        assert_eq!(encoded["toolConfig"]["tools"][0]["toolSpec"]["inputSchema"]["json"]["type"], "object");
    }

    #[test]
    fn test_collect_output_skips_unknown_blocks() {
        let (text, calls) = collect_output(vec![
            json!({"text": "Hello "}),
            json!({"reasoningContent": {"reasoningText": {"text": "hmm"}}}),
            json!({"text": "world"}),
            json!({"toolUse": {"toolUseId": "x", "name": "n", "input": {}}}),
        ]);
        assert_eq!(text, "Hello world");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "x");
    }
}
