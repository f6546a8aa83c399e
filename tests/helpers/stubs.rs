// ABOUTME: Scripted stand-ins for the LLM provider, provider factory, tool catalog and MCP server
// ABOUTME: Record what the gateway asked of them so tests can assert on the exchange
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tool_gateway::auth::{Claims, TokenValidator};
use tool_gateway::errors::{AppError, AppResult};
use tool_gateway::llm::{
    ChatRequest, ChatStream, Completion, LlmCapabilities, LlmProvider, ProviderFactory,
    StreamChunk,
};
use tool_gateway::mcp::{
    CallToolResult, Content, GetPromptResult, McpClient, PromptArgument, PromptInfo,
    PromptMessage, ToolInfo,
};
use tool_gateway::models::{TokenUsage, ToolCall};
use tool_gateway::tools::{ToolCatalog, ToolDescriptor, ToolOutput};

/// Completion carrying only text
pub fn text_completion(text: &str, input: u32, output: u32) -> Completion {
    Completion {
        text: text.to_owned(),
        tool_calls: Vec::new(),
        usage: TokenUsage::new(input, output),
        elapsed: Duration::from_millis(5),
        finish_reason: Some("stop".to_owned()),
        model: "stub-model".to_owned(),
    }
}

/// Completion asking for one tool call
pub fn tool_completion(call_id: &str, tool: &str, arguments: Value, input: u32, output: u32) -> Completion {
    Completion {
        text: String::new(),
        tool_calls: vec![ToolCall {
            id: call_id.to_owned(),
            name: tool.to_owned(),
            arguments,
        }],
        usage: TokenUsage::new(input, output),
        elapsed: Duration::from_millis(5),
        finish_reason: Some("tool_use".to_owned()),
        model: "stub-model".to_owned(),
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Provider answering from a script, one entry per call
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<AppResult<Completion>>>,
    requests: Mutex<Vec<ChatRequest>>,
    hang_after_text: bool,
}

impl ScriptedProvider {
    pub fn new(script: Vec<AppResult<Completion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Streams emit their text and then never finish
    pub fn hanging(script: Vec<AppResult<Completion>>) -> Self {
        Self {
            hang_after_text: true,
            ..Self::new(script)
        }
    }

    pub fn push(&self, completion: AppResult<Completion>) {
        self.script.lock().unwrap().push_back(completion);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: &ChatRequest) -> AppResult<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::internal("provider script exhausted")))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn display_name(&self) -> &'static str {
        "Stub"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::full_featured()
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    async fn generate(&self, request: &ChatRequest) -> AppResult<Completion> {
        self.next(request)
    }

    async fn stream(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        let completion = self.next(request)?;

        let mut chunks: Vec<AppResult<StreamChunk>> = Vec::new();
        let mid = completion.text.len() / 2;
        let (head, tail) = completion.text.split_at(mid);
        for part in [head, tail] {
            if !part.is_empty() {
                chunks.push(Ok(StreamChunk::Delta(part.to_owned())));
            }
        }
        if self.hang_after_text {
            return Ok(Box::pin(stream::iter(chunks).chain(stream::pending())));
        }
        chunks.extend(completion.tool_calls.into_iter().map(|call| Ok(StreamChunk::ToolCall(call))));
        chunks.push(Ok(StreamChunk::Done {
            usage: completion.usage,
            finish_reason: completion.finish_reason,
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Factory handing out one provider and recording what was asked for
pub struct StubFactory {
    provider: Arc<ScriptedProvider>,
    built: Mutex<Vec<(String, String)>>,
}

impl StubFactory {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self {
            provider,
            built: Mutex::new(Vec::new()),
        }
    }

    pub fn built(&self) -> Vec<(String, String)> {
        self.built.lock().unwrap().clone()
    }
}

impl ProviderFactory for StubFactory {
    fn build(&self, provider: &str, model: &str) -> AppResult<Arc<dyn LlmProvider>> {
        self.built
            .lock()
            .unwrap()
            .push((provider.to_owned(), model.to_owned()));
        let provider: Arc<dyn LlmProvider> = self.provider.clone();
        Ok(provider)
    }
}

// ============================================================================
// Tool catalog
// ============================================================================

/// Catalog with fixed tools and canned outputs
#[derive(Default)]
pub struct StubCatalog {
    tools: Vec<ToolDescriptor>,
    outputs: HashMap<String, ToolOutput>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool answering every call with `output`
    pub fn with_tool(mut self, name: &str, output: &str) -> Self {
        self.tools.push(ToolDescriptor {
            name: name.to_owned(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object", "properties": {}}),
        });
        self.outputs.insert(
            name.to_owned(),
            ToolOutput {
                content: output.to_owned(),
                is_error: false,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolCatalog for StubCatalog {
    async fn list(&self) -> AppResult<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> AppResult<ToolOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), arguments));
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::unknown_tool(name))
    }
}

// ============================================================================
// MCP prompt server
// ============================================================================

/// MCP server exposing the two gateway templates
#[derive(Default)]
pub struct StubMcp {
    prompt_fetches: Mutex<usize>,
}

impl StubMcp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt_fetches(&self) -> usize {
        *self.prompt_fetches.lock().unwrap()
    }
}

fn template(name: &str) -> PromptInfo {
    PromptInfo {
        name: name.to_owned(),
        description: Some(format!("{name} template")),
        arguments: vec![PromptArgument {
            name: "question".to_owned(),
            description: None,
            required: true,
        }],
    }
}

#[async_trait]
impl McpClient for StubMcp {
    async fn list_tools(&self) -> AppResult<Vec<ToolInfo>> {
        Ok(Vec::new())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> AppResult<CallToolResult> {
        Err(AppError::unknown_tool(name))
    }

    async fn list_prompts(&self) -> AppResult<Vec<PromptInfo>> {
        Ok(vec![template("llm_general"), template("llm_with_tools")])
    }

    async fn get_prompt(
        &self,
        name: &str,
        _arguments: &HashMap<String, String>,
    ) -> AppResult<GetPromptResult> {
        *self.prompt_fetches.lock().unwrap() += 1;
        let system = if name == "llm_with_tools" {
            "You may call tools."
        } else {
            "You are a helpful assistant."
        };
        Ok(GetPromptResult {
            description: None,
            messages: vec![
                PromptMessage {
                    role: "system".to_owned(),
                    content: Content::Text {
                        text: system.to_owned(),
                    },
                },
                PromptMessage {
                    role: "user".to_owned(),
                    content: Content::Text {
                        text: "{{question}}".to_owned(),
                    },
                },
            ],
        })
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

// ============================================================================
// Bearer validation
// ============================================================================

/// Bearer accepted by [`StaticValidator`]
pub const VALID_TOKEN: &str = "valid-token";

/// Validator accepting exactly [`VALID_TOKEN`]
pub struct StaticValidator;

#[async_trait]
impl TokenValidator for StaticValidator {
    async fn validate(&self, token: &str) -> AppResult<Claims> {
        if token != VALID_TOKEN {
            return Err(AppError::auth_invalid("Invalid token"));
        }
        Ok(Claims {
            sub: "user-1".to_owned(),
            iss: "https://issuer.test/".to_owned(),
            aud: json!("tool-gateway"),
            exp: i64::MAX,
            iat: None,
            scope: None,
        })
    }
}
