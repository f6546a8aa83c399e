// ABOUTME: MCP result payloads the gateway consumes from the tool server
// ABOUTME: Tools, prompts, tool-call results and the initialize handshake
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::service::{MCP_PROTOCOL_VERSION, SERVICE_NAME};

/// Method names sent by the client
pub mod methods {
    /// Handshake request
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness check
    pub const PING: &str = "ping";
    /// Tool listing
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation
    pub const TOOLS_CALL: &str = "tools/call";
    /// Prompt listing
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Prompt rendering
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// Parameters of the `initialize` request
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Result of `initialize`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Version the server agreed to speak
    pub protocol_version: String,
    /// Server identification
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// Server name and version
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,
    /// Server version
    #[serde(default)]
    pub version: String,
}

/// A tool advertised by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Tool name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the arguments
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Result of `tools/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Tools on this page
    pub tools: Vec<ToolInfo>,
    /// Cursor for the next page
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One content item in a tool result or prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
    /// Base64 image
    Image {
        /// Encoded bytes
        data: String,
        /// MIME type
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource
    Resource {
        /// Resource body
        resource: Value,
    },
    /// Content kinds this client does not render
    #[serde(other)]
    Unsupported,
}

impl Content {
    /// Text payload, if this is a text item
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Result of `tools/call`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content items
    #[serde(default)]
    pub content: Vec<Content>,
    /// Whether the tool reported a failure
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Join the text items; non-text items are summarized by kind
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                Content::Text { text } => text.clone(),
                Content::Image { mime_type, .. } => format!("[image: {mime_type}]"),
                Content::Resource { .. } => "[resource]".to_owned(),
                Content::Unsupported => "[unsupported content]".to_owned(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Argument accepted by a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the argument must be supplied
    #[serde(default)]
    pub required: bool,
}

/// A prompt advertised by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    /// Prompt name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Arguments
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// Result of `prompts/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    /// Prompts on this page
    pub prompts: Vec<PromptInfo>,
    /// Cursor for the next page
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One message of a rendered prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// `user` or `assistant`
    pub role: String,
    /// Message body
    pub content: Content,
}

/// Result of `prompts/get`
#[derive(Debug, Clone, Deserialize)]
pub struct GetPromptResult {
    /// Description of the rendered prompt
    #[serde(default)]
    pub description: Option<String>,
    /// Rendered messages in order
    #[serde(default)]
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_defaults() {
        let tool: ToolInfo = serde_json::from_value(json!({"name": "git_status"})).unwrap();
        assert_eq!(tool.description, None);
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_call_result_text_joins_items() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Sunny"},
                {"type": "audio", "data": "..."},
                {"type": "text", "text": "72F"}
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.text(), "Sunny\n[unsupported content]\n72F");
        assert!(!result.is_error);
    }

    #[test]
    fn test_prompt_message_roles() {
        let result: GetPromptResult = serde_json::from_value(json!({
            "messages": [
                {"role": "assistant", "content": {"type": "text", "text": "You help."}},
                {"role": "user", "content": {"type": "text", "text": "{{question}}"}}
            ]
        }))
        .unwrap();
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[1].content.as_text(), Some("{{question}}"));
    }
}
