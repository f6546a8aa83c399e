// ABOUTME: Fetches named prompt templates from the MCP server and renders them
// ABOUTME: Checks required arguments up front and substitutes {{argument}} placeholders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Prompt Templates
//!
//! Templates live on the tool server. [`PromptTemplateClient::render`] asks the
//! server for the named prompt, then substitutes `{{argument}}` placeholders in
//! each returned message locally, so templates that come back unrendered still
//! produce the final text. Placeholders with no matching argument are left as
//! they are.
//!
//! Argument descriptors are fetched once through `prompts/list` and cached, so
//! a missing required argument is rejected without a `prompts/get` round-trip.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::mcp::{McpClient, PromptInfo};
use crate::models::{Message, MessageRole};

/// Replace `{{name}}` (inner whitespace allowed) with the matching argument
///
/// Unknown names and unterminated braces are copied through unchanged.
#[must_use]
pub fn substitute(text: &str, arguments: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after_open[..end].trim();
        match arguments.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Renders MCP prompt templates into conversation messages
pub struct PromptTemplateClient {
    mcp: Arc<dyn McpClient>,
    descriptors: RwLock<Option<HashMap<String, PromptInfo>>>,
}

impl PromptTemplateClient {
    /// Create a client over the given MCP connection
    #[must_use]
    pub fn new(mcp: Arc<dyn McpClient>) -> Self {
        Self {
            mcp,
            descriptors: RwLock::new(None),
        }
    }

    /// Descriptor of `name`, fetching the prompt list on first use
    ///
    /// # Errors
    ///
    /// `TemplateError` if the list cannot be fetched.
    pub async fn describe(&self, name: &str) -> AppResult<Option<PromptInfo>> {
        if let Some(cached) = self.descriptors.read().await.as_ref() {
            if let Some(info) = cached.get(name) {
                return Ok(Some(info.clone()));
            }
        }

        let prompts = self
            .mcp
            .list_prompts()
            .await
            .map_err(|e| wrap("failed to list prompt templates", &e))?;
        let by_name: HashMap<String, PromptInfo> =
            prompts.into_iter().map(|p| (p.name.clone(), p)).collect();
        let info = by_name.get(name).cloned();
        *self.descriptors.write().await = Some(by_name);
        Ok(info)
    }

    /// Render `name` with `arguments` into role-tagged messages
    ///
    /// # Errors
    ///
    /// `TemplateError` when the template is unknown, a required argument is
    /// missing, a message carries an unknown role, or the MCP call fails.
    #[instrument(skip(self, arguments), fields(template = %name))]
    pub async fn render(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> AppResult<Vec<Message>> {
        let info = self
            .describe(name)
            .await?
            .ok_or_else(|| AppError::template(format!("unknown prompt template: {name}")))?;

        if let Some(missing) = info
            .arguments
            .iter()
            .find(|arg| arg.required && arguments.get(&arg.name).is_none_or(|v| v.is_empty()))
        {
            return Err(AppError::template(format!(
                "missing required argument '{}' for template {name}",
                missing.name
            )));
        }

        let rendered = self
            .mcp
            .get_prompt(name, arguments)
            .await
            .map_err(|e| wrap(&format!("failed to fetch prompt template {name}"), &e))?;

        let mut messages = Vec::with_capacity(rendered.messages.len());
        for message in rendered.messages {
            let role = MessageRole::parse(&message.role).ok_or_else(|| {
                AppError::template(format!(
                    "template {name} uses unsupported role '{}'",
                    message.role
                ))
            })?;
            let Some(text) = message.content.as_text() else {
                warn!(template = name, "Skipping non-text template message");
                continue;
            };
            messages.push(Message::new(role, substitute(text, arguments)));
        }

        debug!(template = name, messages = messages.len(), "Rendered prompt template");
        Ok(messages)
    }
}

fn wrap(context: &str, error: &AppError) -> AppError {
    if error.code == ErrorCode::TemplateError {
        return AppError::template(error.message.clone());
    }
    AppError::template(format!("{context}: {}", error.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_substitute_known_placeholders() {
        let out = substitute("Question: {{question}}", &args(&[("question", "why?")]));
        assert_eq!(out, "Question: why?");
    }

    #[test]
    fn test_substitute_allows_inner_whitespace() {
        let out = substitute("{{ question }}!", &args(&[("question", "hi")]));
        assert_eq!(out, "hi!");
    }

    #[test]
    fn test_substitute_leaves_unknown_and_unterminated() {
        let a = args(&[("question", "q")]);
        assert_eq!(substitute("{{lang}} {{question}}", &a), "{{lang}} q");
        assert_eq!(substitute("tail {{question", &a), "tail {{question");
    }

    #[test]
    fn test_substitute_does_not_rescan_values() {
        let out = substitute("{{a}}", &args(&[("a", "{{b}}"), ("b", "x")]));
        assert_eq!(out, "{{b}}");
    }
}
