// ABOUTME: Selects the slice of stored conversation history sent to the provider
// ABOUTME: Keeps system messages, windows the rest and repairs tool-call structure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::models::{Message, MessageRole};

/// History to prepend to a new turn
///
/// Every system message is kept, in order, ahead of the `max` most recent
/// non-system messages. Tool results whose originating call fell outside the
/// window are dropped. When the turn exposes no tools, tool structure is
/// stripped: tool results are removed and assistant messages keep only text.
#[must_use]
pub fn window(messages: &[Message], max: usize, tools_enabled: bool) -> Vec<Message> {
    let (system, rest): (Vec<&Message>, Vec<&Message>) = messages
        .iter()
        .partition(|message| message.role == MessageRole::System);

    let recent = &rest[rest.len().saturating_sub(max)..];
    let start = recent
        .iter()
        .position(|message| message.role != MessageRole::Tool)
        .unwrap_or(recent.len());

    let mut window: Vec<Message> = system.into_iter().cloned().collect();
    window.extend(
        recent[start..]
            .iter()
            .filter_map(|message| flatten(message, tools_enabled)),
    );
    window
}

fn flatten(message: &Message, tools_enabled: bool) -> Option<Message> {
    if tools_enabled {
        return Some(message.clone());
    }
    match message.role {
        MessageRole::Tool => None,
        MessageRole::Assistant if !message.tool_calls.is_empty() => {
            (!message.text.is_empty()).then(|| {
                let mut text_only = message.clone();
                text_only.tool_calls.clear();
                text_only
            })
        }
        _ => Some(message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{ToolCall, ToolResult};

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_keeps_system_and_last_messages() {
        let mut history = vec![Message::system("rules")];
        for i in 0..30 {
            history.push(Message::user(format!("q{i}")));
        }
        let window = window(&history, 20, true);
        assert_eq!(window.len(), 21);
        assert_eq!(window[0].text, "rules");
        assert_eq!(window[1].text, "q10");
        assert_eq!(window[20].text, "q29");
    }

    #[test]
    fn test_short_history_is_untouched() {
        let history = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!(texts(&window(&history, 20, true)), ["a", "b"]);
    }

    #[test]
    fn test_orphaned_tool_results_are_dropped() {
        let call = ToolCall {
            id: "c1".to_owned(),
            name: "get_weather".to_owned(),
            arguments: json!({}),
        };
        let history = vec![
            Message::assistant("").with_tool_calls(vec![call]),
            Message::tool_results(vec![ToolResult {
                call_id: "c1".to_owned(),
                content: "Sunny".to_owned(),
                is_error: false,
            }]),
            Message::assistant("It is sunny"),
        ];
        let window = window(&history, 2, true);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].text, "It is sunny");
    }

    #[test]
    fn test_tool_structure_stripped_without_tools() {
        let call = ToolCall {
            id: "c1".to_owned(),
            name: "get_weather".to_owned(),
            arguments: json!({}),
        };
        let history = vec![
            Message::user("weather?"),
            Message::assistant("checking").with_tool_calls(vec![call.clone()]),
            Message::tool_results(vec![ToolResult {
                call_id: "c1".to_owned(),
                content: "Sunny".to_owned(),
                is_error: false,
            }]),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::assistant("Sunny"),
        ];
        let window = window(&history, 20, false);
        assert_eq!(texts(&window), ["weather?", "checking", "Sunny"]);
        assert!(window.iter().all(|m| m.tool_calls.is_empty()));
    }
}
