// ABOUTME: Integration tests for the tool-use loop behind /ask
// ABOUTME: Covers tool round-trips, the iteration budget, tool failures and tool selection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use axum::http::StatusCode;
use serde_json::{json, Value};
use tool_gateway::constants::messages::TOOL_LOOP_TRUNCATED;
use tool_gateway::models::MessageRole;
use tool_gateway::storage::ConversationStore;
use uuid::Uuid;

use common::{ask_body, init_test_logging};
use helpers::axum_test::AxumTestRequest;
use helpers::gateway::GatewayBuilder;
use helpers::stubs::{text_completion, tool_completion, ScriptedProvider, StubCatalog};

fn tool_request(question: &str) -> Value {
    let mut body = ask_body(question);
    body["useTools"] = json!(true);
    body
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    init_test_logging();
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![
        Ok(tool_completion("call-1", "get_weather", json!({"city": "Lisbon"}), 10, 4)),
        Ok(text_completion("It is sunny and 72F.", 20, 6)),
    ]))
    .catalog(StubCatalog::new().with_tool("get_weather", "Sunny, 72F"))
    .build();

    let body: Value = AxumTestRequest::post("/ask")
        .json(&tool_request("weather in Lisbon?"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .json();

    assert_eq!(body["answer"], "It is sunny and 72F.");
    assert_eq!(body["input_token"], 30);
    assert_eq!(body["output_token"], 10);
    assert_eq!(
        gateway.catalog.calls(),
        vec![("get_weather".to_owned(), json!({"city": "Lisbon"}))]
    );

    let chat_id = Uuid::parse_str(body["chat_uuid"].as_str().unwrap()).unwrap();
    let messages = gateway.store.get(chat_id).await.unwrap().messages;
    let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant
        ]
    );
    assert_eq!(messages[1].tool_calls[0].name, "get_weather");
    assert_eq!(messages[2].tool_results[0].call_id, "call-1");
    assert_eq!(messages[2].tool_results[0].content, "Sunny, 72F");
    assert!(!messages[2].tool_results[0].is_error);
    assert_eq!(messages[3].text, "It is sunny and 72F.");

    let requests = gateway.provider.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "get_weather");
    assert_eq!(requests[0].messages[0].text, "You may call tools.");
    let fed_back = requests[1].messages.last().unwrap();
    assert_eq!(fed_back.role, MessageRole::Tool);
    assert_eq!(fed_back.tool_results[0].content, "Sunny, 72F");
}

#[tokio::test]
async fn test_budget_exhaustion_truncates_and_sums_tokens() {
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![
        Ok(tool_completion("call-1", "get_weather", json!({}), 5, 1)),
        Ok(tool_completion("call-2", "get_weather", json!({}), 7, 2)),
        Ok(text_completion("never reached", 100, 100)),
    ]))
    .catalog(StubCatalog::new().with_tool("get_weather", "Sunny"))
    .tool_budget(1)
    .build();

    let body: Value = AxumTestRequest::post("/ask")
        .json(&tool_request("loop forever"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .json();

    assert_eq!(gateway.provider.call_count(), 2);
    assert_eq!(gateway.catalog.calls().len(), 1);
    assert_eq!(body["input_token"], 12);
    assert_eq!(body["output_token"], 3);
    assert!(body["answer"].as_str().unwrap().contains(TOOL_LOOP_TRUNCATED));

    let chat_id = Uuid::parse_str(body["chat_uuid"].as_str().unwrap()).unwrap();
    let messages = gateway.store.get(chat_id).await.unwrap().messages;
    let last = messages.last().unwrap();
    assert_eq!(last.role, MessageRole::Assistant);
    assert!(last.text.contains(TOOL_LOOP_TRUNCATED));
    assert_eq!(last.usage.map(|u| u.input_tokens), Some(12));
}

#[tokio::test]
async fn test_tool_failure_is_reported_to_model() {
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![
        Ok(tool_completion("call-1", "no_such_tool", json!({}), 1, 1)),
        Ok(text_completion("That tool is unavailable.", 1, 1)),
    ]))
    .catalog(StubCatalog::new().with_tool("get_weather", "Sunny"))
    .build();

    let body: Value = AxumTestRequest::post("/ask")
        .json(&tool_request("use a missing tool"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .json();
    assert_eq!(body["answer"], "That tool is unavailable.");

    let requests = gateway.provider.requests();
    let result = &requests[1].messages.last().unwrap().tool_results[0];
    assert!(result.is_error);
    assert!(result.content.contains("no_such_tool"));
}

#[tokio::test]
async fn test_selected_tools_restrict_exposure() {
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![Ok(text_completion("ok", 1, 1))]))
        .catalog(
            StubCatalog::new()
                .with_tool("get_weather", "Sunny")
                .with_tool("run_shell", "ok"),
        )
        .build();

    let mut request = ask_body("only weather");
    request["selectedTools"] = json!(["get_weather"]);
    AxumTestRequest::post("/ask")
        .json(&request)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK);

    let tools: Vec<String> = gateway.provider.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(tools, vec!["get_weather".to_owned()]);
}

#[tokio::test]
async fn test_tool_calls_ignored_when_tools_disabled() {
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![Ok(tool_completion(
        "call-1",
        "get_weather",
        json!({}),
        2,
        2,
    ))]))
    .catalog(StubCatalog::new().with_tool("get_weather", "Sunny"))
    .build();

    AxumTestRequest::post("/ask")
        .json(&ask_body("no tools please"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(gateway.provider.call_count(), 1);
    assert!(gateway.catalog.calls().is_empty());
    assert!(gateway.provider.requests()[0].tools.is_empty());
}
