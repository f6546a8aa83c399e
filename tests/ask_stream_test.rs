// ABOUTME: Integration tests for the streaming /ask-stream route and orchestrator stream
// ABOUTME: Covers delta and done events, error events, early validation errors and cancellation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::time::Duration;

use axum::http::StatusCode;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tool_gateway::constants::messages::TOOL_LOOP_TRUNCATED;
use tool_gateway::errors::AppError;
use tool_gateway::models::MessageRole;
use tool_gateway::orchestrator::{AskRequest, TurnEvent};
use tool_gateway::storage::ConversationStore;
use uuid::Uuid;

use common::{ask_body, init_test_logging};
use helpers::axum_test::AxumTestRequest;
use helpers::gateway::{create_test_gateway, GatewayBuilder};
use helpers::stubs::{text_completion, tool_completion, ScriptedProvider, StubCatalog};

/// `(event, data)` pairs of an SSE body, comments skipped
fn parse_events(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event: ") {
                    name = Some(value.to_owned());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data = Some(serde_json::from_str(value).unwrap());
                }
            }
            Some((name?, data?))
        })
        .collect()
}

#[tokio::test]
async fn test_stream_emits_deltas_then_done() {
    init_test_logging();
    let gateway = create_test_gateway(ScriptedProvider::new(vec![Ok(text_completion(
        "Hello there", 3, 2,
    ))]));

    let response = AxumTestRequest::post("/ask-stream")
        .json(&ask_body("hello"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("text/event-stream"));
    assert_eq!(response.header("cache-control"), Some("no-cache"));

    let events = parse_events(&response.text());
    let (last_name, last_data) = events.last().unwrap();
    assert_eq!(last_name, "done");
    assert_eq!(last_data["input_token"], 3);
    assert_eq!(last_data["output_token"], 2);

    let text: String = events
        .iter()
        .filter(|(name, _)| name == "message")
        .map(|(_, data)| data["delta"].as_str().unwrap())
        .collect();
    assert_eq!(text, "Hello there");

    let chat_id = Uuid::parse_str(last_data["chat_uuid"].as_str().unwrap()).unwrap();
    let messages = gateway.store.get(chat_id).await.unwrap().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].text, "Hello there");
}

#[tokio::test]
async fn test_stream_runs_tool_loop() {
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![
        Ok(tool_completion("call-1", "get_weather", json!({}), 4, 1)),
        Ok(text_completion("Sunny.", 6, 2)),
    ]))
    .catalog(StubCatalog::new().with_tool("get_weather", "Sunny, 72F"))
    .build();

    let mut body = ask_body("weather?");
    body["useTools"] = json!(true);
    let text = AxumTestRequest::post("/ask-stream")
        .json(&body)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .text();

    let events = parse_events(&text);
    let (name, data) = events.last().unwrap();
    assert_eq!(name, "done");
    assert_eq!(data["input_token"], 10);
    assert_eq!(data["output_token"], 3);
    assert_eq!(gateway.catalog.calls().len(), 1);
}

#[tokio::test]
async fn test_stream_budget_exhaustion_appends_notice() {
    let mut still_wants_tools = tool_completion("call-2", "get_weather", json!({}), 5, 1);
    still_wants_tools.text = "Still checking".to_owned();
    let gateway = GatewayBuilder::new(ScriptedProvider::new(vec![
        Ok(tool_completion("call-1", "get_weather", json!({}), 4, 1)),
        Ok(still_wants_tools),
    ]))
    .catalog(StubCatalog::new().with_tool("get_weather", "Sunny, 72F"))
    .tool_budget(1)
    .build();

    let mut body = ask_body("weather?");
    body["useTools"] = json!(true);
    let text = AxumTestRequest::post("/ask-stream")
        .json(&body)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .text();

    let events = parse_events(&text);
    let (name, data) = events.last().unwrap();
    assert_eq!(name, "done");
    assert_eq!(data["input_token"], 9);
    assert_eq!(data["output_token"], 2);

    let deltas: Vec<&str> = events
        .iter()
        .filter(|(name, _)| name == "message")
        .map(|(_, data)| data["delta"].as_str().unwrap())
        .collect();
    let notice = format!("\n\n{TOOL_LOOP_TRUNCATED}");
    assert_eq!(deltas.last().copied(), Some(notice.as_str()));
    let (before_done, _) = &events[events.len() - 2];
    assert_eq!(before_done, "message");
    assert_eq!(deltas.concat(), format!("Still checking{notice}"));
    assert_eq!(gateway.catalog.calls().len(), 1);

    let chat_id = Uuid::parse_str(data["chat_uuid"].as_str().unwrap()).unwrap();
    let messages = gateway.store.get(chat_id).await.unwrap().messages;
    let last = messages.last().unwrap();
    assert_eq!(last.role, MessageRole::Assistant);
    assert_eq!(last.text, format!("Still checking{notice}"));
}

#[tokio::test]
async fn test_stream_validation_error_is_plain_json() {
    let gateway = create_test_gateway(ScriptedProvider::new(Vec::new()));

    let body: Value = AxumTestRequest::post("/ask-stream")
        .json(&json!({"question": ""}))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::BAD_REQUEST)
        .json();
    assert_eq!(body["error"], "question cannot be empty");
}

#[tokio::test]
async fn test_stream_provider_failure_ends_with_error_event() {
    let gateway = create_test_gateway(ScriptedProvider::new(vec![Err(
        AppError::external_unavailable("anthropic", "connection refused"),
    )]));

    let text = AxumTestRequest::post("/ask-stream")
        .json(&ask_body("hello"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .text();

    let events = parse_events(&text);
    assert_eq!(events.len(), 1);
    let (name, data) = &events[0];
    assert_eq!(name, "error");
    assert!(data["error"].as_str().unwrap().contains("connection refused"));
    assert!(!text.contains("event: done"));

    let chats = gateway.store.list().await.unwrap();
    assert_eq!(chats[0].messages.len(), 1);
    assert_eq!(chats[0].messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn test_cancellation_halts_stream_without_done() {
    let gateway = create_test_gateway(ScriptedProvider::hanging(vec![Ok(text_completion(
        "partial answer",
        1,
        1,
    ))]));

    let request: AskRequest = serde_json::from_value(ask_body("hello")).unwrap();
    let cancel = CancellationToken::new();
    let events = gateway
        .orchestrator()
        .ask_stream(request, cancel.clone())
        .await
        .unwrap();
    let mut events = Box::pin(events);

    let mut received = String::new();
    while received.len() < "partial answer".len() {
        match events.next().await {
            Some(TurnEvent::Delta(delta)) => received.push_str(&delta),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(received, "partial answer");

    cancel.cancel();
    let next = timeout(Duration::from_secs(1), events.next())
        .await
        .expect("stream did not stop after cancellation");
    assert_eq!(next, None);

    let chats = gateway.store.list().await.unwrap();
    assert!(chats[0]
        .messages
        .iter()
        .all(|m| m.role != MessageRole::Assistant));
}
