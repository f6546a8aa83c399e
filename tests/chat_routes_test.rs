// ABOUTME: Integration tests for the conversation history routes
// ABOUTME: Covers bearer protection, listing order, fetch, malformed ids and deletion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::Value;
use tool_gateway::models::Message;
use tool_gateway::storage::ConversationStore;
use uuid::Uuid;

use common::init_test_logging;
use helpers::axum_test::AxumTestRequest;
use helpers::gateway::{GatewayBuilder, TestGateway};
use helpers::stubs::{ScriptedProvider, StaticValidator, VALID_TOKEN};

fn protected_gateway() -> TestGateway {
    GatewayBuilder::new(ScriptedProvider::new(Vec::new()))
        .validator(Arc::new(StaticValidator))
        .build()
}

async fn seed_chat(gateway: &TestGateway, question: &str) -> Uuid {
    let chat = gateway.store.create().await.unwrap();
    gateway
        .store
        .append(chat.id, Message::user(question))
        .await
        .unwrap();
    gateway
        .store
        .append(chat.id, Message::assistant(format!("answer to {question}")))
        .await
        .unwrap();
    chat.id
}

#[tokio::test]
async fn test_list_requires_bearer() {
    init_test_logging();
    let gateway = protected_gateway();

    let body: Value = AxumTestRequest::get("/chats")
        .send(gateway.router())
        .await
        .assert_status(StatusCode::UNAUTHORIZED)
        .json();
    assert!(body["error"].as_str().is_some());

    AxumTestRequest::get("/chats")
        .bearer("forged")
        .send(gateway.router())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_returns_most_recent_first() {
    let gateway = protected_gateway();
    let older = seed_chat(&gateway, "first").await;
    let newer = seed_chat(&gateway, "second").await;
    let mut bump = Message::user("bump");
    bump.generated_at = Utc::now() + Duration::minutes(1);
    gateway.store.append(older, bump).await.unwrap();

    let body: Value = AxumTestRequest::get("/chats")
        .bearer(VALID_TOKEN)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .json();

    let ids: Vec<&str> = body["chats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|chat| chat["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![older.to_string(), newer.to_string()]);
}

#[tokio::test]
async fn test_get_is_public() {
    let gateway = protected_gateway();
    let id = seed_chat(&gateway, "hello").await;

    let body: Value = AxumTestRequest::get(&format!("/chats/{id}"))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .json();

    assert_eq!(body["id"], id.to_string());
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["text"], "hello");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_get_unknown_and_malformed_ids() {
    let gateway = protected_gateway();

    AxumTestRequest::get(&format!("/chats/{}", Uuid::new_v4()))
        .send(gateway.router())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let body: Value = AxumTestRequest::get("/chats/not-a-uuid")
        .send(gateway.router())
        .await
        .assert_status(StatusCode::BAD_REQUEST)
        .json();
    assert_eq!(body["error"], "Invalid chat ID");
}

#[tokio::test]
async fn test_delete_requires_bearer_and_removes_chat() {
    let gateway = protected_gateway();
    let id = seed_chat(&gateway, "hello").await;
    let path = format!("/chats/{id}");

    AxumTestRequest::delete(&path)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    assert!(gateway.store.exists(id).await.unwrap());

    AxumTestRequest::delete(&path)
        .bearer(VALID_TOKEN)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(!gateway.store.exists(id).await.unwrap());

    AxumTestRequest::delete(&path)
        .bearer(VALID_TOKEN)
        .send(gateway.router())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_routes_are_open_when_auth_disabled() {
    let gateway = GatewayBuilder::new(ScriptedProvider::new(Vec::new())).build();
    seed_chat(&gateway, "hello").await;

    let body: Value = AxumTestRequest::get("/chats")
        .send(gateway.router())
        .await
        .assert_status(StatusCode::OK)
        .json();
    assert_eq!(body["chats"].as_array().unwrap().len(), 1);
}
