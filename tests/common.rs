// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides quiet logging and request-body builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used
)]
//! Shared test utilities for `tool_gateway`

use std::env;
use std::sync::Once;

use serde_json::{json, Value};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Body of an `/ask` request against the stub provider
pub fn ask_body(question: &str) -> Value {
    json!({
        "question": question,
        "llmProvider": {"provider": "anthropic", "modelId": "claude-3-5-sonnet-latest"}
    })
}

/// Same as [`ask_body`] continuing `chat_uuid`
pub fn follow_up(chat_uuid: &str, question: &str) -> Value {
    let mut body = ask_body(question);
    body["chat_uuid"] = json!(chat_uuid);
    body
}
