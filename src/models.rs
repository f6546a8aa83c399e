// ABOUTME: Conversation data model shared by storage, orchestration and routes
// ABOUTME: Re-exports the message, tool-call and token-usage types from gateway-core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub use gateway_core::models::{
    Conversation, Message, MessageRole, TokenUsage, ToolCall, ToolResult,
};
