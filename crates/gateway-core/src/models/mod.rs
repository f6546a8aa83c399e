// ABOUTME: Core data models shared by storage, orchestration and HTTP layers
// ABOUTME: Re-exports the conversation model
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Core data models.

mod conversation;

pub use conversation::{Conversation, Message, MessageRole, TokenUsage, ToolCall, ToolResult};
