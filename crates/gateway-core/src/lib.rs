// ABOUTME: Core types and constants for the tool gateway
// ABOUTME: Foundation crate with error handling, the conversation model, and constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Gateway Core
//!
//! Foundation crate providing shared types and constants for the tool gateway.
//! It changes infrequently, so the main crate gets incremental compilation
//! benefits from keeping these definitions here.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Defaults for timeouts, limits, and well-known names
//! - **models**: Conversation, message, and tool-call records

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Application constants organized by domain
pub mod constants;

/// Conversation data model
pub mod models;
