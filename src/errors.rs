// ABOUTME: Re-exports the unified error types from gateway-core
// ABOUTME: Keeps crate::errors paths stable for every module in the gateway
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Unified error handling, re-exported from `gateway-core`.

pub use gateway_core::errors::{AppError, AppResult, ErrorCode, ErrorContext, ErrorResponse};
