// ABOUTME: Re-exports the gateway constants from gateway-core
// ABOUTME: Keeps crate::constants paths stable for every module in the gateway
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Application constants, re-exported from `gateway-core`.

pub use gateway_core::constants::*;
