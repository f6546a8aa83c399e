// ABOUTME: Shared test helpers and utilities for integration tests
// ABOUTME: Exports the axum request helper, stub collaborators and the gateway builder
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(dead_code)]

pub mod axum_test;
pub mod gateway;
pub mod stubs;
