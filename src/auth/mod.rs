// ABOUTME: Bearer token validation for protected gateway routes
// ABOUTME: Defines the validator contract, claims and Authorization header parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Bearer Authentication
//!
//! Protected routes (`/chats`, and `/ask` when `AUTH_PROTECT_ASK` is set) run
//! the [`require_bearer`](crate::middleware::require_bearer) middleware, which
//! parses the `Authorization` header with [`bearer_token`] and hands the token
//! to a [`TokenValidator`]. The production validator is [`JwksValidator`]:
//! RS256 signatures checked against the issuer's JWKS, keys cached for five
//! minutes, one minute of clock skew, audience and issuer enforced.

mod jwks;

pub use jwks::{JsonWebKey, JsonWebKeySet, JwksValidator};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};

/// Claims of a validated access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience, a string or an array of strings
    pub aud: Value,
    /// Expiry (seconds since the epoch)
    pub exp: i64,
    /// Issued-at (seconds since the epoch)
    #[serde(default)]
    pub iat: Option<i64>,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

impl Claims {
    /// Whether `scope` was granted
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope
            .as_deref()
            .is_some_and(|granted| granted.split(' ').any(|s| s == scope))
    }
}

/// Validates bearer tokens
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Verify `token` and return its claims
    ///
    /// # Errors
    ///
    /// `AuthInvalid` for malformed, unsigned or mismatched tokens;
    /// `AuthExpired` for expired tokens.
    async fn validate(&self, token: &str) -> AppResult<Claims>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// # Errors
///
/// `AuthInvalid` when the header is missing or not a bearer credential.
pub fn bearer_token(header: Option<&str>) -> AppResult<&str> {
    let header = header.ok_or_else(|| AppError::auth_invalid("Missing bearer token"))?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AppError::auth_invalid("Malformed bearer token")),
    }
}
