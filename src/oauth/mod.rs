// ABOUTME: Third-party OAuth 2.0 token brokering for services reached through tools
// ABOUTME: Authorization-code flow with CSRF state cookies and self-refreshing tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # OAuth Token Broker
//!
//! `/oauth/login` calls [`OAuthTokenBroker::begin`], which mints a random
//! state, hands it back as an `HttpOnly; Secure` cookie, and redirects to the
//! provider's consent page. `/oauth/callback` calls
//! [`OAuthTokenBroker::complete`], which checks the `state` query against the
//! cookie in constant time before exchanging the code. The resulting token is
//! kept in a [`TokenStorage`] and handed out as a refreshing [`TokenSource`].

mod broker;
mod client;
mod storage;

pub use broker::{
    cookie_value, AuthorizationRedirect, CallbackParams, OAuthTokenBroker, StateCookie,
    TokenSource,
};
pub use client::{OAuthClient, ProviderConfig};
pub use storage::{FileTokenStorage, InMemoryTokenStorage, StoredToken, TokenStorage};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Refresh this long before the provider-reported expiry
const EXPIRY_DELTA_SECS: i64 = 10;

/// An OAuth access token with optional refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Bearer credential
    pub access_token: String,
    /// Usually `Bearer`
    pub token_type: String,
    /// Long-lived credential used to mint new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant; `None` means the token does not expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Whether the token is expired or about to expire
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - Duration::seconds(EXPIRY_DELTA_SECS) <= Utc::now())
    }
}
