// ABOUTME: OAuth 2.0 authorization-code client for third-party providers
// ABOUTME: Builds consent URLs, exchanges codes and refreshes access tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::OAuthToken;
use crate::config::GoogleOAuthConfig;
use crate::constants::timeouts::CONNECT_TIMEOUT_SECS;
use crate::errors::{AppError, AppResult, ErrorCode};

/// Provider endpoints and client credentials
///
/// Persisted next to the token so a restarted process can refresh it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Consent endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Redirect URL registered with the provider
    pub redirect_url: String,
    /// Requested scopes
    pub scopes: Vec<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl From<&GoogleOAuthConfig> for ProviderConfig {
    fn from(config: &GoogleOAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config
                .client_secret
                .as_ref()
                .map(|s| s.expose().to_owned())
                .unwrap_or_default(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_url: config.redirect_url.clone(),
            scopes: config.scopes.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn bearer() -> String {
    "Bearer".to_owned()
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn auth_failed(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCode::ExternalAuthFailed, message)
}

/// Authorization-code flow client
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: ProviderConfig,
    http: Client,
}

impl OAuthClient {
    /// Create a client for `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ProviderConfig) -> AppResult<Self> {
        let http = Client::builder()
            .connect_timeout(StdDuration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create OAuth HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Provider configuration
    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Consent URL bound to `state`, requesting offline access
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the auth URL is malformed.
    pub fn authorization_url(&self, state: &str) -> AppResult<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AppError::config(format!("Invalid OAuth auth URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);

        Ok(url.into())
    }

    /// Exchange an authorization code for a token
    ///
    /// # Errors
    ///
    /// `ExternalAuthFailed` if the provider rejects the code or is unreachable.
    pub async fn exchange_code(&self, code: &str) -> AppResult<OAuthToken> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        self.token_request(&params).await
    }

    /// Mint a new access token from a refresh token
    ///
    /// # Errors
    ///
    /// `ExternalAuthFailed` if the provider rejects the refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<OAuthToken> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let mut token = self.token_request(&params).await?;
        // Providers usually omit the refresh token on refresh
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_owned());
        }
        Ok(token)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> AppResult<OAuthToken> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| auth_failed(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TokenErrorResponse>(&body).map_or_else(
                |_| format!("HTTP {status}"),
                |e| match e.error_description {
                    Some(description) => format!("{}: {description}", e.error),
                    None => e.error,
                },
            );
            warn!(status = status.as_u16(), "OAuth token request failed: {detail}");
            return Err(auth_failed(format!("token exchange failed: {detail}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| auth_failed(format!("malformed token response: {e}")))?;
        debug!(has_refresh = parsed.refresh_token.is_some(), "Received OAuth token");

        Ok(OAuthToken {
            access_token: parsed.access_token,
            token_type: parsed.token_type,
            refresh_token: parsed.refresh_token,
            expiry: parsed
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
            scope: parsed.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            client_id: "cid".to_owned(),
            client_secret: "secret".to_owned(),
            auth_url: "https://accounts.example.com/o/oauth2/auth".to_owned(),
            token_url: "https://oauth2.example.com/token".to_owned(),
            redirect_url: "http://localhost:8081/oauth/callback".to_owned(),
            scopes: vec!["mail.read".to_owned(), "mail.send".to_owned()],
        }
    }

    #[test]
    fn test_authorization_url_carries_state_and_offline_access() {
        let client = OAuthClient::new(config()).unwrap();
        let url = Url::parse(&client.authorization_url("xyz").unwrap()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".to_owned(), "xyz".to_owned())));
        assert!(pairs.contains(&("access_type".to_owned(), "offline".to_owned())));
        assert!(pairs.contains(&("scope".to_owned(), "mail.read mail.send".to_owned())));
        assert!(pairs.contains(&("response_type".to_owned(), "code".to_owned())));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
