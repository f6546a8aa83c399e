// ABOUTME: OAuth token broker driving the redirect flow and handing out token sources
// ABOUTME: CSRF state lives in an HttpOnly Secure cookie compared in constant time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{OAuthClient, OAuthToken, ProviderConfig, StoredToken, TokenStorage};
use crate::constants::limits::OAUTH_STATE_BYTES;
use crate::errors::{AppError, AppResult, ErrorCode};

/// Message for a missing or mismatched state parameter
pub const INVALID_STATE: &str = "invalid state parameter";
/// Message for a callback without a code
pub const MISSING_CODE: &str = "authorization code is missing";

/// The CSRF state cookie set by [`OAuthTokenBroker::begin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCookie {
    /// Cookie name
    pub name: String,
    /// Random state value
    pub value: String,
}

impl StateCookie {
    /// `Set-Cookie` value installing the state
    #[must_use]
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; Secure; SameSite=Lax",
            self.name, self.value
        )
    }

    /// `Set-Cookie` value clearing the cookie named `name`
    #[must_use]
    pub fn cleared(name: &str) -> String {
        format!("{name}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Lax")
    }
}

/// Where to send the user, and the cookie to set on the way
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    /// Provider consent URL
    pub url: String,
    /// State cookie bound to the URL
    pub cookie: StateCookie,
}

/// The parts of the callback request the broker checks
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// `state` query parameter
    pub state: Option<String>,
    /// `code` query parameter
    pub code: Option<String>,
    /// Value of the state cookie
    pub cookie_state: Option<String>,
}

/// Value of cookie `name` in a `Cookie` request header
#[must_use]
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"').to_owned())
    })
}

fn random_state() -> String {
    let mut bytes = [0u8; OAUTH_STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn states_match(query: &str, cookie: &str) -> bool {
    !query.is_empty() && bool::from(query.as_bytes().ct_eq(cookie.as_bytes()))
}

/// Owns the OAuth redirect flow and the stored token
pub struct OAuthTokenBroker {
    client: OAuthClient,
    storage: Arc<dyn TokenStorage>,
    cookie_name: String,
}

impl OAuthTokenBroker {
    /// Broker for `config`, storing tokens in `storage`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        config: ProviderConfig,
        storage: Arc<dyn TokenStorage>,
        cookie_name: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            client: OAuthClient::new(config)?,
            storage,
            cookie_name: cookie_name.into(),
        })
    }

    /// Name of the state cookie
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Start a flow: mint a state and build the consent redirect
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider auth URL is malformed.
    #[instrument(skip(self))]
    pub fn begin(&self, flow_id: &str) -> AppResult<AuthorizationRedirect> {
        let state = random_state();
        let url = self.client.authorization_url(&state)?;
        info!(flow_id, "Starting OAuth authorization flow");
        Ok(AuthorizationRedirect {
            url,
            cookie: StateCookie {
                name: self.cookie_name.clone(),
                value: state,
            },
        })
    }

    /// Finish a flow: verify state, exchange the code and store the token
    ///
    /// The caller clears the state cookie on success.
    ///
    /// # Errors
    ///
    /// `StateMismatch` without contacting the provider when the state query
    /// is missing or differs from the cookie; `MissingCode` when no code was
    /// returned; `ExternalAuthFailed` when the exchange fails.
    #[instrument(skip_all)]
    pub async fn complete(&self, params: &CallbackParams) -> AppResult<()> {
        let (Some(state), Some(cookie)) = (params.state.as_deref(), params.cookie_state.as_deref())
        else {
            warn!("OAuth callback without state or state cookie");
            return Err(AppError::new(ErrorCode::StateMismatch, INVALID_STATE));
        };
        if !states_match(state, cookie) {
            warn!("OAuth callback state does not match cookie");
            return Err(AppError::new(ErrorCode::StateMismatch, INVALID_STATE));
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AppError::new(ErrorCode::MissingCode, MISSING_CODE))?;

        let token = self.client.exchange_code(code).await?;
        self.storage
            .store(&StoredToken {
                token,
                config: self.client.config().clone(),
            })
            .await?;
        info!("OAuth token stored");
        Ok(())
    }

    /// A live, self-refreshing source over the stored token
    ///
    /// # Errors
    ///
    /// `NoTokenAvailable` when no flow has completed yet.
    pub async fn token_source(&self) -> AppResult<TokenSource> {
        let record = self
            .storage
            .load()
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::NoTokenAvailable, "no token available"))?;
        TokenSource::new(record, Arc::clone(&self.storage))
    }

    /// Evict the stored token
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be removed.
    pub async fn revoke(&self) -> AppResult<()> {
        self.storage.clear().await?;
        info!("OAuth token revoked");
        Ok(())
    }
}

/// Hands out access tokens, refreshing and persisting them on expiry
pub struct TokenSource {
    client: OAuthClient,
    storage: Arc<dyn TokenStorage>,
    current: Mutex<OAuthToken>,
}

impl TokenSource {
    fn new(record: StoredToken, storage: Arc<dyn TokenStorage>) -> AppResult<Self> {
        Ok(Self {
            client: OAuthClient::new(record.config)?,
            storage,
            current: Mutex::new(record.token),
        })
    }

    /// A valid token, refreshed first if it has expired
    ///
    /// # Errors
    ///
    /// `AuthExpired` when the token expired and cannot be refreshed;
    /// `ExternalAuthFailed` when the refresh request fails.
    pub async fn token(&self) -> AppResult<OAuthToken> {
        let mut current = self.current.lock().await;
        if !current.is_expired() {
            return Ok(current.clone());
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(AppError::auth_expired)?;
        let refreshed = self.client.refresh(&refresh_token).await?;
        self.storage
            .store(&StoredToken {
                token: refreshed.clone(),
                config: self.client.config().clone(),
            })
            .await?;
        *current = refreshed.clone();
        info!("OAuth access token refreshed");
        Ok(refreshed)
    }

    /// Access token string, refreshed first if needed
    ///
    /// # Errors
    ///
    /// See [`Self::token`].
    pub async fn access_token(&self) -> AppResult<String> {
        Ok(self.token().await?.access_token)
    }
}
