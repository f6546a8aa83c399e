// ABOUTME: Third-party OAuth redirect and callback routes
// ABOUTME: Sets the state cookie on login and verifies it before exchanging the code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use http::header::{COOKIE, SET_COOKIE};
use http::HeaderMap;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::oauth::{cookie_value, CallbackParams, OAuthTokenBroker, StateCookie};

/// Query string of the provider's redirect back to the gateway
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    /// State echoed by the provider
    pub state: Option<String>,
    /// Authorization code
    pub code: Option<String>,
    /// Provider-reported failure such as `access_denied`
    pub error: Option<String>,
}

fn state_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| cookie_value(header, name))
}

/// OAuth routes implementation
pub struct OAuthRoutes;

impl OAuthRoutes {
    /// `GET /oauth/login` and `GET /oauth/callback`
    pub fn routes(broker: &Arc<OAuthTokenBroker>) -> Router {
        Router::new()
            .route("/oauth/login", get(Self::login))
            .route("/oauth/callback", get(Self::callback))
            .with_state(Arc::clone(broker))
    }

    async fn login(State(broker): State<Arc<OAuthTokenBroker>>) -> AppResult<Response> {
        let redirect = broker.begin(&Uuid::new_v4().to_string())?;
        Ok((
            [(SET_COOKIE, redirect.cookie.header_value())],
            Redirect::temporary(&redirect.url),
        )
            .into_response())
    }

    async fn callback(
        State(broker): State<Arc<OAuthTokenBroker>>,
        Query(query): Query<CallbackQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        if let Some(error) = &query.error {
            warn!(error = %error, "OAuth provider returned an error");
        }
        let params = CallbackParams {
            state: query.state,
            code: query.code,
            cookie_state: state_cookie(&headers, broker.cookie_name()),
        };
        broker.complete(&params).await?;

        Ok((
            [(SET_COOKIE, StateCookie::cleared(broker.cookie_name()))],
            "Authentication successful",
        )
            .into_response())
    }
}
