// ABOUTME: Bearer authentication middleware for protected routes
// ABOUTME: Rejects requests without a valid token and exposes claims to handlers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::header::AUTHORIZATION;
use tracing::{debug, Span};

use crate::auth::{bearer_token, TokenValidator};
use crate::errors::AppResult;

/// Require a valid bearer token
///
/// Use with `axum::middleware::from_fn_with_state(validator, require_bearer)`.
/// The validated [`Claims`](crate::auth::Claims) are inserted into the request
/// extensions; failures answer 401 with `{"error": "..."}`.
///
/// # Errors
///
/// Returns `AuthInvalid` or `AuthExpired` when the token does not validate.
pub async fn require_bearer(
    State(validator): State<Arc<dyn TokenValidator>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let claims = match bearer_token(header) {
        Ok(token) => validator.validate(token).await,
        Err(e) => Err(e),
    }
    .inspect_err(|e| debug!(error = %e, "Rejected bearer token"))?;

    Span::current().record("user_id", claims.sub.as_str());
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
