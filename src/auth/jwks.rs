// ABOUTME: JWKS-backed RS256 token validator with a five-minute key cache
// ABOUTME: Enforces issuer, audience, bounded clock skew and maximum token age
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Claims, TokenValidator};
use crate::config::AuthConfig;
use crate::constants::timeouts::{
    CONNECT_TIMEOUT_SECS, JWKS_CACHE_SECS, JWKS_REFETCH_COOLDOWN_SECS, JWT_LEEWAY_SECS,
};
use crate::errors::{AppError, AppResult};

/// A public key as published in a JWKS document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type; only `RSA` keys are used
    pub kty: String,
    /// Key id matched against the token header
    #[serde(default)]
    pub kid: Option<String>,
    /// Intended algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Public key use
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent (base64url)
    #[serde(default)]
    pub e: Option<String>,
}

/// A JWKS document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Published keys
    pub keys: Vec<JsonWebKey>,
}

struct CachedKeys {
    fetched_at: Instant,
    keys: HashMap<String, DecodingKey>,
}

fn signing_keys(set: JsonWebKeySet) -> HashMap<String, DecodingKey> {
    set.keys
        .into_iter()
        .filter(|key| key.kty == "RSA")
        .filter(|key| key.key_use.as_deref().is_none_or(|u| u == "sig"))
        .filter(|key| key.alg.as_deref().is_none_or(|alg| alg == "RS256"))
        .filter_map(|key| {
            let kid = key.kid?;
            match DecodingKey::from_rsa_components(key.n.as_deref()?, key.e.as_deref()?) {
                Ok(decoding_key) => Some((kid, decoding_key)),
                Err(e) => {
                    warn!(kid = %kid, error = %e, "Skipping unusable JWKS key");
                    None
                }
            }
        })
        .collect()
}

/// Validates RS256 bearer tokens against the issuer's published keys
pub struct JwksValidator {
    jwks_url: String,
    issuer: String,
    audience: String,
    max_token_age: Option<Duration>,
    cache_ttl: Duration,
    refetch_cooldown: Duration,
    http: Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksValidator {
    /// Validator for tokens issued by `issuer` for `audience`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> AppResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create JWKS HTTP client: {e}")))?;
        Ok(Self {
            jwks_url: jwks_url.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            max_token_age: None,
            cache_ttl: Duration::from_secs(JWKS_CACHE_SECS),
            refetch_cooldown: Duration::from_secs(JWKS_REFETCH_COOLDOWN_SECS),
            http,
            cache: RwLock::new(None),
        })
    }

    /// Validator for the configured identity provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the domain or audience is missing.
    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        let (Some(issuer), Some(jwks_url), Some(audience)) =
            (config.issuer(), config.jwks_url(), config.audience.clone())
        else {
            return Err(AppError::config(
                "AUTH_DOMAIN and AUTH_AUDIENCE are required for bearer validation",
            ));
        };
        Ok(Self::new(jwks_url, issuer, audience)?.with_max_token_age(config.token_ttl))
    }

    /// Reject tokens whose `iat` is older than `age`
    #[must_use]
    pub const fn with_max_token_age(mut self, age: Duration) -> Self {
        self.max_token_age = Some(age);
        self
    }

    /// Override the key cache lifetime
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Minimum spacing between refetches caused by unknown key ids
    #[must_use]
    pub const fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.refetch_cooldown = cooldown;
        self
    }

    async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
            .and_then(|cached| cached.keys.get(kid).cloned())
    }

    /// An expired cache always refetches; a fresh one only after the cooldown
    async fn may_refetch(&self) -> bool {
        self.cache.read().await.as_ref().is_none_or(|cached| {
            let age = cached.fetched_at.elapsed();
            age >= self.cache_ttl || age >= self.refetch_cooldown
        })
    }

    async fn refresh_keys(&self) -> AppResult<()> {
        info!(url = %self.jwks_url, "Fetching JWKS signing keys");
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| {
                warn!(error = %e, "Failed to fetch JWKS");
                AppError::external_unavailable("identity provider", format!("JWKS fetch failed: {e}"))
            })?;
        let set: JsonWebKeySet = response.json().await.map_err(|e| {
            AppError::external_service("identity provider", format!("Malformed JWKS: {e}"))
        })?;

        let keys = signing_keys(set);
        debug!(count = keys.len(), "Cached JWKS signing keys");
        *self.cache.write().await = Some(CachedKeys {
            fetched_at: Instant::now(),
            keys,
        });
        Ok(())
    }

    async fn decoding_key(&self, kid: &str) -> AppResult<DecodingKey> {
        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }
        if self.may_refetch().await {
            self.refresh_keys().await?;
        } else {
            debug!(kid = %kid, "JWKS refetched recently; not fetching again");
        }
        self.cached_key(kid).await.ok_or_else(|| {
            debug!(kid = %kid, "No JWKS key for token kid");
            AppError::auth_invalid("Unknown token signing key")
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = JWT_LEEWAY_SECS;
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }

    fn check_age(&self, claims: &Claims) -> AppResult<()> {
        let (Some(max_age), Some(iat)) = (self.max_token_age, claims.iat) else {
            return Ok(());
        };
        let age = Utc::now().timestamp() - iat;
        let limit = i64::try_from(max_age.as_secs().saturating_add(JWT_LEEWAY_SECS))
            .unwrap_or(i64::MAX);
        if age > limit {
            debug!(age, limit, "Token older than the accepted lifetime");
            return Err(AppError::auth_expired());
        }
        Ok(())
    }
}

#[async_trait]
impl TokenValidator for JwksValidator {
    async fn validate(&self, token: &str) -> AppResult<Claims> {
        if token.split('.').count() != 3 {
            return Err(AppError::auth_invalid("Malformed bearer token"));
        }

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode token header");
            AppError::auth_invalid("Invalid token format")
        })?;
        if header.alg != Algorithm::RS256 {
            return Err(AppError::auth_invalid("Unsupported token algorithm"));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppError::auth_invalid("Token missing key ID"))?;

        let key = self.decoding_key(&kid).await?;
        let data = decode::<Claims>(token, &key, &self.validation()).map_err(|e| {
            debug!(error = %e, "Token validation failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::auth_expired(),
                ErrorKind::InvalidAudience => AppError::auth_invalid("Invalid token audience"),
                ErrorKind::InvalidIssuer => AppError::auth_invalid("Invalid token issuer"),
                _ => AppError::auth_invalid("Invalid token"),
            }
        })?;

        self.check_age(&data.claims)?;
        debug!(sub = %data.claims.sub, "Bearer token validated");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::errors::ErrorCode;

    fn validator() -> JwksValidator {
        // Port 9 is discard; any network use fails the test
        JwksValidator::new("http://127.0.0.1:9/jwks.json", "https://issuer/", "api").unwrap()
    }

    #[tokio::test]
    async fn test_malformed_token_rejected_without_fetch() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
        assert!(validator().cache.read().await.is_none());
    }

    #[test]
    fn test_signing_keys_filters_unusable_entries() {
        let set: JsonWebKeySet = serde_json::from_value(json!({
            "keys": [
                {"kty": "EC", "kid": "ec", "crv": "P-256"},
                {"kty": "RSA", "kid": "enc", "use": "enc", "n": "AQAB", "e": "AQAB"},
                {"kty": "RSA", "n": "AQAB", "e": "AQAB"}
            ]
        }))
        .unwrap();
        assert!(signing_keys(set).is_empty());
    }

    #[test]
    fn test_age_check_uses_iat() {
        let validator = validator().with_max_token_age(Duration::from_secs(3600));
        let mut claims = Claims {
            sub: "u".to_owned(),
            iss: "https://issuer/".to_owned(),
            aud: Value::String("api".to_owned()),
            exp: Utc::now().timestamp() + 60,
            iat: Some(Utc::now().timestamp() - 10),
            scope: None,
        };
        assert!(validator.check_age(&claims).is_ok());
        claims.iat = Some(Utc::now().timestamp() - 7200);
        assert_eq!(
            validator.check_age(&claims).unwrap_err().code,
            ErrorCode::AuthExpired
        );
    }
}
