// ABOUTME: Server configuration loaded once from the environment at start-up
// ABOUTME: HTTP, MCP client, tracing, auth, Google OAuth and LLM credential sections
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Configuration
//!
//! Environment-only configuration. Every section has a `from_source` constructor
//! taking an [`EnvSource`], and [`ServerConfig::from_env`] composes them from the
//! process environment. Credentials are read here once and injected into the
//! provider factory; request handling never touches the environment.

/// Environment lookup and parsing helpers
pub mod environment;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use zeroize::Zeroizing;

pub use environment::{EnvSource, ProcessEnv};

use crate::constants::{limits, ports, service, timeouts};
use crate::errors::{AppError, AppResult};
use environment::{env_bool, env_duration, env_opt, env_parse, env_var_or, parse_list};

// ============================================================================
// Secrets
// ============================================================================

/// A credential that is wiped on drop and redacted in `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the secret for use on the wire
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

fn secret_opt(source: &dyn EnvSource, key: &str) -> Option<SecretString> {
    env_opt(source, key).map(SecretString::new)
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind host
    pub host: String,
    /// Bind port (`API_SERVER_PORT`)
    pub port: u16,
    /// Per-request deadline for orchestrated turns
    pub request_timeout: Duration,
    /// Graceful shutdown deadline
    pub shutdown_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: ports::DEFAULT_HOST.to_owned(),
            port: ports::DEFAULT_API_PORT,
            request_timeout: Duration::from_secs(timeouts::REQUEST_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(timeouts::SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl HttpConfig {
    /// Load from an environment source
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed values.
    pub fn from_source(source: &dyn EnvSource) -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env_var_or(source, "API_SERVER_HOST", &defaults.host),
            port: env_parse(source, "API_SERVER_PORT", defaults.port)?,
            request_timeout: Duration::from_secs(env_parse(
                source,
                "REQUEST_TIMEOUT_SECS",
                timeouts::REQUEST_TIMEOUT_SECS,
            )?),
            shutdown_timeout: Duration::from_secs(env_parse(
                source,
                "SHUTDOWN_TIMEOUT_SECS",
                timeouts::SHUTDOWN_TIMEOUT_SECS,
            )?),
        })
    }
}

/// MCP client connection settings
#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Streamable HTTP endpoint of the MCP server
    pub server_url: String,
    /// Port of the MCP server, used to derive the default URL
    pub server_port: u16,
    /// Reconnect attempts before giving up
    pub max_retries: u32,
    /// Base delay between reconnect attempts, doubled per attempt
    pub retry_delay: Duration,
    /// Interval between health-check pings
    pub health_check_interval: Duration,
    /// Connection establishment deadline
    pub connect_timeout: Duration,
    /// Deadline for a single JSON-RPC round-trip
    pub request_timeout: Duration,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{}/mcp", ports::DEFAULT_MCP_PORT),
            server_port: ports::DEFAULT_MCP_PORT,
            max_retries: limits::MCP_MAX_RETRIES,
            retry_delay: Duration::from_secs(timeouts::MCP_RETRY_DELAY_SECS),
            health_check_interval: Duration::from_secs(timeouts::HEALTH_CHECK_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(timeouts::CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(timeouts::MCP_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl McpClientConfig {
    /// Load from an environment source
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed values.
    pub fn from_source(source: &dyn EnvSource) -> AppResult<Self> {
        let defaults = Self::default();
        let server_port = env_parse(source, "MCP_SERVER_PORT", defaults.server_port)?;
        let server_url = env_opt(source, "MCP_SERVER_URL")
            .unwrap_or_else(|| format!("http://localhost:{server_port}/mcp"));

        Ok(Self {
            server_url,
            server_port,
            max_retries: env_parse(source, "MCP_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: env_duration(source, "MCP_RETRY_DELAY", defaults.retry_delay)?,
            health_check_interval: env_duration(
                source,
                "MCP_HEALTH_CHECK_INTERVAL",
                defaults.health_check_interval,
            )?,
            connect_timeout: env_duration(
                source,
                "MCP_CONNECT_TIMEOUT",
                defaults.connect_timeout,
            )?,
            request_timeout: env_duration(
                source,
                "MCP_REQUEST_TIMEOUT",
                defaults.request_timeout,
            )?,
        })
    }
}

/// Distributed tracing export settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Export spans over OTLP
    pub enabled: bool,
    /// `service.name` resource attribute
    pub service_name: String,
    /// OTLP gRPC collector address
    pub endpoint: String,
    /// Export timeout
    pub timeout: Duration,
    /// Trace-id ratio sampling in `0..=1`
    pub sampling_rate: f64,
    /// Batch processor scheduling delay
    pub batch_timeout: Duration,
    /// `deployment.environment` resource attribute
    pub environment: String,
    /// `service.version` resource attribute
    pub version: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "service".to_owned(),
            endpoint: "localhost:4317".to_owned(),
            timeout: Duration::from_secs(5),
            sampling_rate: 1.0,
            batch_timeout: Duration::from_secs(5),
            environment: "development".to_owned(),
            version: "0.1.0".to_owned(),
        }
    }
}

impl TracingConfig {
    /// Load from an environment source
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed values or a sampling rate outside `0..=1`.
    pub fn from_source(source: &dyn EnvSource) -> AppResult<Self> {
        let defaults = Self::default();
        let sampling_rate = env_parse(source, "TRACING_SAMPLING_RATE", defaults.sampling_rate)?;
        if !(0.0..=1.0).contains(&sampling_rate) {
            return Err(AppError::config(format!(
                "TRACING_SAMPLING_RATE must be between 0 and 1, got {sampling_rate}"
            )));
        }

        Ok(Self {
            enabled: env_bool(source, "TRACING_ENABLED", defaults.enabled)?,
            service_name: env_var_or(source, "TRACING_SERVICE_NAME", &defaults.service_name),
            endpoint: env_var_or(source, "TRACING_ENDPOINT_ADDRESS", &defaults.endpoint),
            timeout: env_duration(source, "TRACING_TIMEOUT", defaults.timeout)?,
            sampling_rate,
            batch_timeout: env_duration(source, "TRACING_BATCH_TIMEOUT", defaults.batch_timeout)?,
            environment: env_var_or(source, "TRACING_ENVIRONMENT", &defaults.environment),
            version: env_var_or(source, "TRACING_VERSION", &defaults.version),
        })
    }
}

/// Bearer-token validation settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Protect `/chats` with bearer validation
    pub enabled: bool,
    /// Identity provider domain, e.g. `tenant.auth0.com`
    pub domain: Option<String>,
    /// OAuth client id registered with the identity provider
    pub client_id: Option<String>,
    /// OAuth client secret registered with the identity provider
    pub client_secret: Option<SecretString>,
    /// Login callback URL
    pub callback_url: Option<String>,
    /// Required `aud` claim
    pub audience: Option<String>,
    /// Maximum accepted token age measured from `iat`
    pub token_ttl: Duration,
    /// Also protect `/ask` and `/ask-stream`
    pub protect_ask: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            domain: None,
            client_id: None,
            client_secret: None,
            callback_url: None,
            audience: None,
            token_ttl: Duration::from_secs(3600),
            protect_ask: false,
        }
    }
}

impl AuthConfig {
    /// Load from an environment source
    ///
    /// # Errors
    ///
    /// Returns a configuration error when auth is enabled without a domain or audience.
    pub fn from_source(source: &dyn EnvSource) -> AppResult<Self> {
        let domain = env_opt(source, "AUTH_DOMAIN");
        let audience = env_opt(source, "AUTH_AUDIENCE");
        let enabled = env_bool(source, "AUTH_ENABLED", domain.is_some())?;

        if enabled && (domain.is_none() || audience.is_none()) {
            return Err(AppError::config(
                "AUTH_DOMAIN and AUTH_AUDIENCE are required when AUTH_ENABLED is true",
            ));
        }

        Ok(Self {
            enabled,
            domain,
            client_id: env_opt(source, "AUTH_CLIENT_ID"),
            client_secret: secret_opt(source, "AUTH_CLIENT_SECRET"),
            callback_url: env_opt(source, "AUTH_CALLBACK_URL"),
            audience,
            token_ttl: env_duration(source, "AUTH_TOKEN_TTL", Duration::from_secs(3600))?,
            protect_ask: env_bool(source, "AUTH_PROTECT_ASK", false)?,
        })
    }

    /// Expected `iss` claim: `https://{domain}/`
    #[must_use]
    pub fn issuer(&self) -> Option<String> {
        self.domain.as_ref().map(|domain| {
            if domain.starts_with("http://") || domain.starts_with("https://") {
                format!("{}/", domain.trim_end_matches('/'))
            } else {
                format!("https://{}/", domain.trim_end_matches('/'))
            }
        })
    }

    /// JWKS endpoint derived from the issuer
    #[must_use]
    pub fn jwks_url(&self) -> Option<String> {
        self.issuer()
            .map(|issuer| format!("{issuer}.well-known/jwks.json"))
    }
}

/// Google OAuth settings for the third-party token broker
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    /// Register `/oauth/login` and `/oauth/callback`
    pub enabled: bool,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: Option<SecretString>,
    /// Redirect URL registered with Google
    pub redirect_url: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Name of the CSRF state cookie
    pub state_cookie: String,
    /// Persist tokens to this file instead of memory
    pub token_file: Option<PathBuf>,
    /// Consent endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: None,
            redirect_url: String::new(),
            scopes: Vec::new(),
            state_cookie: "oauth_state".to_owned(),
            token_file: None,
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_owned(),
            token_url: "https://oauth2.googleapis.com/token".to_owned(),
        }
    }
}

impl GoogleOAuthConfig {
    /// Load from an environment source
    ///
    /// # Errors
    ///
    /// Returns a configuration error when enabled without client credentials or redirect URL.
    pub fn from_source(source: &dyn EnvSource) -> AppResult<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: env_bool(source, "GOOGLE_OAUTH_ENABLED", false)?,
            client_id: env_var_or(source, "GOOGLE_CLIENT_ID", ""),
            client_secret: secret_opt(source, "GOOGLE_CLIENT_SECRET"),
            redirect_url: env_var_or(source, "GOOGLE_REDIRECT_URL", ""),
            scopes: env_opt(source, "GOOGLE_SCOPES")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            state_cookie: env_var_or(source, "GOOGLE_STATE_COOKIE", &defaults.state_cookie),
            token_file: env_opt(source, "GOOGLE_AUTH_TOKEN_SOURCE_FILE").map(PathBuf::from),
            auth_url: env_var_or(source, "GOOGLE_AUTH_URL", &defaults.auth_url),
            token_url: env_var_or(source, "GOOGLE_TOKEN_URL", &defaults.token_url),
        };

        if config.enabled
            && (config.client_id.is_empty()
                || config.client_secret.is_none()
                || config.redirect_url.is_empty())
        {
            return Err(AppError::config(
                "GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URL are required when Google OAuth is enabled",
            ));
        }

        Ok(config)
    }
}

/// LLM credentials and endpoint overrides, injected into the provider factory
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    /// `ANTHROPIC_API_KEY`
    pub anthropic_api_key: Option<SecretString>,
    /// `OPENAI_API_KEY`
    pub openai_api_key: Option<SecretString>,
    /// `AMAZON_BEDROCK_API_KEY`
    pub bedrock_api_key: Option<SecretString>,
    /// `DEEPSEEK_API_KEY`
    pub deepseek_api_key: Option<SecretString>,
    /// `AWS_REGION` or `AWS_DEFAULT_REGION`
    pub aws_region: Option<String>,
    /// `AWS_PROFILE`
    pub aws_profile: Option<String>,
    /// `ANTHROPIC_BASE_URL`
    pub anthropic_base_url: Option<String>,
    /// `OPENAI_BASE_URL`
    pub openai_base_url: Option<String>,
    /// `DEEPSEEK_BASE_URL`
    pub deepseek_base_url: Option<String>,
    /// `BEDROCK_BASE_URL`
    pub bedrock_base_url: Option<String>,
}

impl ProviderCredentials {
    /// Load from an environment source
    #[must_use]
    pub fn from_source(source: &dyn EnvSource) -> Self {
        Self {
            anthropic_api_key: secret_opt(source, "ANTHROPIC_API_KEY"),
            openai_api_key: secret_opt(source, "OPENAI_API_KEY"),
            bedrock_api_key: secret_opt(source, "AMAZON_BEDROCK_API_KEY"),
            deepseek_api_key: secret_opt(source, "DEEPSEEK_API_KEY"),
            aws_region: env_opt(source, "AWS_REGION")
                .or_else(|| env_opt(source, "AWS_DEFAULT_REGION")),
            aws_profile: env_opt(source, "AWS_PROFILE"),
            anthropic_base_url: env_opt(source, "ANTHROPIC_BASE_URL"),
            openai_base_url: env_opt(source, "OPENAI_BASE_URL"),
            deepseek_base_url: env_opt(source, "DEEPSEEK_BASE_URL"),
            bedrock_base_url: env_opt(source, "BEDROCK_BASE_URL"),
        }
    }

    /// Names of providers with a configured key, for start-up logging
    #[must_use]
    pub fn configured(&self) -> Vec<&'static str> {
        [
            ("anthropic", self.anthropic_api_key.is_some()),
            ("openai", self.openai_api_key.is_some()),
            ("bedrock", self.bedrock_api_key.is_some()),
            ("deepseek", self.deepseek_api_key.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }
}

// ============================================================================
// Server configuration
// ============================================================================

/// Complete gateway configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// HTTP listener
    pub http: HttpConfig,
    /// MCP client
    pub mcp: McpClientConfig,
    /// Span export
    pub tracing: TracingConfig,
    /// Bearer validation
    pub auth: AuthConfig,
    /// Third-party OAuth broker
    pub google_oauth: GoogleOAuthConfig,
    /// LLM credentials
    pub providers: ProviderCredentials,
}

impl ServerConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed or inconsistent values.
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");
        Self::from_source(&ProcessEnv)
    }

    /// Load configuration from any source
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed or inconsistent values.
    pub fn from_source(source: &dyn EnvSource) -> AppResult<Self> {
        let config = Self {
            http: HttpConfig::from_source(source)?,
            mcp: McpClientConfig::from_source(source)?,
            tracing: TracingConfig::from_source(source)?,
            auth: AuthConfig::from_source(source)?,
            google_oauth: GoogleOAuthConfig::from_source(source)?,
            providers: ProviderCredentials::from_source(source),
        };
        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        info!(
            port = self.http.port,
            mcp_server_url = %self.mcp.server_url,
            tracing_enabled = self.tracing.enabled,
            auth_enabled = self.auth.enabled,
            google_oauth_enabled = self.google_oauth.enabled,
            providers = ?self.providers.configured(),
            "Configuration loaded"
        );
        if !self.auth.enabled {
            warn!("Bearer authentication is disabled; /chats is unprotected");
        }
    }

    /// Service name for logs and spans
    #[must_use]
    pub fn service_name(&self) -> &str {
        if self.tracing.service_name == TracingConfig::default().service_name {
            service::SERVICE_NAME
        } else {
            &self.tracing.service_name
        }
    }
}
