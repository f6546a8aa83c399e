// ABOUTME: Integration tests for environment-driven server configuration
// ABOUTME: Uses map-backed sources plus one serialized process-environment test
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serial_test::serial;
use tool_gateway::config::ServerConfig;
use tool_gateway::errors::{AppError, ErrorCode};

fn load(pairs: &[(&'static str, &'static str)]) -> Result<ServerConfig, AppError> {
    let source: HashMap<&str, &str> = pairs.iter().copied().collect();
    ServerConfig::from_source(&source)
}

#[test]
fn test_defaults() {
    let config = load(&[]).unwrap();

    assert_eq!(config.http.port, 8081);
    assert_eq!(config.http.request_timeout, Duration::from_secs(120));
    assert_eq!(config.http.shutdown_timeout, Duration::from_secs(30));
    assert_eq!(config.mcp.server_url, "http://localhost:8080/mcp");
    assert_eq!(config.mcp.connect_timeout, Duration::from_secs(60));
    assert!(!config.tracing.enabled);
    assert!(!config.auth.enabled);
    assert!(!config.auth.protect_ask);
    assert!(!config.google_oauth.enabled);
    assert!(config.providers.configured().is_empty());
    assert_eq!(config.service_name(), "tool-gateway");
}

#[test]
fn test_overrides() {
    let config = load(&[
        ("API_SERVER_PORT", "9090"),
        ("MCP_SERVER_PORT", "7000"),
        ("TRACING_ENABLED", "true"),
        ("TRACING_SERVICE_NAME", "gateway-east"),
        ("TRACING_SAMPLING_RATE", "0.25"),
        ("TRACING_BATCH_TIMEOUT", "250ms"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
        ("OPENAI_API_KEY", "sk-oai"),
        ("AWS_DEFAULT_REGION", "eu-west-1"),
    ])
    .unwrap();

    assert_eq!(config.http.port, 9090);
    assert_eq!(config.mcp.server_url, "http://localhost:7000/mcp");
    assert!(config.tracing.enabled);
    assert_eq!(config.service_name(), "gateway-east");
    assert!((config.tracing.sampling_rate - 0.25).abs() < f64::EPSILON);
    assert_eq!(config.tracing.batch_timeout, Duration::from_millis(250));
    assert_eq!(config.providers.configured(), vec!["anthropic", "openai"]);
    assert_eq!(
        config
            .providers
            .anthropic_api_key
            .as_ref()
            .map(|k| k.expose().to_owned()),
        Some("sk-ant".to_owned())
    );
    assert_eq!(config.providers.aws_region.as_deref(), Some("eu-west-1"));
}

#[test]
fn test_explicit_mcp_url_wins_over_port() {
    let config = load(&[
        ("MCP_SERVER_URL", "http://tools.internal:3000/mcp"),
        ("MCP_SERVER_PORT", "7000"),
    ])
    .unwrap();
    assert_eq!(config.mcp.server_url, "http://tools.internal:3000/mcp");
}

#[test]
fn test_auth_section() {
    let config = load(&[
        ("AUTH_DOMAIN", "tenant.auth.example.com"),
        ("AUTH_AUDIENCE", "https://gateway.example.com"),
        ("AUTH_TOKEN_TTL", "15m"),
        ("AUTH_PROTECT_ASK", "yes"),
    ])
    .unwrap();

    assert!(config.auth.enabled, "a configured domain enables auth");
    assert!(config.auth.protect_ask);
    assert_eq!(config.auth.token_ttl, Duration::from_secs(900));
    assert_eq!(
        config.auth.issuer().as_deref(),
        Some("https://tenant.auth.example.com/")
    );
    assert_eq!(
        config.auth.jwks_url().as_deref(),
        Some("https://tenant.auth.example.com/.well-known/jwks.json")
    );

    let disabled = load(&[
        ("AUTH_ENABLED", "false"),
        ("AUTH_DOMAIN", "tenant.auth.example.com"),
    ])
    .unwrap();
    assert!(!disabled.auth.enabled);
}

#[test]
fn test_auth_enabled_without_audience_is_rejected() {
    let err = load(&[("AUTH_ENABLED", "true"), ("AUTH_DOMAIN", "tenant.example.com")]).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigError);
}

#[test]
fn test_google_oauth_section() {
    let config = load(&[
        ("GOOGLE_OAUTH_ENABLED", "1"),
        ("GOOGLE_CLIENT_ID", "cid"),
        ("GOOGLE_CLIENT_SECRET", "secret"),
        ("GOOGLE_REDIRECT_URL", "http://localhost:8081/oauth/callback"),
        ("GOOGLE_SCOPES", "openid, email ,profile"),
        ("GOOGLE_AUTH_TOKEN_SOURCE_FILE", "/var/lib/gateway/token.json"),
    ])
    .unwrap();

    let google = &config.google_oauth;
    assert!(google.enabled);
    assert_eq!(google.scopes, vec!["openid", "email", "profile"]);
    assert_eq!(
        google.token_file,
        Some(PathBuf::from("/var/lib/gateway/token.json"))
    );
    assert_eq!(google.state_cookie, "oauth_state");
    assert_eq!(google.token_url, "https://oauth2.googleapis.com/token");

    let err = load(&[("GOOGLE_OAUTH_ENABLED", "true"), ("GOOGLE_CLIENT_ID", "cid")]).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigError);
}

#[test]
fn test_malformed_values_are_rejected() {
    for pairs in [
        [("API_SERVER_PORT", "eighty")],
        [("TRACING_ENABLED", "maybe")],
        [("TRACING_SAMPLING_RATE", "1.5")],
        [("MCP_RETRY_DELAY", "soon")],
    ] {
        let err = load(&pairs).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError, "{pairs:?}");
    }
}

#[test]
fn test_secrets_are_redacted_in_debug() {
    let config = load(&[("ANTHROPIC_API_KEY", "sk-ant-very-secret")]).unwrap();
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("sk-ant-very-secret"));
}

#[test]
#[serial]
fn test_from_process_environment() {
    env::set_var("API_SERVER_PORT", "18081");
    env::set_var("MCP_SERVER_URL", "http://127.0.0.1:18080/mcp");
    let config = ServerConfig::from_env();
    env::remove_var("API_SERVER_PORT");
    env::remove_var("MCP_SERVER_URL");

    let config = config.unwrap();
    assert_eq!(config.http.port, 18081);
    assert_eq!(config.mcp.server_url, "http://127.0.0.1:18080/mcp");
}
