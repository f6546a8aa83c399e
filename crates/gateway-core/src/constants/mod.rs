// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Default limits, timeouts, template names and header names for the gateway
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Constants grouped by domain.

/// Network ports and addresses
pub mod ports {
    /// Default HTTP port of the gateway API
    pub const DEFAULT_API_PORT: u16 = 8081;
    /// Default port of the MCP tool server
    pub const DEFAULT_MCP_PORT: u16 = 8080;
    /// Default bind host
    pub const DEFAULT_HOST: &str = "0.0.0.0";
}

/// Timeouts and deadlines (seconds)
pub mod timeouts {
    /// Per-request deadline for an orchestrated turn
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
    /// Connection establishment deadline for MCP
    pub const CONNECT_TIMEOUT_SECS: u64 = 60;
    /// Per-request deadline on the MCP connection
    pub const MCP_REQUEST_TIMEOUT_SECS: u64 = 60;
    /// Graceful shutdown deadline
    pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
    /// Interval between MCP health checks
    pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
    /// Base delay between MCP reconnect attempts
    pub const MCP_RETRY_DELAY_SECS: u64 = 5;
    /// Lifetime of cached JWKS signing keys
    pub const JWKS_CACHE_SECS: u64 = 300;
    /// Minimum spacing between JWKS refetches triggered by an unknown key id
    pub const JWKS_REFETCH_COOLDOWN_SECS: u64 = 30;
    /// Accepted clock skew when validating bearer tokens
    pub const JWT_LEEWAY_SECS: u64 = 60;
    /// Lifetime of the cached MCP tool list
    pub const TOOL_CACHE_TTL_SECS: u64 = 30;
}

/// Limits on orchestrated turns
pub mod limits {
    /// Maximum provider round-trips inside one tool-use loop
    pub const MAX_TOOL_ITERATIONS: usize = 8;
    /// Maximum number of non-system history messages sent to a provider
    pub const MAX_CHAT_HISTORY_MESSAGES: usize = 20;
    /// Default MCP reconnect attempts
    pub const MCP_MAX_RETRIES: u32 = 3;
    /// Size of the random OAuth state in bytes
    pub const OAUTH_STATE_BYTES: usize = 32;
    /// Largest accepted request body
    pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
}

/// Generation defaults applied before request overrides
pub mod generation {
    /// Default `max_tokens`
    pub const DEFAULT_MAX_TOKENS: u32 = 1000;
    /// Default temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.5;
}

/// Names of prompt templates published by the MCP server
pub mod templates {
    /// Template used when tools are exposed to the model
    pub const LLM_WITH_TOOLS: &str = "llm_with_tools";
    /// Template used for plain completions
    pub const LLM_GENERAL: &str = "llm_general";
    /// Argument carrying the user's question
    pub const QUESTION_ARGUMENT: &str = "question";
}

/// Message text for notable conditions
pub mod messages {
    /// Appended to the final answer when the tool-use loop hits its budget
    pub const TOOL_LOOP_TRUNCATED: &str =
        "[truncated: tool-use iteration limit reached before a final answer]";
    /// Generic body for internal errors
    pub const INTERNAL_ERROR: &str = "Internal server error";
}

/// HTTP header names
pub mod headers {
    /// Request correlation header
    pub const REQUEST_ID: &str = "x-request-id";
    /// MCP streamable HTTP session header
    pub const MCP_SESSION_ID: &str = "mcp-session-id";
    /// MCP protocol version header
    pub const MCP_PROTOCOL_VERSION: &str = "mcp-protocol-version";
}

/// Service identity
pub mod service {
    /// Default service name
    pub const SERVICE_NAME: &str = "tool-gateway";
    /// MCP protocol revision spoken by the client
    pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
}
