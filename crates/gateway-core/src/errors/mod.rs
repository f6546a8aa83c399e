// ABOUTME: Unified error handling with error codes, context, and HTTP status mapping
// ABOUTME: AppError is the single error type crossing module and HTTP boundaries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Unified Error Handling System
//!
//! Every fallible operation in the gateway returns [`AppResult`]. An [`AppError`]
//! carries a stable [`ErrorCode`] that decides the HTTP status, a human-readable
//! message, optional context (request id, resource id, free-form details such as
//! the orchestration step that failed) and an optional source for chaining.

#[cfg(feature = "http-response")]
mod http;

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::constants::messages::INTERNAL_ERROR;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication (1000-1999)
    /// No credentials were presented
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired = 1000,
    /// Credentials were presented but are not acceptable
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid = 1001,
    /// Credentials have expired
    #[serde(rename = "AUTH_EXPIRED")]
    AuthExpired = 1002,

    // Validation (3000-3999)
    /// Malformed or semantically invalid input
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,
    /// A required field is missing
    #[serde(rename = "MISSING_REQUIRED_FIELD")]
    MissingRequiredField = 3001,
    /// The value has the wrong shape (e.g. not a UUID)
    #[serde(rename = "INVALID_FORMAT")]
    InvalidFormat = 3002,
    /// Provider tag or model id is not in the catalog
    #[serde(rename = "UNSUPPORTED_PROVIDER")]
    UnsupportedProvider = 3003,
    /// OAuth state query does not match the state cookie
    #[serde(rename = "STATE_MISMATCH")]
    StateMismatch = 3004,
    /// OAuth callback carries no authorization code
    #[serde(rename = "MISSING_CODE")]
    MissingCode = 3005,

    // Resources (4000-4999)
    /// The requested resource does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 4000,
    /// The tool server does not advertise the requested tool
    #[serde(rename = "UNKNOWN_TOOL")]
    UnknownTool = 4001,
    /// No OAuth token has been stored yet
    #[serde(rename = "NO_TOKEN_AVAILABLE")]
    NoTokenAvailable = 4002,

    // External services (5000-5999)
    /// An upstream (LLM or MCP) call failed
    #[serde(rename = "EXTERNAL_SERVICE_ERROR")]
    ExternalServiceError = 5000,
    /// An upstream is unreachable
    #[serde(rename = "EXTERNAL_SERVICE_UNAVAILABLE")]
    ExternalServiceUnavailable = 5001,
    /// Token exchange with a third-party OAuth provider failed
    #[serde(rename = "EXTERNAL_AUTH_FAILED")]
    ExternalAuthFailed = 5002,
    /// Upstream rate limit
    #[serde(rename = "EXTERNAL_RATE_LIMITED")]
    ExternalRateLimited = 5003,
    /// Prompt template could not be fetched or rendered
    #[serde(rename = "TEMPLATE_ERROR")]
    TemplateError = 5004,
    /// A tool call failed on the tool server
    #[serde(rename = "TOOL_INVOCATION_FAILED")]
    ToolInvocationFailed = 5005,
    /// The per-request deadline expired
    #[serde(rename = "REQUEST_TIMEOUT")]
    RequestTimeout = 5006,
    /// The request was cancelled by the client or by shutdown
    #[serde(rename = "REQUEST_CANCELLED")]
    RequestCancelled = 5007,

    // Configuration (6000-6999)
    /// Configuration is present but invalid
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError = 6000,
    /// A required credential or setting is missing
    #[serde(rename = "CONFIG_MISSING")]
    ConfigMissing = 6001,

    // Internal (9000-9999)
    /// Unexpected condition
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    /// Conversation or token storage failed
    #[serde(rename = "STORAGE_ERROR")]
    StorageError = 9002,
    /// Data serialization/deserialization failed
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9003,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidInput
            | Self::MissingRequiredField
            | Self::InvalidFormat
            | Self::UnsupportedProvider
            | Self::StateMismatch
            | Self::MissingCode => 400,

            // 401 Unauthorized
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired | Self::NoTokenAvailable => {
                401
            }

            // 404 Not Found
            Self::ResourceNotFound | Self::UnknownTool => 404,

            // 429 Too Many Requests
            Self::ExternalRateLimited => 429,

            // Client closed request
            Self::RequestCancelled => 499,

            // 502 Bad Gateway
            Self::ExternalServiceError
            | Self::ExternalServiceUnavailable
            | Self::TemplateError
            | Self::ToolInvocationFailed => 502,

            // 504 Gateway Timeout
            Self::RequestTimeout => 504,

            // 500 Internal Server Error
            Self::ExternalAuthFailed
            | Self::ConfigError
            | Self::ConfigMissing
            | Self::InternalError
            | Self::StorageError
            | Self::SerializationError => 500,
        }
    }

    /// Whether the message must be hidden from clients and replaced by a generic body
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::ConfigError
                | Self::ConfigMissing
                | Self::InternalError
                | Self::StorageError
                | Self::SerializationError
        )
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::InvalidFormat => "The data format is invalid",
            Self::UnsupportedProvider => "The LLM provider or model is not supported",
            Self::StateMismatch => "The OAuth state parameter is invalid",
            Self::MissingCode => "The OAuth authorization code is missing",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::UnknownTool => "The requested tool is not available",
            Self::NoTokenAvailable => "No OAuth token is available",
            Self::ExternalServiceError => "An external service encountered an error",
            Self::ExternalServiceUnavailable => "An external service is currently unavailable",
            Self::ExternalAuthFailed => "Authentication with external service failed",
            Self::ExternalRateLimited => "External service rate limit exceeded",
            Self::TemplateError => "The prompt template could not be rendered",
            Self::ToolInvocationFailed => "The tool invocation failed",
            Self::RequestTimeout => "The request deadline expired",
            Self::RequestCancelled => "The request was cancelled",
            Self::ConfigError => "Configuration error encountered",
            Self::ConfigMissing => "Required configuration is missing",
            Self::InternalError => "An internal server error occurred",
            Self::StorageError => "Storage operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// Resource ID if applicable
    pub resource_id: Option<String>,
    /// Additional key-value context
    pub details: Value,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            request_id: None,
            resource_id: None,
            details: Value::Object(Map::new()),
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add a request ID to the error context
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context.request_id = Some(request_id.into());
        self
    }

    /// Add a resource ID to the error context
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.context.resource_id = Some(resource_id.into());
        self
    }

    /// Replace the details in the error context
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.context.details = details;
        self
    }

    /// Record which processing step produced the error
    #[must_use]
    pub fn with_step(mut self, step: &str) -> Self {
        if let Value::Object(map) = &mut self.context.details {
            map.insert("step".to_owned(), Value::String(step.to_owned()));
        } else {
            self.context.details = json!({ "step": step });
        }
        self
    }

    /// Processing step recorded by [`Self::with_step`], if any
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.context.details.get("step").and_then(Value::as_str)
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Message safe to show to a client
    #[must_use]
    pub fn client_message(&self) -> &str {
        if self.code.is_internal() {
            INTERNAL_ERROR
        } else {
            &self.message
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response body: `{"error": "<message>"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Client-visible message
    pub error: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: error.client_message().to_owned(),
        }
    }
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl AppError {
    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Unauthorized")
    }

    /// Invalid authentication
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Authentication expired
    #[must_use]
    pub fn auth_expired() -> Self {
        Self::new(ErrorCode::AuthExpired, "Authentication token has expired")
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Invalid format (e.g. unparsable identifier)
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFormat, message)
    }

    /// Provider tag or model not in the catalog
    pub fn unsupported_provider(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedProvider, message)
    }

    /// A credential required to build a provider is missing
    pub fn missing_credential(variable: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissing,
            format!("{} is required", variable.into()),
        )
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Storage backend error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// External service error
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{}: {}", service.into(), message.into()),
        )
    }

    /// External service unreachable
    pub fn external_unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceUnavailable,
            format!("{}: {}", service.into(), message.into()),
        )
    }

    /// Prompt template failure
    pub fn template(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TemplateError, message)
    }

    /// Tool not advertised by the tool server
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UnknownTool,
            format!("unknown tool: {}", name.into()),
        )
    }

    /// Tool call failed
    pub fn tool_invocation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolInvocationFailed, message)
    }

    /// Request deadline expired
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ErrorCode::RequestTimeout, "request deadline exceeded")
    }

    /// Request cancelled
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::RequestCancelled, "request cancelled")
    }
}

/// Conversion from `anyhow::Error` to `AppError`
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.source() {
            Some(source) => Self::new(ErrorCode::InternalError, error.to_string())
                .with_details(json!({ "source": source.to_string() })),
            None => Self::new(ErrorCode::InternalError, error.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string())
    }
}
