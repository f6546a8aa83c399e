// ABOUTME: Long-lived MCP client over the streamable HTTP transport
// ABOUTME: Session handshake, JSON or SSE replies, reconnect with backoff and health pings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # MCP Connection
//!
//! Every call is a JSON-RPC POST to the server URL. The server may answer with
//! `application/json` or with a `text/event-stream` carrying the response as
//! one of its `data:` events. The session id minted by `initialize` travels in
//! the `mcp-session-id` header.
//!
//! A `404` on a known session, or a request that never reached the server,
//! drops the session and re-establishes it under the [`ReconnectPolicy`]; the
//! call is then sent once more on the new session. Any other failure is
//! returned as is, so a `tools/call` the server may have run is never sent
//! twice. One caller at a time performs the handshake; others find no session
//! and fail fast. A background task pings the server every
//! `health_check_interval` and reconnects when the ping fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::protocol::{
    initialize_params, methods, CallToolResult, GetPromptResult, InitializeResult,
    ListPromptsResult, ListToolsResult, PromptInfo, ToolInfo,
};
use super::reconnect::ReconnectPolicy;
use super::McpClient;
use crate::config::McpClientConfig;
use crate::constants::headers::{MCP_PROTOCOL_VERSION, MCP_SESSION_ID};
use crate::constants::service::MCP_PROTOCOL_VERSION as DEFAULT_PROTOCOL_VERSION;
use crate::errors::{AppError, AppResult};
use crate::jsonrpc::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::llm::sse_parser::{SseEvent, SseLineBuffer};

const SERVICE: &str = "MCP";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

#[derive(Debug, Clone)]
struct Session {
    id: Option<String>,
    protocol_version: String,
}

/// Why a single POST failed
#[derive(Debug)]
enum CallError {
    /// The connection could not be opened; the server never saw the request
    Unreachable(AppError),
    /// Failure after the request was sent, or an unusable reply
    Transport(AppError),
    /// The server no longer recognizes the session id
    SessionExpired,
    /// The server answered with a JSON-RPC error
    Rpc(JsonRpcError),
}

impl CallError {
    fn into_app_error(self, method: &str) -> AppError {
        match self {
            Self::Unreachable(e) | Self::Transport(e) => e,
            Self::SessionExpired => {
                AppError::external_unavailable(SERVICE, format!("session expired during {method}"))
            }
            Self::Rpc(e) => AppError::external_service(SERVICE, format!("{method}: {e}")),
        }
    }

    /// Whether sending the same request again cannot repeat its effect
    const fn may_resend(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::Unreachable(_))
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("text/event-stream"))
}

fn transport(message: impl Into<String>) -> CallError {
    CallError::Transport(AppError::external_unavailable(SERVICE, message))
}

fn send_failed(method: &str, error: &reqwest::Error) -> CallError {
    let failure = AppError::external_unavailable(SERVICE, format!("{method} failed: {error}"));
    if error.is_connect() {
        CallError::Unreachable(failure)
    } else {
        CallError::Transport(failure)
    }
}

fn closed() -> AppError {
    AppError::external_unavailable(SERVICE, "connection is closed")
}

/// Shared, internally reconnecting MCP client
pub struct McpConnection {
    config: McpClientConfig,
    client: Client,
    policy: ReconnectPolicy,
    session: RwLock<Option<Session>>,
    connecting: Mutex<()>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl McpConnection {
    /// Connect to the server, retrying under the configured backoff, and
    /// start the health-check task
    ///
    /// # Errors
    ///
    /// Returns `ExternalServiceUnavailable` if no session could be
    /// established within the retry budget.
    pub async fn connect(config: McpClientConfig) -> AppResult<Arc<Self>> {
        let connection = Arc::new(Self::new(config)?);
        connection.reconnect().await?;
        connection.spawn_health_check().await;
        Ok(connection)
    }

    /// Build a connection without contacting the server
    ///
    /// The session is established lazily on the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: McpClientConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create MCP HTTP client: {e}")))?;

        Ok(Self {
            policy: ReconnectPolicy::from_config(&config),
            config,
            client,
            session: RwLock::new(None),
            connecting: Mutex::new(()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            health_task: Mutex::new(None),
        })
    }

    /// Server URL this connection talks to
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// Whether a session is currently established
    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Stop health checks and end the server-side session
    pub async fn disconnect(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
        }

        let session = self.session.write().await.take();
        if let Some(session) = session {
            self.close(&session).await;
        }
        info!(url = %self.config.server_url, "Disconnected from MCP server");
    }

    /// End `session` on the server
    async fn close(&self, session: &Session) {
        let Some(session_id) = &session.id else {
            return;
        };
        match self
            .client
            .delete(&self.config.server_url)
            .header(MCP_SESSION_ID, session_id)
            .header(MCP_PROTOCOL_VERSION, &session.protocol_version)
            .send()
            .await
        {
            Ok(response) => debug!(status = %response.status(), "MCP session closed"),
            Err(e) => warn!("Failed to close MCP session: {e}"),
        }
    }

    // ========================================================================
    // Session management
    // ========================================================================

    /// Establish a session unless one exists
    ///
    /// The session lock is only taken to install the result, so readers are
    /// never held up by backoff sleeps or a slow handshake.
    async fn reconnect(&self) -> AppResult<Session> {
        if self.shutdown.is_cancelled() {
            return Err(closed());
        }
        let Ok(_handshaking) = self.connecting.try_lock() else {
            debug!("MCP handshake already in progress");
            return Err(AppError::external_unavailable(
                SERVICE,
                "session is being re-established",
            ));
        };
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        let session = self
            .policy
            .run(&self.config.server_url, || self.handshake())
            .await?;

        let mut guard = self.session.write().await;
        if self.shutdown.is_cancelled() {
            drop(guard);
            self.close(&session).await;
            return Err(closed());
        }
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn handshake(&self) -> AppResult<Session> {
        let request = JsonRpcRequest::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            methods::INITIALIZE,
            Some(initialize_params()),
        );
        let provisional = Session {
            id: None,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_owned(),
        };

        let (session_id, reply) = self
            .post(&provisional, &request)
            .await
            .map_err(|e| e.into_app_error(methods::INITIALIZE))?;
        let value = reply
            .ok_or_else(|| AppError::external_service(SERVICE, "empty initialize reply"))?
            .into_result()
            .map_err(|e| CallError::Rpc(e).into_app_error(methods::INITIALIZE))?;
        let init: InitializeResult = serde_json::from_value(value)
            .map_err(|e| AppError::external_service(SERVICE, format!("bad initialize reply: {e}")))?;

        let session = Session {
            id: session_id,
            protocol_version: if init.protocol_version.trim().is_empty() {
                DEFAULT_PROTOCOL_VERSION.to_owned()
            } else {
                init.protocol_version
            },
        };

        let notification = JsonRpcRequest::notification(methods::INITIALIZED, None);
        self.post(&session, &notification)
            .await
            .map_err(|e| e.into_app_error(methods::INITIALIZED))?;

        info!(
            url = %self.config.server_url,
            session = session.id.as_deref().unwrap_or("-"),
            protocol = %session.protocol_version,
            server = init.server_info.as_ref().map_or("-", |s| s.name.as_str()),
            "Connected to MCP server"
        );
        Ok(session)
    }

    async fn invalidate(&self, failed: &Session) {
        let mut guard = self.session.write().await;
        if guard.as_ref().is_some_and(|current| current.id == failed.id) {
            *guard = None;
        }
    }

    async fn current_session(&self) -> AppResult<Session> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }
        self.reconnect().await
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn post(
        &self,
        session: &Session,
        request: &JsonRpcRequest,
    ) -> Result<(Option<String>, Option<JsonRpcResponse>), CallError> {
        let mut builder = self
            .client
            .post(&self.config.server_url)
            .header(ACCEPT, ACCEPT_BOTH)
            .header(MCP_PROTOCOL_VERSION, &session.protocol_version)
            .json(request);
        if let Some(id) = &session.id {
            builder = builder.header(MCP_SESSION_ID, id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| send_failed(&request.method, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && session.id.is_some() {
            return Err(CallError::SessionExpired);
        }
        if !status.is_success() {
            return Err(transport(format!("{} returned HTTP {status}", request.method)));
        }

        let session_id = response
            .headers()
            .get(MCP_SESSION_ID)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or_else(|| session.id.clone());

        if request.is_notification() || status == StatusCode::ACCEPTED {
            return Ok((session_id, None));
        }

        let reply = if is_event_stream(&response) {
            Self::read_event_stream(response, request).await?
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| transport(format!("failed to read reply: {e}")))?;
            serde_json::from_slice::<JsonRpcResponse>(&body)
                .map_err(|e| transport(format!("malformed JSON-RPC reply: {e}")))?
        };

        if !reply.matches(request) {
            return Err(transport(format!("reply id mismatch for {}", request.method)));
        }
        Ok((session_id, Some(reply)))
    }

    /// Read SSE events until the one answering `request` arrives
    ///
    /// Server-initiated requests and notifications on the stream are skipped.
    async fn read_event_stream(
        response: Response,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, CallError> {
        let mut stream = response.bytes_stream();
        let mut buffer = SseLineBuffer::new();

        let answers = |events: Vec<SseEvent>| {
            events.into_iter().find_map(|event| match event {
                SseEvent::Data(payload) => serde_json::from_str::<JsonRpcResponse>(&payload)
                    .ok()
                    .filter(|reply| {
                        (reply.result.is_some() || reply.error.is_some()) && reply.matches(request)
                    }),
                SseEvent::Done => None,
            })
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport(format!("event stream failed: {e}")))?;
            if let Some(reply) = answers(buffer.feed(&chunk)) {
                return Ok(reply);
            }
        }
        answers(buffer.flush())
            .ok_or_else(|| transport(format!("event stream ended without a reply to {}", request.method)))
    }

    /// Send a request, re-establishing the session once if it was lost
    ///
    /// The request is sent again only when the first attempt cannot have
    /// reached the server or the server rejected the session outright.
    #[instrument(skip(self, params), fields(mcp.method = %method))]
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CallError> {
        let mut retried = false;
        loop {
            let session = self.current_session().await.map_err(CallError::Unreachable)?;
            let request = JsonRpcRequest::new(
                self.next_id.fetch_add(1, Ordering::Relaxed),
                method,
                params.clone(),
            );

            match self.post(&session, &request).await {
                Ok((_, Some(reply))) => return reply.into_result().map_err(CallError::Rpc),
                Ok((_, None)) => {
                    return Err(transport(format!("{method} returned no body")));
                }
                Err(e) if retried || !e.may_resend() => return Err(e),
                Err(e) => {
                    warn!(method, "MCP session lost, re-establishing: {e:?}");
                    self.invalidate(&session).await;
                    retried = true;
                }
            }
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> AppResult<T> {
        let value = self
            .call(method, params)
            .await
            .map_err(|e| e.into_app_error(method))?;
        serde_json::from_value(value).map_err(|e| {
            AppError::external_service(SERVICE, format!("malformed {method} result: {e}"))
        })
    }

    // ========================================================================
    // Health checks
    // ========================================================================

    async fn spawn_health_check(self: &Arc<Self>) {
        let period = self.config.health_check_interval;
        if period.is_zero() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(connection) = weak.upgrade() else { break };
                        connection.check_health().await;
                    }
                }
            }
            debug!("MCP health check stopped");
        });

        *self.health_task.lock().await = Some(handle);
    }

    async fn check_health(&self) {
        if let Err(e) = self.ping().await {
            warn!(url = %self.config.server_url, "MCP health check failed: {e}");
            if let Some(session) = self.session.read().await.clone() {
                self.invalidate(&session).await;
            }
            if let Err(e) = self.reconnect().await {
                warn!("MCP reconnect after failed health check did not succeed: {e}");
            }
        }
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn is_unknown_tool(error: &JsonRpcError) -> bool {
    let message = error.message.to_lowercase();
    matches!(
        error.code,
        error_codes::INVALID_PARAMS | error_codes::METHOD_NOT_FOUND
    ) && (message.contains("not found") || message.contains("unknown tool"))
}

#[async_trait]
impl McpClient for McpConnection {
    async fn list_tools(&self) -> AppResult<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.call_as(methods::TOOLS_LIST, params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<CallToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        match self.call(methods::TOOLS_CALL, Some(params)).await {
            Ok(value) => serde_json::from_value(value).map_err(|e| {
                AppError::tool_invocation(format!("malformed result from {name}: {e}"))
            }),
            Err(CallError::Rpc(e)) if is_unknown_tool(&e) => Err(AppError::unknown_tool(name)),
            Err(CallError::Rpc(e)) => Err(AppError::tool_invocation(e.message)),
            Err(CallError::Transport(e)) => {
                Err(AppError::tool_invocation(format!("{name}: {}", e.message)))
            }
            Err(e) => Err(e.into_app_error(methods::TOOLS_CALL)),
        }
    }

    async fn list_prompts(&self) -> AppResult<Vec<PromptInfo>> {
        let mut prompts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListPromptsResult = self.call_as(methods::PROMPTS_LIST, params).await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(prompts)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> AppResult<GetPromptResult> {
        self.call_as(
            methods::PROMPTS_GET,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn ping(&self) -> AppResult<()> {
        self.call(methods::PING, None)
            .await
            .map(|_| ())
            .map_err(|e| e.into_app_error(methods::PING))
    }
}
