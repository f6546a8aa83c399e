// ABOUTME: Shared SSE (Server-Sent Events) line-buffering parser for streaming responses
// ABOUTME: Handles partial lines across TCP boundaries and multiple events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # SSE Stream Parser
//!
//! A line-buffering parser for Server-Sent Events used by every streaming LLM
//! provider and by the MCP transport. It covers two framing problems:
//!
//! 1. **Multiple events per TCP chunk**: all events in a `bytes_stream()` chunk
//!    are emitted, not just the first.
//!
//! 2. **Partial JSON across TCP boundaries**: the buffer accumulates partial
//!    data until a complete line arrives.
//!
//! ## Usage
//!
//! Each provider supplies an [`SseChunkParser`] that turns raw `data:` payloads
//! into [`StreamChunk`] values. Framing (line buffering, `data:` prefix
//! stripping, `[DONE]` detection) is handled once here.
//!
//! ```text
//! let stream = create_sse_stream(response.bytes_stream(), AnthropicChunkParser::default(), "Anthropic");
//! ```

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{future, Stream, StreamExt};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::time::sleep;
use tracing::warn;

use super::{ChatStream, StreamChunk};
use crate::errors::{AppError, AppResult, ErrorCode};

/// A parsed SSE event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload (prefix stripped)
    Data(String),
    /// The `[DONE]` termination signal (OpenAI convention)
    Done,
}

/// Line-buffering SSE parser that handles partial lines across TCP chunk boundaries
///
/// SSE streams are newline-delimited. TCP does not guarantee alignment between
/// network chunks and SSE event boundaries, so incomplete lines are buffered
/// until their terminating `\n` arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Accumulated text not yet terminated by a newline
    buffer: String,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from a TCP chunk into the buffer, returning any complete SSE events
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any remaining buffered content as a final event
    ///
    /// Called when the byte stream ends without a trailing newline.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        parse_line(&remaining).into_iter().collect()
    }
}

/// Parse one SSE line; only `data:` fields produce events
fn parse_line(line: &str) -> Option<SseEvent> {
    let trimmed = line.trim();
    // event:, id:, retry: and ":" comments are ignored
    let data = trimmed.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim() == "[DONE]" {
        return Some(SseEvent::Done);
    }
    (!data.trim().is_empty()).then(|| SseEvent::Data(data.to_owned()))
}

/// Provider-specific conversion from SSE payloads to stream chunks
///
/// Parsers keep whatever state they need (partial tool-call arguments, usage
/// reported early in the stream) and emit it from [`SseChunkParser::finish`].
pub trait SseChunkParser: Send + 'static {
    /// Convert one `data:` payload into zero or more chunks
    fn parse(&mut self, data: &str) -> Vec<AppResult<StreamChunk>>;

    /// Called exactly once at `[DONE]` or end of stream
    ///
    /// Must return the terminal [`StreamChunk::Done`] unless one was already
    /// emitted by [`SseChunkParser::parse`].
    fn finish(&mut self) -> Vec<AppResult<StreamChunk>>;
}

/// Internal state for the SSE stream unfold
struct SseStreamState<P> {
    buffer: SseLineBuffer,
    parser: P,
    pending: VecDeque<AppResult<StreamChunk>>,
    finished: bool,
    stream_ended: bool,
}

impl<P: SseChunkParser> SseStreamState<P> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                return;
            }
            match event {
                SseEvent::Data(data) => {
                    let chunks = self.parser.parse(&data);
                    self.push_all(chunks);
                }
                SseEvent::Done => self.finish(),
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            let chunks = self.parser.finish();
            self.push_all(chunks);
            self.finished = true;
        }
    }

    fn push_all(&mut self, chunks: Vec<AppResult<StreamChunk>>) {
        for chunk in chunks {
            if matches!(chunk, Ok(StreamChunk::Done { .. })) {
                self.finished = true;
            }
            self.pending.push_back(chunk);
        }
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Create a properly-buffered SSE stream from a raw byte stream
///
/// # Arguments
///
/// * `byte_stream` - Raw bytes from `response.bytes_stream()`
/// * `parser` - Provider-specific payload parser
/// * `provider_name` - Provider name for error messages (e.g., "Anthropic")
///
/// Empty text deltas are dropped. Nothing is emitted after the terminal chunk.
pub fn create_sse_stream<S, P>(byte_stream: S, parser: P, provider_name: &'static str) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    P: SseChunkParser,
{
    let state = SseStreamState {
        buffer: SseLineBuffer::new(),
        parser,
        pending: VecDeque::new(),
        finished: false,
        stream_ended: false,
    };

    let stream = unfold(
        (Box::pin(byte_stream) as ByteStream, state),
        move |(mut byte_stream, mut state)| async move {
            loop {
                // Drain pending events first (multiple SSE events per TCP chunk)
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state)));
                }

                if state.stream_ended || state.finished {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        let events = state.buffer.feed(&bytes);
                        state.absorb(events);
                    }
                    Some(Err(e)) => {
                        state.stream_ended = true;
                        return Some((
                            Err(AppError::external_service(
                                provider_name,
                                format!("Stream read error: {e}"),
                            )),
                            (byte_stream, state),
                        ));
                    }
                    None => {
                        state.stream_ended = true;
                        let events = state.buffer.flush();
                        state.absorb(events);
                        state.finish();
                    }
                }
            }
        },
    );

    let filtered = stream.filter(|result| {
        future::ready(!matches!(result, Ok(StreamChunk::Delta(delta)) if delta.is_empty()))
    });

    Box::pin(filtered)
}

// ============================================================================
// Retry Configuration
// ============================================================================

/// Retry configuration for provider requests
///
/// Streaming retries only cover the initial HTTP request. Once bytes start
/// flowing, the stream is not retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay cap for exponential backoff (milliseconds)
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Default retry config: 3 retries, 500ms initial, 5s max
    #[must_use]
    pub const fn default_config() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }

    /// `delay = min(initial_ms * 2^attempt, max_ms) + jitter(0..100ms)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self
            .initial_delay_ms
            .saturating_mul(1_u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped_delay = base_delay.min(self.max_delay_ms);
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::from(d.subsec_millis()))
            % 100;
        Duration::from_millis(capped_delay + jitter)
    }
}

/// Check if an HTTP error status code is retryable
///
/// 429 (rate limiting), 502 and 503 are treated as transient.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503)
}

/// Check if a request error is retryable (connection/timeout errors)
#[must_use]
pub fn is_retryable_request_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Send a provider request, retrying transient failures with backoff
///
/// `build` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`.
///
/// # Errors
///
/// Returns `ExternalServiceUnavailable` when the request cannot be sent after
/// the configured retries.
pub async fn send_with_retry<F>(
    retry: &RetryConfig,
    provider_name: &'static str,
    build: F,
) -> AppResult<Response>
where
    F: Fn() -> RequestBuilder + Send,
{
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(response)
                if is_retryable_status(response.status().as_u16())
                    && attempt < retry.max_retries =>
            {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    provider = provider_name,
                    status = response.status().as_u16(),
                    attempt,
                    "Retryable provider status, retrying in {delay:?}"
                );
                sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) if is_retryable_request_error(&e) && attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(provider = provider_name, attempt, "Request failed ({e}), retrying in {delay:?}");
                sleep(delay).await;
            }
            Err(e) => {
                return Err(AppError::external_unavailable(
                    provider_name,
                    format!("Failed to connect: {e}"),
                ))
            }
        }
        attempt += 1;
    }
}

/// Map a non-success provider response to an error
///
/// `message` is the provider's own error text when the body could be parsed.
#[must_use]
pub fn provider_error(provider_name: &'static str, status: StatusCode, message: &str) -> AppError {
    match status.as_u16() {
        401 | 403 => AppError::new(
            ErrorCode::ExternalAuthFailed,
            format!("{provider_name} rejected the configured credentials: {message}"),
        ),
        429 => AppError::new(
            ErrorCode::ExternalRateLimited,
            format!("{provider_name} rate limit reached. Please wait a moment and try again."),
        ),
        _ => AppError::external_service(provider_name, format!("API error ({status}): {message}")),
    }
}

/// First 200 characters of a response body, for error messages
#[must_use]
pub fn body_preview(body: &str) -> String {
    body.chars().take(200).collect()
}
