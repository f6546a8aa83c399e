// ABOUTME: Tool-use loop between an LLM provider and the tool catalog
// ABOUTME: Blocking and streaming variants share one iteration budget and persistence path
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::future::Future;
use std::sync::Arc;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::TurnEvent;
use crate::constants::messages::TOOL_LOOP_TRUNCATED;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::llm::{ChatRequest, ChatStream, Completion, LlmProvider, StreamChunk};
use crate::metrics::{self, CompletionStatus, InFlightGuard};
use crate::middleware::create_mcp_span;
use crate::models::{Message, TokenUsage, ToolCall, ToolResult};
use crate::storage::ConversationStore;
use crate::tools::ToolCatalog;

/// Await `future` unless the turn is cancelled or its deadline passes first
///
/// # Errors
///
/// `RequestCancelled` on cancellation, `RequestTimeout` at the deadline, or
/// the future's own error.
pub async fn guarded<T>(
    cancel: &CancellationToken,
    deadline: Instant,
    future: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AppError::cancelled()),
        () = sleep_until(deadline) => Err(AppError::timeout()),
        result = future => result,
    }
}

/// Final state of a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Answer text, with the truncation notice when the budget ran out
    pub text: String,
    /// Token counts summed over every provider call of the turn
    pub usage: TokenUsage,
    /// Tool rounds executed
    pub iterations: usize,
    /// Whether the budget ran out while the model still wanted tools
    pub truncated: bool,
}

fn truncated_text(text: &str) -> String {
    if text.is_empty() {
        TOOL_LOOP_TRUNCATED.to_owned()
    } else {
        format!("{text}\n\n{TOOL_LOOP_TRUNCATED}")
    }
}

/// Event closing a failed streaming turn; cancellation closes it silently
pub(super) fn failure_event(chat_id: Uuid, e: &AppError) -> Option<TurnEvent> {
    if e.code == ErrorCode::RequestCancelled {
        info!(chat_id = %chat_id, "Streaming turn cancelled");
        return None;
    }
    error!(
        chat_id = %chat_id,
        step = e.step().unwrap_or("stream"),
        error = %e,
        "Streaming turn failed"
    );
    Some(TurnEvent::Error(e.client_message().to_owned()))
}

/// Drives one turn against a provider, re-entering the catalog for tool calls
pub struct ToolLoop {
    provider: Arc<dyn LlmProvider>,
    catalog: Arc<dyn ToolCatalog>,
    store: Arc<dyn ConversationStore>,
    chat_id: Uuid,
    budget: usize,
    provider_label: String,
    model: String,
}

impl ToolLoop {
    /// Loop for conversation `chat_id`
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        catalog: Arc<dyn ToolCatalog>,
        store: Arc<dyn ConversationStore>,
        chat_id: Uuid,
        budget: usize,
    ) -> Self {
        let provider_label = provider.name().to_owned();
        let model = provider.model().to_owned();
        Self {
            provider,
            catalog,
            store,
            chat_id,
            budget,
            provider_label,
            model,
        }
    }

    /// Conversation the loop records into
    #[must_use]
    pub const fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    async fn complete(&self, request: &ChatRequest) -> AppResult<Completion> {
        let _in_flight = InFlightGuard::start(&self.provider_label, &self.model);
        let started = Instant::now();
        let result = self.provider.generate(request).await;
        let status = match &result {
            Ok(completion) => {
                metrics::record_tokens(&self.provider_label, &self.model, completion.usage);
                CompletionStatus::Success
            }
            Err(_) => CompletionStatus::Error,
        };
        metrics::record_completion(&self.provider_label, &self.model, status, started.elapsed());
        result.map_err(|e| e.with_step("provider_invoke"))
    }

    async fn record(&self, message: Message) -> AppResult<()> {
        self.store
            .append(self.chat_id, message)
            .await
            .map_err(|e| e.with_step("record_turn"))
    }

    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let span = create_mcp_span("tools/call");
        span.record("tool_name", call.name.as_str());
        let started = Instant::now();
        let outcome = self
            .catalog
            .invoke(&call.name, call.arguments.clone())
            .instrument(span.clone())
            .await;
        span.record("duration_ms", started.elapsed().as_millis() as u64);
        span.record("success", outcome.is_ok());
        metrics::record_tool_usage(&call.name, &self.provider_label, &self.model);

        match outcome {
            Ok(output) => ToolResult {
                call_id: call.id.clone(),
                content: output.content,
                is_error: output.is_error,
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed; reporting to model");
                ToolResult {
                    call_id: call.id.clone(),
                    content: e.client_message().to_owned(),
                    is_error: true,
                }
            }
        }
    }

    /// Satisfy `calls`, extending both the request and the stored conversation
    async fn run_tools(
        &self,
        request: &mut ChatRequest,
        text: String,
        calls: Vec<ToolCall>,
    ) -> AppResult<()> {
        info!(count = calls.len(), "Executing tool calls");
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            results.push(self.invoke(call).await);
        }

        let assistant = Message::assistant(text).with_tool_calls(calls);
        request.messages.push(assistant.clone());
        self.record(assistant).await?;

        let tool_message = Message::tool_results(results);
        request.messages.push(tool_message.clone());
        self.record(tool_message).await?;

        metrics::record_tool_loop_iteration(&self.provider_label, &self.model);
        Ok(())
    }

    fn wants_tools(request: &ChatRequest, calls: &[ToolCall]) -> bool {
        !calls.is_empty() && !request.tools.is_empty()
    }

    /// Record the final assistant message with aggregate counts
    ///
    /// # Errors
    ///
    /// Returns the storage error if the message cannot be appended.
    pub async fn finish(&self, outcome: &TurnOutcome) -> AppResult<()> {
        self.record(Message::assistant(outcome.text.clone()).with_usage(outcome.usage))
            .await
    }

    /// Run the turn to completion with blocking provider calls
    ///
    /// # Errors
    ///
    /// Returns the first provider or storage failure; tool failures are
    /// handed back to the model instead.
    pub async fn run(&self, mut request: ChatRequest) -> AppResult<TurnOutcome> {
        let mut usage = TokenUsage::default();
        let mut iterations = 0;

        loop {
            let completion = self.complete(&request).await?;
            usage = usage.saturating_add(completion.usage);

            if !Self::wants_tools(&request, &completion.tool_calls) {
                return Ok(TurnOutcome {
                    text: completion.text,
                    usage,
                    iterations,
                    truncated: false,
                });
            }
            if iterations >= self.budget {
                warn!(budget = self.budget, "Tool-use budget exhausted");
                return Ok(TurnOutcome {
                    text: truncated_text(&completion.text),
                    usage,
                    iterations,
                    truncated: true,
                });
            }

            iterations += 1;
            debug!(iteration = iterations, "Tool-use iteration");
            self.run_tools(&mut request, completion.text, completion.tool_calls)
                .await?;
        }
    }

    async fn open_stream(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        self.provider
            .stream(request)
            .await
            .map_err(|e| e.with_step("provider_invoke"))
    }

    /// Run the turn as a stream of events
    ///
    /// Text deltas are yielded as they arrive. The stream ends with exactly one
    /// [`TurnEvent::Done`] after the assistant turn is recorded, with one
    /// [`TurnEvent::Error`] on failure, or with nothing further once `cancel`
    /// fires. Dropping the stream aborts the in-flight provider call.
    pub fn stream(
        self,
        mut request: ChatRequest,
        cancel: CancellationToken,
        deadline: Instant,
    ) -> impl Stream<Item = TurnEvent> + Send + 'static {
        stream! {
            let mut usage = TokenUsage::default();
            let mut iterations = 0;

            let outcome = loop {
                let mut chunks = match guarded(&cancel, deadline, self.open_stream(&request)).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        if let Some(event) = failure_event(self.chat_id, &e) {
                            yield event;
                        }
                        return;
                    }
                };

                let in_flight = InFlightGuard::start(&self.provider_label, &self.model);
                let started = Instant::now();
                let mut text = String::new();
                let mut calls = Vec::new();
                let mut failure = None;

                loop {
                    let next = guarded(&cancel, deadline, async { Ok(chunks.next().await) }).await;
                    match next {
                        Ok(None) => break,
                        Ok(Some(Ok(StreamChunk::Delta(delta)))) => {
                            text.push_str(&delta);
                            yield TurnEvent::Delta(delta);
                        }
                        Ok(Some(Ok(StreamChunk::ToolCall(call)))) => calls.push(call),
                        Ok(Some(Ok(StreamChunk::Done { usage: chunk_usage, .. }))) => {
                            metrics::record_tokens(&self.provider_label, &self.model, chunk_usage);
                            usage = usage.saturating_add(chunk_usage);
                        }
                        Ok(Some(Err(e))) | Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                drop(chunks);
                drop(in_flight);

                let status = match &failure {
                    None => CompletionStatus::Success,
                    Some(e) if e.code == ErrorCode::RequestCancelled => CompletionStatus::Cancelled,
                    Some(_) => CompletionStatus::Error,
                };
                metrics::record_completion(&self.provider_label, &self.model, status, started.elapsed());

                if let Some(e) = failure {
                    if let Some(event) = failure_event(self.chat_id, &e.with_step("provider_invoke")) {
                        yield event;
                    }
                    return;
                }

                if !Self::wants_tools(&request, &calls) {
                    break TurnOutcome { text, usage, iterations, truncated: false };
                }
                if iterations >= self.budget {
                    warn!(budget = self.budget, "Tool-use budget exhausted");
                    let full = truncated_text(&text);
                    yield TurnEvent::Delta(full[text.len()..].to_owned());
                    break TurnOutcome { text: full, usage, iterations, truncated: true };
                }

                iterations += 1;
                if let Err(e) = guarded(&cancel, deadline, self.run_tools(&mut request, text, calls)).await {
                    if let Some(event) = failure_event(self.chat_id, &e) {
                        yield event;
                    }
                    return;
                }
            };

            if let Err(e) = self.finish(&outcome).await {
                if let Some(event) = failure_event(self.chat_id, &e) {
                    yield event;
                }
                return;
            }
            yield TurnEvent::Done {
                chat_id: self.chat_id,
                usage: outcome.usage,
            };
        }
    }
}
