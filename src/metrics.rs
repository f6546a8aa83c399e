// ABOUTME: Prometheus recorder installation and gateway metric helpers
// ABOUTME: Completion latency, token counts and tool usage labelled by provider and model
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::debug;

use crate::models::TokenUsage;

/// Completions finished, labelled by outcome
pub const LLM_COMPLETIONS_TOTAL: &str = "llm_completions_total";
/// Completion wall-clock duration
pub const LLM_COMPLETION_DURATION_SECONDS: &str = "llm_completion_duration_seconds";
/// Completions currently running
pub const LLM_COMPLETIONS_IN_FLIGHT: &str = "llm_completions_in_flight";
/// Prompt tokens consumed
pub const LLM_INPUT_TOKENS_TOTAL: &str = "llm_input_tokens_total";
/// Completion tokens produced
pub const LLM_OUTPUT_TOKENS_TOTAL: &str = "llm_output_tokens_total";
/// Requests that exposed tools to the model
pub const LLM_TOOLS_ENABLED_TOTAL: &str = "llm_tools_enabled_total";
/// Tool invocations requested by the model
pub const LLM_TOOL_USAGE_TOTAL: &str = "llm_tool_usage_total";
/// Provider round-trips spent inside the tool loop
pub const LLM_TOOL_LOOP_ITERATIONS_TOTAL: &str = "llm_tool_loop_iterations_total";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the process-wide Prometheus recorder and return its render handle
///
/// Repeated calls return the handle from the first installation.
pub fn install() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                debug!("Global metrics recorder already installed: {e}");
            }
            handle
        })
        .clone()
}

/// Outcome label for a finished completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Provider answered
    Success,
    /// Provider or tool failure
    Error,
    /// Deadline or client cancellation
    Cancelled,
}

impl CompletionStatus {
    /// Label value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Tracks one in-flight completion; the gauge is decremented on drop
pub struct InFlightGuard {
    provider: String,
    model: String,
}

impl InFlightGuard {
    /// Increment the in-flight gauge for `provider`/`model`
    #[must_use]
    pub fn start(provider: &str, model: &str) -> Self {
        gauge!(LLM_COMPLETIONS_IN_FLIGHT, "provider" => provider.to_owned(), "model" => model.to_owned())
            .increment(1.0);
        Self {
            provider: provider.to_owned(),
            model: model.to_owned(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(LLM_COMPLETIONS_IN_FLIGHT, "provider" => self.provider.clone(), "model" => self.model.clone())
            .decrement(1.0);
    }
}

/// Record a finished completion
pub fn record_completion(provider: &str, model: &str, status: CompletionStatus, elapsed: Duration) {
    counter!(
        LLM_COMPLETIONS_TOTAL,
        "provider" => provider.to_owned(),
        "model" => model.to_owned(),
        "status" => status.as_str()
    )
    .increment(1);
    histogram!(
        LLM_COMPLETION_DURATION_SECONDS,
        "provider" => provider.to_owned(),
        "model" => model.to_owned()
    )
    .record(elapsed.as_secs_f64());
}

/// Record token usage for one completion
pub fn record_tokens(provider: &str, model: &str, usage: TokenUsage) {
    counter!(LLM_INPUT_TOKENS_TOTAL, "provider" => provider.to_owned(), "model" => model.to_owned())
        .increment(u64::from(usage.input_tokens));
    counter!(LLM_OUTPUT_TOKENS_TOTAL, "provider" => provider.to_owned(), "model" => model.to_owned())
        .increment(u64::from(usage.output_tokens));
}

/// Record that a request exposed tools to the model
pub fn record_tools_enabled(provider: &str, model: &str) {
    counter!(LLM_TOOLS_ENABLED_TOTAL, "provider" => provider.to_owned(), "model" => model.to_owned())
        .increment(1);
}

/// Record one tool invocation
pub fn record_tool_usage(tool: &str, provider: &str, model: &str) {
    counter!(
        LLM_TOOL_USAGE_TOTAL,
        "tool" => tool.to_owned(),
        "provider" => provider.to_owned(),
        "model" => model.to_owned()
    )
    .increment(1);
}

/// Record one provider round-trip inside the tool loop
pub fn record_tool_loop_iteration(provider: &str, model: &str) {
    counter!(LLM_TOOL_LOOP_ITERATIONS_TOTAL, "provider" => provider.to_owned(), "model" => model.to_owned())
        .increment(1);
}
