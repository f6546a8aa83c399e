// ABOUTME: Server-sent event responder for streaming turns
// ABOUTME: Maps turn events to message, done and error events with keep-alive headers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::convert::Infallible;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::HeaderName;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::orchestrator::TurnEvent;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// SSE event for one turn event
#[must_use]
pub fn sse_event(event: &TurnEvent) -> Event {
    match event {
        TurnEvent::Delta(text) => Event::default()
            .event("message")
            .data(json!({ "delta": text }).to_string()),
        TurnEvent::Done { chat_id, usage } => Event::default().event("done").data(
            json!({
                "chat_uuid": chat_id,
                "input_token": usage.input_tokens,
                "output_token": usage.output_tokens,
            })
            .to_string(),
        ),
        TurnEvent::Error(message) => Event::default()
            .event("error")
            .data(json!({ "error": message }).to_string()),
    }
}

/// Stream `events` to the client as `text/event-stream`
///
/// The response owns `cancel`: when the client disconnects the body is
/// dropped, the token is cancelled and in-flight provider and tool calls
/// abort. Nothing is emitted after a `done` or `error` event.
pub fn sse_response<S>(events: S, cancel: CancellationToken) -> Response
where
    S: Stream<Item = TurnEvent> + Send + 'static,
{
    let body = stream! {
        let _guard = cancel.drop_guard();
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            let terminal = !matches!(event, TurnEvent::Delta(_));
            yield Ok::<_, Infallible>(sse_event(&event));
            if terminal {
                break;
            }
        }
        debug!("Event stream finished");
    };

    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(body).keep_alive(KeepAlive::default()),
    )
        .into_response()
}
