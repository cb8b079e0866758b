// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent-events surface of the event bus.
//!
//! Each observer gets a `retry:` frame, then every retained event newer
//! than its `Last-Event-ID`, then live events. Frame ids are bus sequence
//! numbers, so a reconnecting browser resumes exactly where it stopped.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use sb_adapters::SessionAdapter;
use sb_core::{BusEvent, Clock, SequencedEvent};
use serde::Deserialize;
use serde_json::json;

use crate::event_bus::{BusDelivery, Gap};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventsQuery {
    token: Option<String>,
    last_event_id: Option<u64>,
}

pub(crate) fn event_frame(event: &SequencedEvent) -> Event {
    Event::default()
        .id(event.seq.to_string())
        .event(event.event.wire_name())
        .data(event.wire_payload().to_string())
}

pub(crate) fn gap_frame(gap: Gap) -> Event {
    Event::default()
        .id(gap.to.to_string())
        .event("gap")
        .data(json!({ "from": gap.from, "to": gap.to }).to_string())
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// `GET /events`
pub(crate) async fn stream_events<S: SessionAdapter, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if !state.secret.allows(&headers, query.token.as_deref()) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Without a resume point the observer starts with live events only
    let after = last_event_id(&headers)
        .or(query.last_event_id)
        .unwrap_or_else(|| state.bus.last_seq());
    let (replay, rx) = state.bus.subscribe_from(after);
    tracing::debug!(
        after,
        replayed = replay.events.len(),
        gap = ?replay.gap,
        "event stream opened"
    );

    let mut head = vec![Event::default().retry(state.settings.sse_retry())];
    head.extend(replay.gap.map(gap_frame));
    head.extend(replay.events.iter().map(event_frame));

    let live = stream::unfold(rx, |mut rx| async move {
        let frame = match rx.recv().await? {
            BusDelivery::Event(event) => event_frame(&event),
            BusDelivery::Gap(gap) => gap_frame(gap),
        };
        Some((frame, rx))
    });
    let frames = stream::iter(head).chain(live).map(Ok);

    Ok(Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(state.settings.heartbeat())
            .text("heartbeat"),
    ))
}

/// `POST /events`: publish on behalf of an external collaborator.
pub(crate) async fn publish_event<S: SessionAdapter, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Json(event): Json<BusEvent>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !state.secret.allows(&headers, None) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let kind = event.kind();
    let seq = state.bus.emit(event);
    tracing::info!(seq, kind, "external event published");
    Ok(Json(json!({ "seq": seq })))
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
