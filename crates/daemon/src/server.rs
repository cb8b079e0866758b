// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon state and the HTTP router hosting every surface

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sb_adapters::SessionAdapter;
use sb_core::{ClientId, Clock, SequentialIdGen, UuidIdGen};
use tokio::sync::broadcast;

use crate::auth::SharedSecret;
use crate::config::Settings;
use crate::event_bus::EventBus;
use crate::registry::SessionRegistry;
use crate::transport::TransportManager;
use crate::{broadcast as sse, gateway, transport};

const TYPING_CAPACITY: usize = 256;

/// Unsequenced typing indicator relayed between gateway connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingNotice {
    pub client_id: ClientId,
    pub active: bool,
}

pub struct AppState<S: SessionAdapter, C: Clock> {
    pub registry: Arc<SessionRegistry<S, C>>,
    pub bus: EventBus<C>,
    pub transports: TransportManager<C>,
    pub secret: SharedSecret,
    pub settings: Settings,
    pub typing: broadcast::Sender<TypingNotice>,
    /// Ids for clients that do not bring their own
    pub client_ids: UuidIdGen,
    /// Log-only connection labels
    pub conn_ids: SequentialIdGen,
}

pub type SharedState<S, C> = Arc<AppState<S, C>>;

impl<S: SessionAdapter, C: Clock> AppState<S, C> {
    pub fn new(
        registry: Arc<SessionRegistry<S, C>>,
        transports: TransportManager<C>,
        secret: &str,
        settings: Settings,
    ) -> Self {
        let (typing, _) = broadcast::channel(TYPING_CAPACITY);
        Self {
            bus: registry.bus().clone(),
            registry,
            transports,
            secret: SharedSecret::new(secret),
            settings,
            typing,
            client_ids: UuidIdGen::with_prefix("cli-"),
            conn_ids: SequentialIdGen::new("conn"),
        }
    }
}

pub fn router<S: SessionAdapter, C: Clock>(state: SharedState<S, C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(gateway::ws_handler::<S, C>))
        .route(
            "/events",
            get(sse::stream_events::<S, C>).post(sse::publish_event::<S, C>),
        )
        .route(
            "/mcp",
            get(transport::routes::stream::<S, C>)
                .post(transport::routes::call::<S, C>)
                .delete(transport::routes::terminate::<S, C>),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
