// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-session transports for agents speaking JSON-RPC over `/mcp`.
//!
//! Each transport is bound to one agent identity. A request carrying a
//! transport id the manager does not know is recovered in place for the
//! caller's identity instead of failing, unless that id was terminated
//! explicitly.

pub(crate) mod routes;
pub mod tools;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use sb_core::{AgentIdentity, BusEvent, Clock, IdGen, Transport, TransportId, UuidIdGen};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::event_bus::{EventBus, Subscription};

const OUTBOX_CAPACITY: usize = 64;
/// Terminated ids remembered so they are not silently recovered
const TERMINATED_MEMORY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("missing transport id on a non-initialize request")]
    MissingSession,
    #[error("transport {0} not found")]
    NotFound(TransportId),
    #[error("transport {0} belongs to another agent")]
    IdentityMismatch(TransportId),
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("unauthorized")]
    Unauthorized,
}

impl TransportError {
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::MissingSession => StatusCode::BAD_REQUEST,
            TransportError::NotFound(_) => StatusCode::NOT_FOUND,
            TransportError::IdentityMismatch(_) | TransportError::UnknownAgent(_) => {
                StatusCode::FORBIDDEN
            }
            TransportError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let body = json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32000, "message": self.to_string() },
        });
        (self.status(), Json(body)).into_response()
    }
}

struct LiveTransport {
    transport: Transport,
    outbox: broadcast::Sender<Value>,
}

#[derive(Default)]
struct TransportTable {
    live: HashMap<TransportId, LiveTransport>,
    terminated: HashSet<TransportId>,
    terminated_order: VecDeque<TransportId>,
}

impl TransportTable {
    fn insert(&mut self, transport: Transport) {
        let (outbox, _) = broadcast::channel(OUTBOX_CAPACITY);
        self.live.insert(
            transport.id.clone(),
            LiveTransport { transport, outbox },
        );
    }

    fn remember_terminated(&mut self, id: TransportId) {
        if self.terminated.insert(id.clone()) {
            self.terminated_order.push_back(id);
        }
        while self.terminated_order.len() > TERMINATED_MEMORY {
            if let Some(old) = self.terminated_order.pop_front() {
                self.terminated.remove(&old);
            }
        }
    }
}

#[derive(Clone)]
pub struct TransportManager<C: Clock> {
    table: Arc<Mutex<TransportTable>>,
    clock: C,
    ids: UuidIdGen,
}

impl<C: Clock> TransportManager<C> {
    pub fn new(clock: C) -> Self {
        Self {
            table: Arc::new(Mutex::new(TransportTable::default())),
            clock,
            ids: UuidIdGen::with_prefix("mcp-"),
        }
    }

    pub fn create_transport(&self, agent: &AgentIdentity, context: Option<PathBuf>) -> Transport {
        let transport = Transport {
            id: self.ids.mint(),
            agent: agent.clone(),
            created_at_ms: self.clock.epoch_ms(),
            context,
        };
        self.table.lock().insert(transport.clone());
        info!(transport_id = %transport.id, %agent, "transport created");
        transport
    }

    pub fn get_transport(&self, id: &TransportId) -> Option<Transport> {
        self.table
            .lock()
            .live
            .get(id)
            .map(|live| live.transport.clone())
    }

    /// Look up `id` for `agent`, re-creating it under the same id when the
    /// table has no record of it.
    pub fn recover_transport(
        &self,
        id: &TransportId,
        agent: &AgentIdentity,
    ) -> Result<Transport, TransportError> {
        let mut table = self.table.lock();
        if let Some(live) = table.live.get(id) {
            if &live.transport.agent != agent {
                return Err(TransportError::IdentityMismatch(id.clone()));
            }
            return Ok(live.transport.clone());
        }
        if table.terminated.contains(id) {
            return Err(TransportError::NotFound(id.clone()));
        }
        let transport = Transport {
            id: id.clone(),
            agent: agent.clone(),
            created_at_ms: self.clock.epoch_ms(),
            context: None,
        };
        table.insert(transport.clone());
        info!(transport_id = %id, %agent, "transport recovered");
        Ok(transport)
    }

    /// Pick the transport for one incoming request.
    pub fn route(
        &self,
        id: Option<&TransportId>,
        agent: &AgentIdentity,
        is_initialize: bool,
    ) -> Result<Transport, TransportError> {
        match id {
            Some(id) => self.recover_transport(id, agent),
            None if is_initialize => Ok(self.create_transport(agent, None)),
            None => Err(TransportError::MissingSession),
        }
    }

    /// Remove `agent`'s transport. Succeeds only the first time.
    pub fn terminate(
        &self,
        id: &TransportId,
        agent: &AgentIdentity,
    ) -> Result<(), TransportError> {
        let mut table = self.table.lock();
        match table.live.get(id) {
            None => return Err(TransportError::NotFound(id.clone())),
            Some(live) if &live.transport.agent != agent => {
                return Err(TransportError::IdentityMismatch(id.clone()))
            }
            Some(_) => {}
        }
        table.live.remove(id);
        table.remember_terminated(id.clone());
        info!(transport_id = %id, %agent, "transport terminated");
        Ok(())
    }

    /// Server-to-agent messages for one transport.
    pub fn open_stream(
        &self,
        id: &TransportId,
        agent: &AgentIdentity,
    ) -> Result<broadcast::Receiver<Value>, TransportError> {
        let table = self.table.lock();
        let live = table
            .live
            .get(id)
            .ok_or_else(|| TransportError::NotFound(id.clone()))?;
        if &live.transport.agent != agent {
            return Err(TransportError::IdentityMismatch(id.clone()));
        }
        Ok(live.outbox.subscribe())
    }

    /// Queue `message` on every transport owned by `agent`. Returns how
    /// many transports had an open stream to take it.
    pub fn notify_agent(&self, agent: &AgentIdentity, message: Value) -> usize {
        let table = self.table.lock();
        table
            .live
            .values()
            .filter(|live| &live.transport.agent == agent)
            .filter(|live| live.outbox.send(message.clone()).is_ok())
            .count()
    }

    /// Push `mail:received` events to the recipient's transports as
    /// JSON-RPC notifications.
    pub fn attach_to_bus(&self, bus: &EventBus<C>) -> Subscription {
        let manager = self.clone();
        bus.subscribe_all(move |event| {
            let BusEvent::MailReceived {
                from,
                to,
                subject,
                body,
            } = &event.event
            else {
                return;
            };
            let notification = json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": {
                    "level": "info",
                    "logger": "mail",
                    "data": {
                        "seq": event.seq,
                        "from": from,
                        "subject": subject,
                        "body": body,
                    },
                },
            });
            let delivered = manager.notify_agent(&AgentIdentity::new(to.as_str()), notification);
            debug!(seq = event.seq, %to, delivered, "mail pushed to transports");
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
