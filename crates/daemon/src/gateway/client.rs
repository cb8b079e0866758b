// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnecting gateway client.
//!
//! Used by the `sb` CLI and by tests. On every reconnect the client names
//! the last seq it saw in `auth_response`, so the server replays what was
//! missed before any live event, and re-subscribes to the sessions it was
//! attached to, without replaying their buffers again.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use sb_core::ClientId;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::protocol::{self, ClientMessage, ErrorCode, ProtocolError, ServerMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum GatewayClientError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("authentication timed out")]
    AuthTimeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("gave up after {attempts} connection attempts")]
    Exhausted { attempts: u32 },
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl GatewayClientError {
    /// Auth rejections are final; everything else is worth another try.
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GatewayClientError::AuthFailed(_) | GatewayClientError::AuthTimeout
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://host:port/ws`
    pub url: String,
    pub secret: String,
    pub client_id: Option<ClientId>,
    pub backoff: Backoff,
    /// Time allowed for the whole handshake
    pub auth_timeout: Duration,
    /// Resume the event stream after this seq on the first connect
    pub resume_from: Option<u64>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
            client_id: None,
            backoff: Backoff::default(),
            auth_timeout: Duration::from_secs(10),
            resume_from: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

pub struct GatewayClient {
    config: ClientConfig,
    state: ConnectionState,
    socket: Option<Socket>,
    client_id: Option<ClientId>,
    /// Attached sessions (id or name) and whether they want raw output
    sessions: BTreeMap<String, bool>,
    last_seq_seen: u64,
    /// Ack owed for the last sequenced message handed out
    pending_ack: Option<u64>,
    /// A resume was requested and its `sync_response` has not arrived;
    /// until then no frame may move `last_seq_seen`
    resume_pending: bool,
    connected_once: bool,
}

impl GatewayClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            last_seq_seen: config.resume_from.unwrap_or(0),
            config,
            state: ConnectionState::Disconnected,
            socket: None,
            sessions: BTreeMap::new(),
            pending_ack: None,
            resume_pending: false,
            connected_once: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id assigned by the server, kept across reconnects.
    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    pub fn last_seq_seen(&self) -> u64 {
        self.last_seq_seen
    }

    pub fn tracked_sessions(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Connect, retrying with backoff. Authentication failures are not
    /// retried.
    pub async fn connect(&mut self) -> Result<(), GatewayClientError> {
        let mut attempts = 0;
        loop {
            self.state = ConnectionState::Connecting;
            let err = match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            self.socket = None;
            if !err.is_retryable() {
                self.state = ConnectionState::Disconnected;
                return Err(err);
            }
            attempts += 1;
            if attempts >= self.config.backoff.max_attempts {
                self.state = ConnectionState::Disconnected;
                warn!(attempts, error = %err, "giving up on gateway");
                return Err(GatewayClientError::Exhausted { attempts });
            }
            let delay = self.config.backoff.jittered(attempts - 1);
            debug!(attempts, ?delay, error = %err, "gateway connect failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_connect(&mut self) -> Result<(), GatewayClientError> {
        let (socket, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| GatewayClientError::Network(e.to_string()))?;
        self.socket = Some(socket);
        self.state = ConnectionState::Authenticating;

        let resume_from = (self.connected_once || self.config.resume_from.is_some())
            .then_some(self.last_seq_seen);
        let limit = self.config.auth_timeout;
        let last_seq = match tokio::time::timeout(limit, self.handshake(resume_from)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GatewayClientError::Network(
                    "handshake timed out".to_string(),
                ))
            }
        };

        // A resumed stream opens with its sync_response
        self.resume_pending = resume_from.is_some();
        if resume_from.is_none() {
            self.last_seq_seen = last_seq;
        }
        let resubscribe: Vec<_> = self
            .sessions
            .iter()
            .map(|(session_id, raw)| ClientMessage::SessionConnect {
                session_id: session_id.clone(),
                replay: false,
                raw: *raw,
            })
            .collect();
        for msg in &resubscribe {
            self.write(msg).await?;
        }

        info!(
            client_id = ?self.client_id,
            last_seq_seen = self.last_seq_seen,
            sessions = resubscribe.len(),
            "gateway connected"
        );
        self.connected_once = true;
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Answer the challenge; returns the server's last seq.
    async fn handshake(&mut self, resume_from: Option<u64>) -> Result<u64, GatewayClientError> {
        match self.read().await? {
            Some(ServerMessage::AuthChallenge { .. }) => {}
            Some(other) => {
                return Err(GatewayClientError::Network(format!(
                    "expected auth_challenge, got {other:?}"
                )))
            }
            None => return Err(GatewayClientError::Closed),
        }
        let response = ClientMessage::AuthResponse {
            secret: self.config.secret.clone(),
            client_id: self.client_id.clone(),
            resume_from,
        };
        self.write(&response).await?;

        match self.read().await? {
            Some(ServerMessage::Connected {
                client_id,
                last_seq,
            }) => {
                self.client_id = Some(client_id);
                Ok(last_seq)
            }
            Some(ServerMessage::Error {
                code: ErrorCode::AuthTimeout,
                ..
            }) => Err(GatewayClientError::AuthTimeout),
            Some(ServerMessage::Error {
                code: ErrorCode::AuthFailed,
                message,
                ..
            }) => Err(GatewayClientError::AuthFailed(message)),
            Some(other) => Err(GatewayClientError::Network(format!(
                "expected connected, got {other:?}"
            ))),
            None => Err(GatewayClientError::AuthFailed(
                "connection closed during handshake".to_string(),
            )),
        }
    }

    /// Next server message, reconnecting transparently when the socket
    /// drops.
    ///
    /// Sequenced messages are acknowledged on the following `next` or
    /// `send`, so nothing is awaited after a message is taken off the
    /// socket and the future can be dropped in a `select!`.
    pub async fn next(&mut self) -> Result<ServerMessage, GatewayClientError> {
        loop {
            if self.socket.is_none() {
                self.connect().await?;
            }
            self.flush_ack().await;
            match self.read().await {
                Ok(Some(msg)) => {
                    self.pending_ack = self.record(&msg).or(self.pending_ack);
                    return Ok(msg);
                }
                Ok(None) | Err(GatewayClientError::Network(_)) => {
                    info!("gateway connection lost, reconnecting");
                    self.socket = None;
                    self.state = ConnectionState::Disconnected;
                }
                Err(GatewayClientError::Protocol(e)) => {
                    warn!(error = %e, "ignoring undecodable server message");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a message, reconnecting once if the socket is gone.
    pub async fn send(&mut self, msg: ClientMessage) -> Result<(), GatewayClientError> {
        self.track(&msg);
        if self.socket.is_none() {
            self.connect().await?;
            // Reconnecting already re-sent tracked session_connects
            if matches!(msg, ClientMessage::SessionConnect { .. }) {
                return Ok(());
            }
        }
        self.flush_ack().await;
        match self.write(&msg).await {
            Err(GatewayClientError::Network(e)) => {
                info!(error = %e, "send failed, reconnecting");
                self.socket = None;
                self.connect().await?;
                if matches!(msg, ClientMessage::SessionConnect { .. }) {
                    return Ok(());
                }
                self.write(&msg).await
            }
            other => other,
        }
    }

    pub async fn close(&mut self) {
        self.flush_ack().await;
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn flush_ack(&mut self) {
        if let Some(seq) = self.pending_ack.take() {
            // A failed ack surfaces on the next read
            let _ = self.write(&ClientMessage::Ack { seq }).await;
        }
    }

    /// Remember session attachments so they survive reconnects.
    fn track(&mut self, msg: &ClientMessage) {
        match msg {
            ClientMessage::SessionConnect {
                session_id, raw, ..
            } => {
                self.sessions.insert(session_id.clone(), *raw);
            }
            ClientMessage::SessionDisconnect { session_id } => {
                self.sessions.remove(session_id);
            }
            _ => {}
        }
    }

    /// Update local state from a server message; returns a seq to ack.
    fn record(&mut self, msg: &ServerMessage) -> Option<u64> {
        match msg {
            ServerMessage::SessionConnected {
                session_id, name, ..
            } => {
                // Track by id from here on so kills can be matched
                if let Some(raw) = self.sessions.remove(name.as_str()) {
                    self.sessions.insert(session_id.to_string(), raw);
                }
            }
            ServerMessage::SessionDisconnected {
                session_id,
                reason: Some(_),
            } => {
                self.sessions.remove(session_id.as_str());
            }
            _ => {}
        }
        if self.resume_pending {
            if !matches!(msg, ServerMessage::SyncResponse { .. }) {
                return None;
            }
            self.resume_pending = false;
        }
        let seq = msg.seq()?;
        if seq <= self.last_seq_seen {
            return None;
        }
        self.last_seq_seen = seq;
        Some(seq)
    }

    async fn write(&mut self, msg: &ClientMessage) -> Result<(), GatewayClientError> {
        let text = protocol::encode(msg)?;
        let socket = self.socket.as_mut().ok_or(GatewayClientError::Closed)?;
        socket
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| GatewayClientError::Network(e.to_string()))
    }

    /// `Ok(None)` once the server closes the socket.
    async fn read(&mut self) -> Result<Option<ServerMessage>, GatewayClientError> {
        let socket = self.socket.as_mut().ok_or(GatewayClientError::Closed)?;
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => return Ok(Some(protocol::decode(text.as_str())?)),
                Ok(WsMessage::Close(_)) => return Ok(None),
                Ok(_) => continue,
                Err(e) => return Err(GatewayClientError::Network(e.to_string())),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
