// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One authenticated gateway connection.
//!
//! After the handshake a connection multiplexes four inputs: client frames,
//! the event bus, typing notices from other connections and the session
//! feed. Bus events go out strictly above the highest seq already
//! delivered on this connection; session feed items go out only for
//! sessions the client connected to, and only past the snapshot it got.
//!
//! A client resuming after a drop names its last seq in `auth_response`;
//! the replay is sent right after `connected` and before any live event.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use sb_adapters::SessionAdapter;
use sb_core::{BusEvent, ClientId, Clock, IdGen, SessionId};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::protocol::{
    self, ClientMessage, ErrorCode, ServerMessage, SessionSummary, WireEvent, PROTOCOL_VERSION,
};
use crate::event_bus::{BusDelivery, Replay};
use crate::registry::{CreateSession, FeedItem, RegistryError, SessionFeed};
use crate::server::{AppState, TypingNotice};

type Sink = SplitSink<WebSocket, Message>;

/// `GET /ws`
pub(crate) async fn ws_handler<S: SessionAdapter, C: Clock>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<S, C>>>,
) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

struct SessionSub {
    raw: bool,
    /// Feed items at or below this seq are covered by the snapshot
    after: u64,
}

struct Connection<S: SessionAdapter, C: Clock> {
    state: Arc<AppState<S, C>>,
    sink: Sink,
    conn: String,
    client_id: ClientId,
    /// Highest bus seq delivered on this connection
    delivered: u64,
    acked: u64,
    subscriptions: HashMap<SessionId, SessionSub>,
}

async fn serve<S: SessionAdapter, C: Clock>(socket: WebSocket, state: Arc<AppState<S, C>>) {
    let conn = state.conn_ids.next();
    let (sink, mut stream) = socket.split();

    // Subscribe before the handshake so nothing published meanwhile is lost
    let mut feed_rx = state.registry.subscribe();
    let mut typing_rx = state.typing.subscribe();

    let mut connection = Connection {
        state: Arc::clone(&state),
        sink,
        conn,
        client_id: ClientId::new(""),
        delivered: 0,
        acked: 0,
        subscriptions: HashMap::new(),
    };
    let Some((client_id, resume_from)) = connection.handshake(&mut stream).await else {
        return;
    };
    connection.client_id = client_id.clone();

    // Replay and live receiver come from one snapshot so the replay is
    // complete and no live event overtakes it
    let (catch_up, mut bus_rx) = match resume_from {
        Some(after) => {
            let (replay, rx) = state.bus.subscribe_from(after);
            let (last_seq, frame) = sync_response(&replay, after);
            (Some((last_seq, frame)), rx)
        }
        None => {
            let (last_seq, rx) = state.bus.subscribe_live();
            connection.delivered = last_seq;
            (None, rx)
        }
    };
    let last_seq = catch_up
        .as_ref()
        .map_or(connection.delivered, |(seq, _)| *seq);
    if !connection
        .send(&ServerMessage::Connected {
            client_id: client_id.clone(),
            last_seq,
        })
        .await
    {
        return;
    }
    if let Some((seq, frame)) = catch_up {
        connection.delivered = seq;
        if !connection.send(&frame).await {
            return;
        }
    }
    info!(conn = %connection.conn, %client_id, last_seq, ?resume_from, "client connected");

    let mut ping = tokio::time::interval(state.settings.heartbeat());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.tick().await;

    loop {
        let keep_going = tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => connection.handle_text(text.as_str()).await,
                Some(Ok(Message::Binary(_))) => {
                    connection
                        .send(&ServerMessage::error(ErrorCode::BadMessage, "binary frames are not supported"))
                        .await
                }
                Some(Ok(Message::Close(_))) | None => false,
                Some(Ok(_)) => true,
                Some(Err(e)) => {
                    debug!(conn = %connection.conn, error = %e, "socket error");
                    false
                }
            },
            delivery = bus_rx.recv() => match delivery {
                Some(delivery) => connection.forward_bus(delivery).await,
                None => false,
            },
            notice = typing_rx.recv() => match notice {
                Ok(notice) => connection.forward_typing(notice).await,
                Err(RecvError::Lagged(_)) => true,
                Err(RecvError::Closed) => false,
            },
            item = feed_rx.recv() => match item {
                Ok(item) => connection.forward_feed(item).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(conn = %connection.conn, missed, "session feed lagged");
                    connection
                        .send(&ServerMessage::error(
                            ErrorCode::SessionFeedLagged,
                            format!("{missed} session updates were dropped"),
                        ))
                        .await
                }
                Err(RecvError::Closed) => false,
            },
            _ = ping.tick() => connection.sink.send(Message::Ping(Default::default())).await.is_ok(),
        };
        if !keep_going {
            break;
        }
    }

    state.registry.disconnect_client_everywhere(&client_id);
    info!(
        conn = %connection.conn,
        %client_id,
        delivered = connection.delivered,
        acked = connection.acked,
        "client disconnected"
    );
}

impl<S: SessionAdapter, C: Clock> Connection<S, C> {
    async fn send(&mut self, msg: &ServerMessage) -> bool {
        match protocol::encode(msg) {
            Ok(text) => self.sink.send(Message::Text(text.into())).await.is_ok(),
            Err(e) => {
                warn!(conn = %self.conn, error = %e, "cannot encode message");
                true
            }
        }
    }

    async fn reject(&mut self, code: ErrorCode, message: &str) {
        warn!(conn = %self.conn, ?code, "handshake rejected");
        let _ = self.send(&ServerMessage::error(code, message)).await;
        let _ = self
            .sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: message.into(),
            })))
            .await;
    }

    /// Challenge, then wait for a valid `auth_response`. Nothing else is
    /// accepted first. Returns the client id and the seq to resume after.
    async fn handshake(
        &mut self,
        stream: &mut futures::stream::SplitStream<WebSocket>,
    ) -> Option<(ClientId, Option<u64>)> {
        let challenge = ServerMessage::AuthChallenge {
            protocol: PROTOCOL_VERSION,
        };
        if !self.send(&challenge).await {
            return None;
        }

        let first_text = async {
            while let Some(Ok(msg)) = stream.next().await {
                match msg {
                    Message::Text(text) => return Some(text.as_str().to_string()),
                    Message::Binary(bytes) => {
                        return Some(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Message::Close(_) => return None,
                    _ => continue,
                }
            }
            None
        };
        let text = match tokio::time::timeout(self.state.settings.auth_timeout(), first_text).await
        {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(_) => {
                self.reject(ErrorCode::AuthTimeout, "no auth_response in time")
                    .await;
                return None;
            }
        };

        match protocol::decode::<ClientMessage>(&text) {
            Ok(ClientMessage::AuthResponse {
                secret,
                client_id,
                resume_from,
            }) if self.state.secret.matches(&secret) => {
                let client_id = client_id.unwrap_or_else(|| self.state.client_ids.mint());
                Some((client_id, resume_from))
            }
            _ => {
                self.reject(ErrorCode::AuthFailed, "authentication failed")
                    .await;
                None
            }
        }
    }

    async fn forward_bus(&mut self, delivery: BusDelivery) -> bool {
        match delivery {
            BusDelivery::Event(event) if event.seq > self.delivered => {
                self.delivered = event.seq;
                self.send(&ServerMessage::Event(WireEvent::from(&event)))
                    .await
            }
            BusDelivery::Event(_) => true,
            BusDelivery::Gap(gap) if gap.to > self.delivered => {
                self.delivered = gap.to;
                self.send(&ServerMessage::Gap(gap)).await
            }
            BusDelivery::Gap(_) => true,
        }
    }

    async fn forward_typing(&mut self, notice: TypingNotice) -> bool {
        if notice.client_id == self.client_id {
            return true;
        }
        self.send(&ServerMessage::Typing {
            client_id: notice.client_id,
            active: notice.active,
        })
        .await
    }

    async fn forward_feed(&mut self, item: FeedItem) -> bool {
        let Some(sub) = self.subscriptions.get(item.change.session_id()) else {
            return true;
        };
        if item.seq <= sub.after {
            return true;
        }
        let raw = sub.raw;
        let msg = match item.change {
            SessionFeed::Output {
                session_id,
                raw: bytes,
                text,
                ..
            } => {
                if raw {
                    ServerMessage::SessionRaw {
                        session_id,
                        data: bytes,
                    }
                } else if text.is_empty() {
                    return true;
                } else {
                    ServerMessage::SessionOutput {
                        session_id,
                        data: text,
                    }
                }
            }
            SessionFeed::Status {
                session_id,
                name,
                status,
            } => ServerMessage::SessionStatus {
                session_id,
                name,
                status,
            },
            SessionFeed::Event { session_id, event } => {
                ServerMessage::SessionEvent { session_id, event }
            }
            SessionFeed::Removed { session_id } => {
                self.subscriptions.remove(&session_id);
                ServerMessage::SessionDisconnected {
                    session_id,
                    reason: Some("killed".to_string()),
                }
            }
        };
        self.send(&msg).await
    }

    async fn handle_text(&mut self, text: &str) -> bool {
        match protocol::decode::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                self.send(&ServerMessage::error(ErrorCode::BadMessage, e.to_string()))
                    .await
            }
        }
    }

    async fn handle(&mut self, msg: ClientMessage) -> bool {
        let registry = Arc::clone(&self.state.registry);
        match msg {
            ClientMessage::AuthResponse { .. } => {
                self.send(&ServerMessage::error(
                    ErrorCode::BadMessage,
                    "already authenticated",
                ))
                .await
            }
            ClientMessage::Message { text, to } => {
                self.state.bus.emit(BusEvent::ChatMessage {
                    from: self.client_id.clone(),
                    text,
                    to,
                });
                true
            }
            ClientMessage::Typing { active } => {
                let _ = self.state.typing.send(TypingNotice {
                    client_id: self.client_id.clone(),
                    active,
                });
                true
            }
            ClientMessage::Ack { seq } => {
                self.acked = self.acked.max(seq.min(self.delivered));
                true
            }
            ClientMessage::Sync { last_seq_seen } => {
                let replay = self.state.bus.replay_since(last_seq_seen);
                let (last_seq, frame) = sync_response(&replay, last_seq_seen);
                self.delivered = self.delivered.max(last_seq);
                debug!(
                    conn = %self.conn,
                    last_seq_seen,
                    replayed = replay.events.len(),
                    "sync"
                );
                self.send(&frame).await
            }
            ClientMessage::SessionConnect {
                session_id,
                replay,
                raw,
            } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                match registry.connect_client(&session.id, &self.client_id, replay) {
                    Ok(attached) => {
                        self.subscriptions.insert(
                            session.id.clone(),
                            SessionSub {
                                raw,
                                after: attached.feed_seq,
                            },
                        );
                        let buffer = attached
                            .buffer
                            .into_iter()
                            .map(|chunk| if raw { chunk.raw } else { chunk.text })
                            .collect();
                        self.send(&ServerMessage::SessionConnected {
                            session_id: session.id,
                            name: attached.session.name.clone(),
                            status: attached.session.status(),
                            buffer,
                            raw,
                        })
                        .await
                    }
                    Err(e) => self.registry_error(&session_id, &e).await,
                }
            }
            ClientMessage::SessionDisconnect { session_id } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                registry.disconnect_client(&session.id, &self.client_id);
                self.subscriptions.remove(&session.id);
                self.send(&ServerMessage::SessionDisconnected {
                    session_id: session.id,
                    reason: None,
                })
                .await
            }
            ClientMessage::SessionInput { session_id, text } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                let result = registry.send_input(&session.id, &text).await;
                self.delivery(&session_id, session.id, "input", result).await
            }
            ClientMessage::SessionInterrupt { session_id } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                let result = registry.send_interrupt(&session.id).await;
                self.delivery(&session_id, session.id, "interrupt", result)
                    .await
            }
            ClientMessage::SessionPermissionResponse {
                session_id,
                approved,
            } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                let result = registry
                    .send_permission_response(&session.id, approved)
                    .await;
                self.delivery(&session_id, session.id, "permission_response", result)
                    .await
            }
            ClientMessage::SessionCapture { session_id, raw } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                match registry.capture_pane(&session.id, raw).await {
                    Ok(text) => {
                        self.send(&ServerMessage::SessionCapture {
                            session_id: session.id,
                            text,
                        })
                        .await
                    }
                    Err(e) => self.registry_error(&session_id, &e).await,
                }
            }
            ClientMessage::SessionList => {
                let sessions = registry.list().iter().map(SessionSummary::from).collect();
                self.send(&ServerMessage::SessionList { sessions }).await
            }
            ClientMessage::SessionSpawn {
                name,
                project_path,
                mode,
                workspace,
            } => {
                let req = CreateSession {
                    name: name.clone(),
                    project_path,
                    mode,
                    workspace,
                };
                match registry.create(req).await {
                    Ok(session) => {
                        self.send(&ServerMessage::SessionStatus {
                            session_id: session.id.clone(),
                            name: session.name.clone(),
                            status: session.status(),
                        })
                        .await
                    }
                    Err(e) => self.registry_error(&name, &e).await,
                }
            }
            ClientMessage::SessionKill { session_id } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                let killed = registry.kill(&session.id).await;
                self.delivery(&session_id, session.id, "kill", Ok(killed))
                    .await
            }
            ClientMessage::SessionRespawn { session_id } => {
                let Some(session) = registry.resolve(&session_id) else {
                    return self.not_found(&session_id).await;
                };
                match registry.respawn(&session.id).await {
                    Ok(session) => {
                        self.send(&ServerMessage::SessionStatus {
                            session_id: session.id.clone(),
                            name: session.name.clone(),
                            status: session.status(),
                        })
                        .await
                    }
                    Err(e) => self.registry_error(&session_id, &e).await,
                }
            }
        }
    }

    async fn delivery(
        &mut self,
        requested: &str,
        session_id: SessionId,
        action: &str,
        result: Result<bool, RegistryError>,
    ) -> bool {
        match result {
            Ok(delivered) => {
                if !delivered {
                    debug!(conn = %self.conn, %session_id, action, "not delivered");
                }
                self.send(&ServerMessage::Delivery {
                    session_id,
                    action: action.to_string(),
                    delivered,
                })
                .await
            }
            Err(e) => self.registry_error(requested, &e).await,
        }
    }

    async fn not_found(&mut self, session_id: &str) -> bool {
        self.registry_error(
            session_id,
            &RegistryError::NotFound(session_id.to_string()),
        )
        .await
    }

    async fn registry_error(&mut self, session_id: &str, err: &RegistryError) -> bool {
        self.send(&ServerMessage::session_error(session_id, err))
            .await
    }
}

/// `sync_response` for everything after `after`, and the seq it brings
/// the client up to.
fn sync_response(replay: &Replay, after: u64) -> (u64, ServerMessage) {
    let last_seq = replay
        .events
        .last()
        .map(|e| e.seq)
        .or(replay.gap.map(|g| g.to))
        .unwrap_or(after);
    let frame = ServerMessage::SyncResponse {
        events: replay.events.iter().map(WireEvent::from).collect(),
        gap: replay.gap,
        last_seq,
    };
    (last_seq, frame)
}
