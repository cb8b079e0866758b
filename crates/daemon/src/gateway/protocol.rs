// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime gateway wire protocol.
//!
//! One JSON object per WebSocket text frame, tagged by `type`.

use std::path::PathBuf;

use sb_core::{
    ClientId, SequencedEvent, Session, SessionEvent, SessionId, SessionMode, SessionStatus,
    WorkspaceKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_bus::Gap;
use crate::registry::RegistryError;

/// Protocol version announced in `auth_challenge`
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn yes() -> bool {
    true
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    AuthResponse {
        secret: String,
        /// Stable id to reuse across reconnects
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
        /// Replay bus events after this seq before any live event
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume_from: Option<u64>,
    },
    Message {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    Typing {
        active: bool,
    },
    Ack {
        seq: u64,
    },
    Sync {
        last_seq_seen: u64,
    },

    // Session plane. `session_id` also accepts a session name.
    SessionConnect {
        session_id: String,
        #[serde(default = "yes")]
        replay: bool,
        /// Deliver output with escape sequences intact
        #[serde(default)]
        raw: bool,
    },
    SessionDisconnect {
        session_id: String,
    },
    SessionInput {
        session_id: String,
        text: String,
    },
    SessionInterrupt {
        session_id: String,
    },
    SessionPermissionResponse {
        session_id: String,
        approved: bool,
    },
    SessionCapture {
        session_id: String,
        #[serde(default = "yes")]
        raw: bool,
    },

    // Control plane
    SessionList,
    SessionSpawn {
        name: String,
        project_path: PathBuf,
        #[serde(default)]
        mode: SessionMode,
        #[serde(default)]
        workspace: WorkspaceKind,
    },
    SessionKill {
        session_id: String,
    },
    SessionRespawn {
        session_id: String,
    },
}

/// A bus event as seen by gateway clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub seq: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub payload: serde_json::Value,
}

impl From<&SequencedEvent> for WireEvent {
    fn from(event: &SequencedEvent) -> Self {
        Self {
            seq: event.seq,
            name: event.event.wire_name().to_string(),
            action: event.event.action().map(str::to_string),
            payload: event.wire_payload(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthFailed,
    AuthTimeout,
    BadMessage,
    NotFound,
    NameConflict,
    InvalidName,
    NotOffline,
    SpawnFailed,
    CaptureFailed,
    SessionFeedLagged,
}

impl From<&RegistryError> for ErrorCode {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ErrorCode::NotFound,
            RegistryError::NameConflict(_) => ErrorCode::NameConflict,
            RegistryError::InvalidName(_) => ErrorCode::InvalidName,
            RegistryError::NotOffline(_) => ErrorCode::NotOffline,
            RegistryError::Spawn(_) | RegistryError::Discovery(_) => ErrorCode::SpawnFailed,
            RegistryError::Capture(_) => ErrorCode::CaptureFailed,
        }
    }
}

/// Listing entry for `session_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub status: SessionStatus,
    pub project_path: PathBuf,
    pub workspace_path: PathBuf,
    pub mode: SessionMode,
    pub workspace: WorkspaceKind,
    pub clients: usize,
    pub pipe_alive: bool,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            status: s.status(),
            project_path: s.project_path.clone(),
            workspace_path: s.workspace_path.clone(),
            mode: s.mode,
            workspace: s.workspace,
            clients: s.clients.len(),
            pipe_alive: s.pipe_alive,
            created_at_ms: s.created_at_ms,
            last_activity_ms: s.last_activity_ms,
        }
    }
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthChallenge {
        protocol: u32,
    },
    Connected {
        client_id: ClientId,
        /// Newest bus sequence number issued so far
        last_seq: u64,
    },
    Event(WireEvent),
    SyncResponse {
        events: Vec<WireEvent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gap: Option<Gap>,
        last_seq: u64,
    },
    /// Events that fell out of the retained window
    Gap(Gap),
    Typing {
        client_id: ClientId,
        active: bool,
    },
    SessionConnected {
        session_id: SessionId,
        name: String,
        status: SessionStatus,
        /// Replayed output, oldest first
        buffer: Vec<String>,
        raw: bool,
    },
    SessionOutput {
        session_id: SessionId,
        data: String,
    },
    SessionRaw {
        session_id: SessionId,
        data: String,
    },
    SessionStatus {
        session_id: SessionId,
        name: String,
        status: SessionStatus,
    },
    SessionEvent {
        session_id: SessionId,
        event: SessionEvent,
    },
    SessionDisconnected {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    SessionCapture {
        session_id: SessionId,
        text: String,
    },
    /// Outcome of an input, interrupt, permission response or kill
    Delivery {
        session_id: SessionId,
        action: String,
        delivered: bool,
    },
    SessionList {
        sessions: Vec<SessionSummary>,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
            session_id: None,
        }
    }

    pub fn session_error(session_id: &str, err: &RegistryError) -> Self {
        ServerMessage::Error {
            code: err.into(),
            message: err.to_string(),
            session_id: Some(session_id.to_string()),
        }
    }

    /// Bus sequence number carried by this message, if any.
    pub fn seq(&self) -> Option<u64> {
        match self {
            ServerMessage::Event(event) => Some(event.seq),
            ServerMessage::SyncResponse { last_seq, .. } => Some(*last_seq),
            ServerMessage::Gap(gap) => Some(gap.to),
            _ => None,
        }
    }
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
