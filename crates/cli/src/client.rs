// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway connection for CLI commands

use std::path::Path;
use std::time::Duration;

use sb_core::ClientId;
use sb_daemon::gateway::backoff::Backoff;
use sb_daemon::gateway::protocol::ErrorCode;
use sb_daemon::{ClientConfig, ClientMessage, GatewayClient, GatewayClientError, ServerMessage};
use thiserror::Error;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:7420/ws";

/// Name of the secret file the daemon writes into its state directory
const SECRET_FILE: &str = "secret";

/// Timeout for a request's reply
pub fn timeout_reply() -> Duration {
    crate::env::timeout_reply_ms().unwrap_or(Duration::from_secs(10))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No shared secret: pass --secret, set SB_SHARED_SECRET, or start sbd once")]
    NoSecret,

    #[error("Timed out waiting for {0}")]
    NoReply(&'static str),

    #[error("{message} [{code:?}]")]
    Server {
        code: ErrorCode,
        message: String,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayClientError),
}

/// Where the gateway lives and how to authenticate to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub secret: String,
}

impl Endpoint {
    /// Flags win over environment; the secret finally falls back to the
    /// daemon's secret file.
    pub fn resolve(url: Option<String>, secret: Option<String>) -> Result<Self, ClientError> {
        let url = url
            .or_else(crate::env::url)
            .map(|u| normalize_url(&u))
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let secret = secret
            .or_else(crate::env::shared_secret)
            .or_else(|| crate::env::state_dir().and_then(|dir| read_secret(&dir)))
            .ok_or(ClientError::NoSecret)?;
        Ok(Self { url, secret })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_id: crate::env::client_id().map(ClientId::new),
            backoff: Backoff {
                max_attempts: 3,
                ..Backoff::default()
            },
            ..ClientConfig::new(&self.url, &self.secret)
        }
    }

    pub async fn connect(&self, resume_from: Option<u64>) -> Result<GatewayClient, ClientError> {
        let mut client = GatewayClient::new(ClientConfig {
            resume_from,
            ..self.client_config()
        });
        client.connect().await?;
        Ok(client)
    }
}

/// Accept `host:port`, `http(s)://` and bare `ws(s)://host:port` forms.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else {
        format!("ws://{url}")
    };
    let has_path = url
        .split_once("://")
        .is_some_and(|(_, rest)| rest.contains('/'));
    if has_path {
        url
    } else {
        format!("{url}/ws")
    }
}

fn read_secret(state_dir: &Path) -> Option<String> {
    let text = std::fs::read_to_string(state_dir.join(SECRET_FILE)).ok()?;
    let secret = text.trim();
    (!secret.is_empty()).then(|| secret.to_string())
}

/// Send `msg` and wait for the first reply `extract` accepts.
///
/// Error frames addressed to the same session (or to no session) fail the
/// request. Unrelated traffic is skipped.
pub async fn request<T>(
    client: &mut GatewayClient,
    msg: ClientMessage,
    what: &'static str,
    mut extract: impl FnMut(ServerMessage) -> Option<T>,
) -> Result<T, ClientError> {
    let target = target_session(&msg);
    client.send(msg).await?;
    let wait = async {
        loop {
            let reply = client.next().await?;
            if let ServerMessage::Error {
                code,
                message,
                session_id,
            } = &reply
            {
                if session_id.is_none() || *session_id == target {
                    return Err(ClientError::Server {
                        code: *code,
                        message: message.clone(),
                    });
                }
            }
            if let Some(value) = extract(reply) {
                return Ok(value);
            }
        }
    };
    tokio::time::timeout(timeout_reply(), wait)
        .await
        .map_err(|_| ClientError::NoReply(what))?
}

fn target_session(msg: &ClientMessage) -> Option<String> {
    match msg {
        ClientMessage::SessionConnect { session_id, .. }
        | ClientMessage::SessionDisconnect { session_id }
        | ClientMessage::SessionInput { session_id, .. }
        | ClientMessage::SessionInterrupt { session_id }
        | ClientMessage::SessionPermissionResponse { session_id, .. }
        | ClientMessage::SessionCapture { session_id, .. }
        | ClientMessage::SessionKill { session_id }
        | ClientMessage::SessionRespawn { session_id } => Some(session_id.clone()),
        ClientMessage::SessionSpawn { name, .. } => Some(name.clone()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
