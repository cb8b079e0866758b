// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot session commands: list, spawn, kill, respawn, capture and the
//! input actions.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use sb_core::{SessionId, SessionMode, SessionStatus, WorkspaceKind};
use sb_daemon::gateway::protocol::SessionSummary;
use sb_daemon::{ClientMessage, GatewayClient, ServerMessage};
use serde_json::json;

use crate::client::request;
use crate::exit_error::{ExitError, NOT_DELIVERED};
use crate::output::{format_since, print_capture_frame, print_json, OutputFormat};
use crate::table::{Column, Table};

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum ModeArg {
    #[default]
    Swarm,
    Hierarchy,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Swarm => SessionMode::Swarm,
            ModeArg::Hierarchy => SessionMode::Hierarchy,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum WorkspaceArg {
    #[default]
    Shared,
    Worktree,
    Copy,
}

impl From<WorkspaceArg> for WorkspaceKind {
    fn from(kind: WorkspaceArg) -> Self {
        match kind {
            WorkspaceArg::Shared => WorkspaceKind::Shared,
            WorkspaceArg::Worktree => WorkspaceKind::Worktree,
            WorkspaceArg::Copy => WorkspaceKind::Copy,
        }
    }
}

/// An action answered with a `delivery` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Input(String),
    Interrupt,
    Permission { approved: bool },
}

impl Action {
    fn wire_action(&self) -> &'static str {
        match self {
            Action::Input(_) => "input",
            Action::Interrupt => "interrupt",
            Action::Permission { .. } => "permission_response",
        }
    }

    fn into_message(self, session_id: String) -> ClientMessage {
        match self {
            Action::Input(text) => ClientMessage::SessionInput { session_id, text },
            Action::Interrupt => ClientMessage::SessionInterrupt { session_id },
            Action::Permission { approved } => ClientMessage::SessionPermissionResponse {
                session_id,
                approved,
            },
        }
    }
}

pub async fn list(client: &mut GatewayClient, format: OutputFormat) -> Result<()> {
    let sessions = request(client, ClientMessage::SessionList, "session list", |m| match m {
        ServerMessage::SessionList { sessions } => Some(sessions),
        _ => None,
    })
    .await?;

    match format {
        OutputFormat::Text => {
            let table = session_table(&sessions, now_ms());
            if table.is_empty() {
                println!("No sessions");
            } else {
                table.print();
            }
        }
        OutputFormat::Json => print_json(&sessions)?,
    }
    Ok(())
}

fn session_table(sessions: &[SessionSummary], now_ms: u64) -> Table {
    let mut table = Table::new(vec![
        Column::muted("ID").with_max(12),
        Column::left("NAME"),
        Column::status("STATUS"),
        Column::right("CLIENTS"),
        Column::left("MODE"),
        Column::right("ACTIVE"),
        Column::left("WORKSPACE").with_max(48),
    ]);
    for s in sessions {
        table.row(vec![
            s.id.to_string(),
            s.name.clone(),
            s.status.to_string(),
            s.clients.to_string(),
            s.mode.as_str().to_string(),
            format_since(s.last_activity_ms, now_ms),
            s.workspace_path.display().to_string(),
        ]);
    }
    table
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub async fn spawn(
    client: &mut GatewayClient,
    name: String,
    project: &Path,
    mode: ModeArg,
    workspace: WorkspaceArg,
    format: OutputFormat,
) -> Result<()> {
    let msg = ClientMessage::SessionSpawn {
        name,
        project_path: absolute(project)?,
        mode: mode.into(),
        workspace: workspace.into(),
    };
    let reply = request(client, msg, "spawned session", status_reply).await?;
    print_status(reply, "Spawned", format)
}

pub async fn respawn(client: &mut GatewayClient, session: String, format: OutputFormat) -> Result<()> {
    let msg = ClientMessage::SessionRespawn {
        session_id: session,
    };
    let reply = request(client, msg, "respawned session", status_reply).await?;
    print_status(reply, "Respawned", format)
}

type StatusReply = (SessionId, String, SessionStatus);

fn status_reply(msg: ServerMessage) -> Option<StatusReply> {
    match msg {
        ServerMessage::SessionStatus {
            session_id,
            name,
            status,
        } => Some((session_id, name, status)),
        _ => None,
    }
}

fn print_status(reply: StatusReply, verb: &str, format: OutputFormat) -> Result<()> {
    let (session_id, name, status) = reply;
    match format {
        OutputFormat::Text => println!("{verb} {name} ({session_id}): {status}"),
        OutputFormat::Json => print_json(&json!({
            "session_id": session_id,
            "name": name,
            "status": status,
        }))?,
    }
    Ok(())
}

/// The daemon resolves the project on its side, so relative paths are
/// made absolute against the caller's directory first.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

pub async fn kill(client: &mut GatewayClient, session: String, format: OutputFormat) -> Result<()> {
    let msg = ClientMessage::SessionKill {
        session_id: session.clone(),
    };
    let (session_id, delivered) = request(client, msg, "kill result", |m| {
        delivery_reply(m, "kill")
    })
    .await?;
    match format {
        OutputFormat::Text if delivered => println!("Killed session {session}"),
        OutputFormat::Text => println!("Removed session {session} (process was already gone)"),
        OutputFormat::Json => print_json(&json!({
            "session_id": session_id,
            "killed": delivered,
        }))?,
    }
    Ok(())
}

fn delivery_reply(msg: ServerMessage, wanted: &str) -> Option<(SessionId, bool)> {
    match msg {
        ServerMessage::Delivery {
            session_id,
            action,
            delivered,
        } if action == wanted => Some((session_id, delivered)),
        _ => None,
    }
}

/// Send an input action and fail with [`NOT_DELIVERED`] when the session's
/// process could not take it.
pub async fn deliver(
    client: &mut GatewayClient,
    session: String,
    action: Action,
    format: OutputFormat,
) -> Result<()> {
    let wire_action = action.wire_action();
    let msg = action.into_message(session.clone());
    let (_, delivered) = request(client, msg, "delivery", |m| {
        delivery_reply(m, wire_action)
    })
    .await?;
    if let OutputFormat::Json = format {
        print_json(&json!({ "session": session, "action": wire_action, "delivered": delivered }))?;
    }
    if !delivered {
        return Err(ExitError::new(
            NOT_DELIVERED,
            format!("{wire_action} not delivered: session {session} is offline"),
        )
        .into());
    }
    Ok(())
}

pub async fn capture(
    client: &mut GatewayClient,
    session: String,
    plain: bool,
    format: OutputFormat,
) -> Result<()> {
    let msg = ClientMessage::SessionCapture {
        session_id: session.clone(),
        raw: !plain,
    };
    let (session_id, text) = request(client, msg, "capture", |m| match m {
        ServerMessage::SessionCapture { session_id, text } => Some((session_id, text)),
        _ => None,
    })
    .await?;
    match format {
        OutputFormat::Text => print_capture_frame(&session, &text),
        OutputFormat::Json => print_json(&json!({ "session_id": session_id, "text": text }))?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
