// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sb attach` - stream a session's output and type into it

use anyhow::Result;
use sb_core::{SessionEvent, SessionId, SessionStatus};
use sb_daemon::{ClientMessage, GatewayClient, ServerMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::client::request;
use crate::color;

/// What an attached terminal does with a server frame.
#[derive(Debug, PartialEq)]
enum Frame {
    Output(String),
    Notice(String),
    Detached(String),
    Ignore,
}

pub async fn run(
    client: &mut GatewayClient,
    session: String,
    raw: bool,
    replay: bool,
) -> Result<()> {
    let connect = ClientMessage::SessionConnect {
        session_id: session,
        replay,
        raw,
    };
    let (session_id, name, status, buffer) =
        request(client, connect, "session_connected", |m| match m {
            ServerMessage::SessionConnected {
                session_id,
                name,
                status,
                buffer,
                ..
            } => Some((session_id, name, status, buffer)),
            _ => None,
        })
        .await?;

    eprintln!(
        "{}",
        color::muted(&format!(
            "attached to {name} ({session_id}), {status}. Lines are sent as input; Ctrl-D detaches."
        ))
    );

    let mut stdout = tokio::io::stdout();
    for chunk in &buffer {
        stdout.write_all(chunk.as_bytes()).await?;
    }
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ended = false;
    loop {
        tokio::select! {
            msg = client.next() => {
                match classify(&session_id, msg?) {
                    Frame::Output(data) => {
                        stdout.write_all(data.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    Frame::Notice(text) => eprintln!("{}", color::muted(&text)),
                    Frame::Detached(text) => {
                        eprintln!("{}", color::muted(&text));
                        ended = true;
                        break;
                    }
                    Frame::Ignore => {}
                }
            }
            line = lines.next_line() => {
                let Some(text) = line? else { break };
                client
                    .send(ClientMessage::SessionInput {
                        session_id: session_id.to_string(),
                        text,
                    })
                    .await?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if !ended {
        client
            .send(ClientMessage::SessionDisconnect {
                session_id: session_id.to_string(),
            })
            .await?;
    }
    client.close().await;
    Ok(())
}

fn classify(session_id: &SessionId, msg: ServerMessage) -> Frame {
    match msg {
        ServerMessage::SessionOutput { session_id: id, data }
        | ServerMessage::SessionRaw { session_id: id, data }
            if id == *session_id =>
        {
            Frame::Output(data)
        }
        ServerMessage::SessionStatus {
            session_id: id,
            status,
            ..
        } if id == *session_id => Frame::Notice(status_notice(status)),
        ServerMessage::SessionEvent {
            session_id: id,
            event,
        } if id == *session_id => event_notice(&event).map_or(Frame::Ignore, Frame::Notice),
        ServerMessage::SessionDisconnected {
            session_id: id,
            reason,
        } if id == *session_id => Frame::Detached(match reason {
            Some(reason) => format!("[session ended: {reason}]"),
            None => "[detached]".to_string(),
        }),
        ServerMessage::Delivery {
            session_id: id,
            action,
            delivered: false,
        } if id == *session_id => Frame::Notice(format!("[{action} not delivered: session is offline]")),
        ServerMessage::Error { code, message, .. } => {
            Frame::Notice(format!("[error {code:?}: {message}]"))
        }
        _ => Frame::Ignore,
    }
}

fn status_notice(status: SessionStatus) -> String {
    match status {
        SessionStatus::WaitingPermission => {
            "[waiting_permission: answer with `sb approve` or `sb deny`]".to_string()
        }
        other => format!("[{other}]"),
    }
}

fn event_notice(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::PermissionRequested { tool, prompt } => Some(match tool {
            Some(tool) => format!("[permission requested for {tool}: {prompt}]"),
            None => format!("[permission requested: {prompt}]"),
        }),
        SessionEvent::ProcessGone { exit_code } => Some(match exit_code {
            Some(code) => format!("[process exited with {code}]"),
            None => "[process gone]".to_string(),
        }),
        SessionEvent::Reattached => Some("[reattached]".to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
