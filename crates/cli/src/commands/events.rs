// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sb tail-events` - follow the event bus

use anyhow::Result;
use sb_daemon::gateway::protocol::WireEvent;
use sb_daemon::ServerMessage;

use crate::client::Endpoint;
use crate::output::{event_line, OutputFormat};

/// Follow bus events until interrupted. With `since`, events after that
/// seq are replayed first (as far as the daemon still retains them).
pub async fn tail(endpoint: &Endpoint, since: Option<u64>, format: OutputFormat) -> Result<()> {
    let mut client = endpoint.connect(since).await?;
    loop {
        let msg = tokio::select! {
            msg = client.next() => msg?,
            _ = tokio::signal::ctrl_c() => break,
        };
        match msg {
            ServerMessage::Event(event) => print_event(&event, format)?,
            ServerMessage::SyncResponse { events, gap, .. } => {
                if let Some(gap) = gap {
                    print_gap(gap.from, gap.to);
                }
                for event in &events {
                    print_event(event, format)?;
                }
            }
            ServerMessage::Gap(gap) => print_gap(gap.from, gap.to),
            _ => {}
        }
    }
    client.close().await;
    Ok(())
}

fn print_event(event: &WireEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", event_line(event)),
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
    }
    Ok(())
}

fn print_gap(from: u64, to: u64) {
    eprintln!("warning: events {from}..={to} are no longer retained");
}
