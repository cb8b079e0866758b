// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::ValueEnum;
use sb_daemon::gateway::protocol::WireEvent;
use serde::Serialize;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a pane capture with box-drawing characters around it.
pub fn print_capture_frame(session: &str, text: &str) {
    println!(
        "╭────── {} ──────",
        crate::color::header(&format!("capture: {session}"))
    );
    print!("{text}");
    if !text.is_empty() && !text.ends_with('\n') {
        println!();
    }
    println!("╰────── {} ──────", crate::color::header("end capture"));
}

/// Pretty-print any serializable value as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format seconds as a short human-readable duration: `"5s"`, `"2m"`, `"1h30m"`, `"3d"`.
pub fn format_elapsed(secs: u64) -> String {
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => {
            let (h, m) = (secs / 3600, (secs % 3600) / 60);
            if m > 0 {
                format!("{h}h{m}m")
            } else {
                format!("{h}h")
            }
        }
        _ => format!("{}d", secs / 86_400),
    }
}

/// Relative time between two epoch-ms instants; `"-"` for unset timestamps.
pub fn format_since(epoch_ms: u64, now_ms: u64) -> String {
    if epoch_ms == 0 {
        return "-".to_string();
    }
    format_elapsed(now_ms.saturating_sub(epoch_ms) / 1000)
}

/// One line per bus event: `#<seq> <name>[:<action>] <payload>`
pub fn event_line(event: &WireEvent) -> String {
    let name = match &event.action {
        Some(action) => format!("{}:{}", event.name, action),
        None => event.name.clone(),
    };
    format!(
        "{} {} {}",
        crate::color::muted(&format!("#{}", event.seq)),
        name,
        event.payload
    )
}
