// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI crate.

use std::path::PathBuf;
use std::time::Duration;

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

// --- State directory ---

/// Resolve state directory: SB_STATE_DIR > XDG_STATE_HOME/sb > ~/.local/state/sb
pub fn state_dir() -> Option<PathBuf> {
    if let Some(dir) = non_empty("SB_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("sb"));
    }
    let home = non_empty("HOME")?;
    Some(PathBuf::from(home).join(".local/state/sb"))
}

// --- Gateway ---

pub fn url() -> Option<String> {
    non_empty("SB_URL")
}

pub fn shared_secret() -> Option<String> {
    non_empty("SB_SHARED_SECRET")
}

pub fn client_id() -> Option<String> {
    non_empty("SB_CLIENT_ID")
}

/// How long to wait for the daemon to answer a request
pub fn timeout_reply_ms() -> Option<Duration> {
    std::env::var("SB_TIMEOUT_REPLY_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

// --- Color ---

pub fn no_color() -> bool {
    std::env::var("NO_COLOR").is_ok_and(|v| v == "1")
}

pub fn force_color() -> bool {
    std::env::var("COLOR").is_ok_and(|v| v == "1")
}
