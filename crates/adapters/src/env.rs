// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Pipe watcher poll interval (default: 1000ms).
pub fn watcher_poll() -> Duration {
    parse_duration_ms("SB_WATCHER_POLL_MS").unwrap_or(Duration::from_secs(1))
}

/// Output silence after which a working agent is reported idle (default: 3000ms).
pub fn quiet_after() -> Duration {
    parse_duration_ms("SB_QUIET_MS").unwrap_or(Duration::from_secs(3))
}
