// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Resolve state directory: SB_STATE_DIR > XDG_STATE_HOME/sb > ~/.local/state/sb
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("SB_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("sb"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local/state/sb"))
        .ok_or(ConfigError::NoStateDir)
}

/// Explicit config file location
pub fn config_file() -> Option<PathBuf> {
    std::env::var("SB_CONFIG").ok().map(PathBuf::from)
}

pub fn bind() -> Option<String> {
    non_empty("SB_BIND")
}

pub fn shared_secret() -> Option<String> {
    non_empty("SB_SHARED_SECRET")
}

pub fn agent_command() -> Option<String> {
    non_empty("SB_AGENT_COMMAND")
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
