// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: state paths, the optional TOML file and
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Invalid config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Failed to write shared secret {0}: {1}")]
    Secret(PathBuf, #[source] std::io::Error),
}

/// Tunables read from `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bind: String,
    pub shared_secret: Option<String>,
    pub agent_command: String,
    pub session_prefix: String,
    pub interrupt_key: String,
    pub replay_buffer_chunks: usize,
    pub replay_buffer_bytes: usize,
    pub bus_retention: usize,
    pub heartbeat_secs: u64,
    pub sse_retry_ms: u64,
    pub auth_timeout_secs: u64,
    pub discovery_interval_secs: u64,
    pub watcher_poll_ms: u64,
    pub quiet_after_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7420".to_string(),
            shared_secret: None,
            agent_command: "claude".to_string(),
            session_prefix: "sb-".to_string(),
            interrupt_key: "Escape".to_string(),
            replay_buffer_chunks: 500,
            replay_buffer_bytes: 256 * 1024,
            bus_retention: 1000,
            heartbeat_secs: 15,
            sse_retry_ms: 3000,
            auth_timeout_secs: 10,
            discovery_interval_secs: 30,
            watcher_poll_ms: 1000,
            quiet_after_ms: 3000,
        }
    }
}

impl Settings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn sse_retry(&self) -> Duration {
        Duration::from_millis(self.sse_retry_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs.max(1))
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs.max(1))
    }

    pub fn watcher_poll(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_ms.max(10))
    }

    pub fn quiet_after(&self) -> Duration {
        Duration::from_millis(self.quiet_after_ms)
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/sb)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Raw pane output, one file per session
    pub pipes_dir: PathBuf,
    /// Worktrees and copies for isolated sessions
    pub workspaces_dir: PathBuf,
    /// Generated shared secret, when none is configured
    pub secret_path: PathBuf,
    pub settings: Settings,
    /// Resolved shared secret
    pub shared_secret: String,
}

impl Config {
    /// Load configuration for the user-level daemon.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = crate::env::state_dir()?;
        let file = crate::env::config_file().unwrap_or_else(|| state_dir.join("config.toml"));
        Self::load_from(state_dir, &file)
    }

    /// Load with an explicit state directory, reading `<state_dir>/config.toml`
    /// if present.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let state_dir = state_dir.into();
        let file = state_dir.join("config.toml");
        Self::load_from(state_dir, &file)
    }

    fn load_from(state_dir: PathBuf, file: &Path) -> Result<Self, ConfigError> {
        let mut settings = read_settings(file)?;
        if let Some(bind) = crate::env::bind() {
            settings.bind = bind;
        }
        if let Some(secret) = crate::env::shared_secret() {
            settings.shared_secret = Some(secret);
        }
        if let Some(command) = crate::env::agent_command() {
            settings.agent_command = command;
        }

        let secret_path = state_dir.join("secret");
        let shared_secret = match settings.shared_secret.clone() {
            Some(secret) => secret,
            None => load_or_create_secret(&secret_path)?,
        };

        Ok(Self {
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            pipes_dir: state_dir.join("pipes"),
            workspaces_dir: state_dir.join("workspaces"),
            secret_path,
            state_dir,
            settings,
            shared_secret,
        })
    }
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(e) => Err(ConfigError::Read(path.to_path_buf(), e)),
    }
}

/// Read the generated secret, creating it (mode 0600) on first use.
fn load_or_create_secret(path: &Path) -> Result<String, ConfigError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if let Ok(existing) = std::fs::read_to_string(path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }
    let err = |e| ConfigError::Secret(path.to_path_buf(), e);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    let secret: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(err)?;
    writeln!(file, "{secret}").map_err(err)?;
    tracing::info!(path = %path.display(), "generated shared secret");
    Ok(secret)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
