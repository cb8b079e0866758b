// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer adapters

mod tmux;

pub use tmux::TmuxAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from multiplexer operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// A live multiplexer session seen by [`SessionAdapter::list_sessions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub name: String,
    pub cwd: PathBuf,
}

/// Contract required of the process host backing each agent.
///
/// Ids are the multiplexer's own session names; adapters add no prefix.
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Start `cmd` detached in a new session called `name`, returning its id.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    /// Type text without key-name interpretation.
    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError>;

    async fn send_enter(&self, id: &str) -> Result<(), SessionError>;

    /// Send a named key (`Escape`, `C-c`).
    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError>;

    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    /// Visible pane contents, with escape sequences when `escapes` is set.
    async fn capture_pane(&self, id: &str, escapes: bool) -> Result<String, SessionError>;

    /// Append everything the pane prints to `path`.
    async fn pipe_output(&self, id: &str, path: &Path) -> Result<(), SessionError>;

    async fn list_sessions(&self) -> Result<Vec<PaneInfo>, SessionError>;

    /// Exit code of the pane's process, once it has exited.
    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError>;
}
