// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake multiplexer for tests.
//!
//! Sessions live in memory. When a session's output is piped, text passed
//! to [`FakeSessionAdapter::emit`] is appended to the pipe file, so watcher
//! code can be exercised end to end without tmux.
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{PaneInfo, SessionAdapter, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Spawn {
        name: String,
        cwd: PathBuf,
        cmd: String,
        env: Vec<(String, String)>,
    },
    SendLiteral {
        id: String,
        text: String,
    },
    SendKey {
        id: String,
        key: String,
    },
    Kill {
        id: String,
    },
    CapturePane {
        id: String,
        escapes: bool,
    },
    PipeOutput {
        id: String,
        path: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub name: String,
    pub cwd: PathBuf,
    pub cmd: String,
    pub env: Vec<(String, String)>,
    /// What `capture_pane` returns
    pub pane: String,
    pub alive: bool,
    pub exit_code: Option<i32>,
    pub pipe: Option<PathBuf>,
}

#[derive(Default)]
struct FakeState {
    sessions: BTreeMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    fail_spawn: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    pub fn get_session(&self, id: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(id).cloned()
    }

    /// Keys and literal text sent to `id`, in order (`Enter` shown as `<Enter>`).
    pub fn typed(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SessionCall::SendLiteral { id: sid, text } if sid == id => Some(text.clone()),
                SessionCall::SendKey { id: sid, key } if sid == id => Some(format!("<{key}>")),
                _ => None,
            })
            .collect()
    }

    /// Register a session that exists before the adapter's user starts.
    pub fn add_session(&self, name: &str, cwd: &Path, alive: bool) {
        self.inner.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                name: name.to_string(),
                cwd: cwd.to_path_buf(),
                cmd: String::new(),
                env: Vec::new(),
                pane: String::new(),
                alive,
                exit_code: None,
                pipe: None,
            },
        );
    }

    pub fn set_pane(&self, id: &str, pane: &str) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.pane = pane.to_string();
        }
    }

    pub fn set_exited(&self, id: &str, exit_code: i32) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.alive = false;
            session.exit_code = Some(exit_code);
        }
    }

    /// Make the next `spawn` fail with `reason`.
    pub fn fail_next_spawn(&self, reason: &str) {
        self.inner.lock().fail_spawn = Some(reason.to_string());
    }

    /// Print `text` in the session's pane. Returns false if output is not piped.
    pub fn emit(&self, id: &str, text: &str) -> bool {
        let pipe = {
            let inner = self.inner.lock();
            match inner.sessions.get(id) {
                Some(FakeSession {
                    alive: true,
                    pipe: Some(path),
                    ..
                }) => path.clone(),
                _ => return false,
            }
        };
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(pipe)
            .and_then(|mut f| f.write_all(text.as_bytes()))
            .is_ok()
    }

    fn record(&self, call: SessionCall) {
        self.inner.lock().calls.push(call);
    }

    fn require_alive(&self, id: &str) -> Result<(), SessionError> {
        match self.inner.lock().sessions.get(id) {
            Some(session) if session.alive => Ok(()),
            _ => Err(SessionError::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Spawn {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
            env: env.to_vec(),
        });
        if let Some(reason) = inner.fail_spawn.take() {
            return Err(SessionError::SpawnFailed(reason));
        }
        inner.sessions.insert(
            name.to_string(),
            FakeSession {
                name: name.to_string(),
                cwd: cwd.to_path_buf(),
                cmd: cmd.to_string(),
                env: env.to_vec(),
                pane: String::new(),
                alive: true,
                exit_code: None,
                pipe: None,
            },
        );
        Ok(name.to_string())
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        self.record(SessionCall::SendLiteral {
            id: id.to_string(),
            text: text.to_string(),
        });
        self.require_alive(id)
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        self.send_key(id, "Enter").await
    }

    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError> {
        self.record(SessionCall::SendKey {
            id: id.to_string(),
            key: key.to_string(),
        });
        self.require_alive(id)
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Kill { id: id.to_string() });
        inner.sessions.remove(id);
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(id)
            .is_some_and(|s| s.alive))
    }

    async fn capture_pane(&self, id: &str, escapes: bool) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::CapturePane {
            id: id.to_string(),
            escapes,
        });
        inner
            .sessions
            .get(id)
            .map(|s| s.pane.clone())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn pipe_output(&self, id: &str, path: &Path) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::PipeOutput {
            id: id.to_string(),
            path: path.to_path_buf(),
        });
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.pipe.get_or_insert_with(|| path.to_path_buf());
                Ok(())
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<PaneInfo>, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .filter(|s| s.alive)
            .map(|s| PaneInfo {
                name: s.name.clone(),
                cwd: s.cwd.clone(),
            })
            .collect())
    }

    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        Ok(self.inner.lock().sessions.get(id).and_then(|s| s.exit_code))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
