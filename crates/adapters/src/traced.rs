// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing wrapper for multiplexer adapters

use crate::session::{PaneInfo, SessionAdapter, SessionError};
use async_trait::async_trait;
use std::path::Path;
use tracing::Instrument;

/// Wrapper that adds spans, timing and failure logs to any SessionAdapter
#[derive(Clone)]
pub struct TracedSession<S> {
    inner: S,
}

impl<S> TracedSession<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SessionAdapter> SessionAdapter for TracedSession<S> {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        async {
            tracing::info!(cmd, env_count = env.len(), "starting");
            let start = std::time::Instant::now();
            let result = self.inner.spawn(name, cwd, cmd, env).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(id) => tracing::info!(session = id.as_str(), elapsed_ms, "session created"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "spawn failed"),
            }
            result
        }
        .instrument(tracing::info_span!("session.spawn", name, cwd = %cwd.display()))
        .await
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        tracing::info_span!("session.send", id)
            .in_scope(|| tracing::debug!(input_len = text.len(), "sending"));
        let result = self.inner.send_literal(id, text).await;
        if let Err(ref e) = result {
            tracing::warn!(id, error = %e, "send failed");
        }
        result
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        let result = self.inner.send_enter(id).await;
        if let Err(ref e) = result {
            tracing::warn!(id, error = %e, "send_enter failed");
        }
        result
    }

    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError> {
        let result = self.inner.send_key(id, key).await;
        tracing::info_span!("session.key", id, key).in_scope(|| match &result {
            Ok(()) => tracing::debug!("sent"),
            Err(e) => tracing::warn!(error = %e, "send_key failed"),
        });
        result
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let result = self.inner.kill(id).await;
        tracing::info_span!("session.kill", id).in_scope(|| match &result {
            Ok(()) => tracing::info!("killed"),
            Err(e) => tracing::warn!(error = %e, "kill failed (may be expected)"),
        });
        result
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let result = self.inner.is_alive(id).await;
        tracing::trace!(id, alive = ?result.as_ref().ok(), "checked");
        result
    }

    async fn capture_pane(&self, id: &str, escapes: bool) -> Result<String, SessionError> {
        let result = self.inner.capture_pane(id, escapes).await;
        tracing::info_span!("session.capture", id, escapes).in_scope(|| {
            tracing::debug!(
                captured_len = result.as_ref().map(|s| s.len()).ok(),
                "captured"
            )
        });
        result
    }

    async fn pipe_output(&self, id: &str, path: &Path) -> Result<(), SessionError> {
        let result = self.inner.pipe_output(id, path).await;
        tracing::info_span!("session.pipe", id, path = %path.display()).in_scope(|| {
            match &result {
                Ok(()) => tracing::info!("output piped"),
                Err(e) => tracing::error!(error = %e, "pipe-pane failed"),
            }
        });
        result
    }

    async fn list_sessions(&self) -> Result<Vec<PaneInfo>, SessionError> {
        let result = self.inner.list_sessions().await;
        tracing::trace!(count = result.as_ref().map(|v| v.len()).ok(), "listed sessions");
        result
    }

    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        self.inner.get_exit_code(id).await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
