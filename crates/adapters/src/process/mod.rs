// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process adapter: agent processes hosted in tmux
//!
//! Each session owns one tmux session named `<prefix><name>`. Its output is
//! piped to a file that a watcher task tails and classifies; the resulting
//! [`OutputEnvelope`]s all land on a single channel owned by the caller.

mod watcher;
mod workspace;

use crate::session::{SessionAdapter, SessionError};
use parking_lot::Mutex;
use sb_core::{OutputEnvelope, SessionId, SessionMode, WorkspaceKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use watcher::{start_watcher, OnGone, WatcherConfig, WatcherControl, WatcherHandle};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("process not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Agent command run in each new session
    pub command: String,
    /// Prefix marking tmux sessions as ours
    pub prefix: String,
    pub pipes_dir: PathBuf,
    pub workspaces_dir: PathBuf,
    /// Key sent by `interrupt`
    pub interrupt_key: String,
    pub poll_interval: Duration,
    pub quiet_after: Duration,
}

impl ProcessConfig {
    pub fn new(pipes_dir: impl Into<PathBuf>, workspaces_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: "claude".to_string(),
            prefix: "sb-".to_string(),
            pipes_dir: pipes_dir.into(),
            workspaces_dir: workspaces_dir.into(),
            interrupt_key: "Escape".to_string(),
            poll_interval: crate::env::watcher_poll(),
            quiet_after: crate::env::quiet_after(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub id: SessionId,
    pub name: String,
    pub project_path: PathBuf,
    pub mode: SessionMode,
    pub workspace: WorkspaceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub process_ref: String,
    pub workspace_path: PathBuf,
}

/// A prefixed tmux session found by [`ProcessAdapter::discover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProcess {
    pub process_ref: String,
    /// Session name with the prefix removed
    pub name: String,
    pub cwd: PathBuf,
}

struct Attached {
    process_ref: String,
    watcher: WatcherHandle,
    /// Distinguishes this watcher from a later one for the same session
    generation: u64,
}

#[derive(Clone)]
pub struct ProcessAdapter<S: SessionAdapter> {
    sessions: S,
    config: Arc<ProcessConfig>,
    attached: Arc<Mutex<HashMap<SessionId, Attached>>>,
    generations: Arc<AtomicU64>,
    output_tx: mpsc::Sender<OutputEnvelope>,
}

/// Replace characters tmux treats specially in session names.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect()
}

impl<S: SessionAdapter> ProcessAdapter<S> {
    pub fn new(sessions: S, config: ProcessConfig, output_tx: mpsc::Sender<OutputEnvelope>) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
            attached: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            output_tx,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn process_ref_for(&self, name: &str) -> String {
        format!("{}{}", self.config.prefix, sanitize_name(name))
    }

    fn pipe_path(&self, process_ref: &str) -> PathBuf {
        self.config.pipes_dir.join(format!("{process_ref}.log"))
    }

    fn process_ref(&self, id: &SessionId) -> Option<String> {
        self.attached.lock().get(id).map(|a| a.process_ref.clone())
    }

    pub fn is_attached(&self, id: &SessionId) -> bool {
        self.attached.lock().contains_key(id)
    }

    /// Start an agent process for a new session.
    ///
    /// Output is piped from the first byte but nobody reads it until
    /// [`ProcessAdapter::watch`] is called.
    pub async fn spawn(&self, req: SpawnRequest) -> Result<ProcessHandle, ProcessError> {
        let process_ref = self.process_ref_for(&req.name);
        let workspace_path = workspace::prepare(
            req.workspace,
            &req.project_path,
            &self.config.workspaces_dir,
            &sanitize_name(&req.name),
        )
        .await
        .map_err(ProcessError::Workspace)?;

        tokio::fs::create_dir_all(&self.config.pipes_dir).await?;
        let pipe_path = self.pipe_path(&process_ref);
        tokio::fs::write(&pipe_path, b"").await?;

        let env = vec![
            ("SB_SESSION_ID".to_string(), req.id.to_string()),
            ("SB_SESSION_NAME".to_string(), req.name.clone()),
            ("SB_MODE".to_string(), req.mode.as_str().to_string()),
        ];
        let spawned = self
            .sessions
            .spawn(&process_ref, &workspace_path, &self.config.command, &env)
            .await?;

        if let Err(e) = self.sessions.pipe_output(&spawned, &pipe_path).await {
            let _ = self.sessions.kill(&spawned).await;
            return Err(e.into());
        }

        tracing::info!(
            session_id = %req.id,
            process_ref = %spawned,
            workspace = %workspace_path.display(),
            "agent process spawned"
        );
        Ok(ProcessHandle {
            process_ref: spawned,
            workspace_path,
        })
    }

    /// Start tailing a process's output, from the beginning of its pipe
    /// file or from the current end.
    pub async fn watch(
        &self,
        id: &SessionId,
        process_ref: &str,
        from_start: bool,
    ) -> Result<(), ProcessError> {
        tokio::fs::create_dir_all(&self.config.pipes_dir).await?;
        let pipe_path = self.pipe_path(process_ref);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&pipe_path)
            .await?;
        let offset = if from_start {
            0
        } else {
            file.metadata().await?.len()
        };
        // No-op when the pane is already piped (e.g. by an earlier daemon)
        self.sessions.pipe_output(process_ref, &pipe_path).await?;

        tracing::debug!(session_id = %id, process_ref, offset, "watching output");
        self.start(id.clone(), process_ref.to_string(), pipe_path, offset);
        Ok(())
    }

    /// Resume watching a process that outlived us. Output printed before
    /// the attach is not replayed.
    pub async fn attach(&self, id: &SessionId, process_ref: &str) -> Result<(), ProcessError> {
        if !self.sessions.is_alive(process_ref).await.unwrap_or(false) {
            return Err(ProcessError::NotFound(process_ref.to_string()));
        }
        self.watch(id, process_ref, false).await?;
        tracing::info!(session_id = %id, process_ref, "attached to process");
        Ok(())
    }

    fn start(&self, id: SessionId, process_ref: String, pipe_path: PathBuf, offset: u64) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        // An exited process must not stay reachable through its session id,
        // or a later kill would hit whatever reuses the tmux name
        let on_gone: OnGone = {
            let attached = Arc::clone(&self.attached);
            let id = id.clone();
            Box::new(move || {
                let mut attached = attached.lock();
                if attached.get(&id).is_some_and(|a| a.generation == generation) {
                    attached.remove(&id);
                }
            })
        };

        // Held across the spawn so an instant exit cannot run before the insert
        let mut attached = self.attached.lock();
        let watcher = start_watcher(
            WatcherConfig {
                session_id: id.clone(),
                process_ref: process_ref.clone(),
                pipe_path,
                offset,
                poll_interval: self.config.poll_interval,
                quiet_after: self.config.quiet_after,
                on_gone,
            },
            self.sessions.clone(),
            self.output_tx.clone(),
        );
        // Replacing an entry drops the old watcher's shutdown sender
        attached.insert(
            id,
            Attached {
                process_ref,
                watcher,
                generation,
            },
        );
    }

    /// Type `text` and submit it. False if the process is unknown or gone.
    pub async fn write(&self, id: &SessionId, text: &str) -> bool {
        let Some(process_ref) = self.process_ref(id) else {
            return false;
        };
        let result = async {
            self.sessions.send_literal(&process_ref, text).await?;
            self.sessions.send_enter(&process_ref).await
        }
        .await;
        report(id, "write", result)
    }

    pub async fn interrupt(&self, id: &SessionId) -> bool {
        let Some(process_ref) = self.process_ref(id) else {
            return false;
        };
        let result = self
            .sessions
            .send_key(&process_ref, &self.config.interrupt_key)
            .await;
        report(id, "interrupt", result)
    }

    /// Answer the prompt on screen: Enter accepts the highlighted default,
    /// Escape declines.
    pub async fn respond_permission(&self, id: &SessionId, approved: bool) -> bool {
        let Some(process_ref) = self.process_ref(id) else {
            return false;
        };
        let result = if approved {
            self.sessions.send_enter(&process_ref).await
        } else {
            self.sessions.send_key(&process_ref, "Escape").await
        };
        let delivered = report(id, "permission response", result);
        if delivered {
            if let Some(attached) = self.attached.lock().get(id) {
                let _ = attached
                    .watcher
                    .control
                    .try_send(WatcherControl::PromptResolved);
            }
        }
        delivered
    }

    /// Current visible pane contents, optionally with escape sequences.
    pub async fn capture(&self, id: &SessionId, escapes: bool) -> Result<String, ProcessError> {
        let process_ref = self
            .process_ref(id)
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))?;
        Ok(self.sessions.capture_pane(&process_ref, escapes).await?)
    }

    /// Stop watching and kill the process. True only the first time.
    pub async fn kill(&self, id: &SessionId) -> bool {
        let Some(attached) = self.attached.lock().remove(id) else {
            return false;
        };
        let _ = attached.watcher.shutdown.send(());
        self.kill_unwatched(&attached.process_ref).await;
        tracing::info!(session_id = %id, process_ref = %attached.process_ref, "process killed");
        true
    }

    /// Kill a tmux session nothing watches any more, such as the dead pane
    /// left behind by an exited process, and remove its pipe file.
    pub async fn kill_unwatched(&self, process_ref: &str) {
        if let Err(e) = self.sessions.kill(process_ref).await {
            tracing::warn!(process_ref, error = %e, "failed to kill process");
        }
        let _ = tokio::fs::remove_file(self.pipe_path(process_ref)).await;
    }

    /// Stop watching without touching the process.
    pub fn detach(&self, id: &SessionId) {
        if let Some(attached) = self.attached.lock().remove(id) {
            let _ = attached.watcher.shutdown.send(());
        }
    }

    pub fn detach_all(&self) {
        let drained: Vec<_> = self.attached.lock().drain().collect();
        for (_, attached) in drained {
            let _ = attached.watcher.shutdown.send(());
        }
    }

    pub async fn is_alive(&self, process_ref: &str) -> bool {
        self.sessions.is_alive(process_ref).await.unwrap_or(false)
    }

    /// Live tmux sessions carrying our prefix.
    pub async fn discover(&self) -> Result<Vec<DiscoveredProcess>, ProcessError> {
        let panes = self.sessions.list_sessions().await?;
        Ok(panes
            .into_iter()
            .filter_map(|pane| {
                let name = pane.name.strip_prefix(&self.config.prefix)?.to_string();
                Some(DiscoveredProcess {
                    process_ref: pane.name,
                    name,
                    cwd: pane.cwd,
                })
            })
            .collect())
    }
}

fn report(id: &SessionId, what: &str, result: Result<(), SessionError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "{} not delivered", what);
            false
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
