// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background output watcher
//!
//! Tails a session's pipe file from a byte offset, classifies the new bytes
//! and forwards the resulting events. File notifications wake the loop
//! promptly; a poll tick catches anything they miss and checks liveness.

use crate::classifier::OutputClassifier;
use crate::session::SessionAdapter;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use sb_core::{OutputEnvelope, SessionEvent, SessionId};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// Most bytes read from the pipe file in one pass.
const READ_CHUNK: u64 = 64 * 1024;

/// Messages from the adapter to a running watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatcherControl {
    /// A permission response was sent to the pane
    PromptResolved,
}

/// Runs once when the watcher sees the process exit, before `ProcessGone`
/// is sent.
pub(crate) type OnGone = Box<dyn FnOnce() + Send>;

pub(crate) struct WatcherConfig {
    pub session_id: SessionId,
    pub process_ref: String,
    pub pipe_path: PathBuf,
    /// Byte offset to start reading from
    pub offset: u64,
    pub poll_interval: Duration,
    pub quiet_after: Duration,
    pub on_gone: OnGone,
}

pub(crate) struct WatcherHandle {
    pub shutdown: oneshot::Sender<()>,
    pub control: mpsc::Sender<WatcherControl>,
}

/// Spawn the watcher task. Dropping or firing `shutdown` stops it.
pub(crate) fn start_watcher<S: SessionAdapter>(
    config: WatcherConfig,
    sessions: S,
    output_tx: mpsc::Sender<OutputEnvelope>,
) -> WatcherHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (control_tx, control_rx) = mpsc::channel(8);
    tokio::spawn(watch_output(
        config,
        sessions,
        output_tx,
        shutdown_rx,
        control_rx,
    ));
    WatcherHandle {
        shutdown: shutdown_tx,
        control: control_tx,
    }
}

struct Tail {
    session_id: SessionId,
    path: PathBuf,
    offset: u64,
    classifier: OutputClassifier,
    output_tx: mpsc::Sender<OutputEnvelope>,
    last_output: Instant,
}

impl Tail {
    /// Read and forward everything appended since the last pass.
    /// Returns false once nobody is listening.
    async fn drain(&mut self) -> bool {
        loop {
            let bytes = match read_from(&self.path, &mut self.offset).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(
                        session_id = %self.session_id,
                        error = %e,
                        "pipe file unreadable"
                    );
                    return true;
                }
            };
            if bytes.is_empty() {
                return true;
            }
            self.last_output = Instant::now();
            for event in self.classifier.feed(&bytes) {
                if !self.send(event).await {
                    return false;
                }
            }
        }
    }

    async fn send(&self, event: SessionEvent) -> bool {
        self.output_tx
            .send(OutputEnvelope::new(self.session_id.clone(), event))
            .await
            .is_ok()
    }
}

async fn read_from(path: &Path, offset: &mut u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    if len < *offset {
        // Truncated underneath us
        *offset = 0;
    }
    if len == *offset {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(*offset)).await?;
    let mut buf = Vec::new();
    file.take(READ_CHUNK).read_to_end(&mut buf).await?;
    *offset += buf.len() as u64;
    Ok(buf)
}

async fn watch_output<S: SessionAdapter>(
    config: WatcherConfig,
    sessions: S,
    output_tx: mpsc::Sender<OutputEnvelope>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut control_rx: mpsc::Receiver<WatcherControl>,
) {
    let WatcherConfig {
        session_id,
        process_ref,
        pipe_path,
        offset,
        poll_interval,
        quiet_after,
        on_gone,
    } = config;
    let mut on_gone = Some(on_gone);

    let (file_tx, mut file_rx) = mpsc::channel(32);
    let _watcher_guard = match create_file_watcher(&pipe_path, file_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(
                %session_id,
                error = %e,
                "failed to create file watcher, relying on polling"
            );
            None
        }
    };

    tracing::debug!(
        %session_id,
        process_ref,
        offset,
        pipe = %pipe_path.display(),
        "output watcher started"
    );

    let mut tail = Tail {
        session_id: session_id.clone(),
        path: pipe_path,
        offset,
        classifier: OutputClassifier::new(),
        output_tx,
        last_output: Instant::now(),
    };
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            Some(_) = file_rx.recv() => {
                if !tail.drain().await {
                    break;
                }
            }

            _ = poll.tick() => {
                if !tail.drain().await {
                    break;
                }
                if tail.last_output.elapsed() >= quiet_after {
                    if let Some(event) = tail.classifier.quiet() {
                        if !tail.send(event).await {
                            break;
                        }
                    }
                }
                if is_gone(&sessions, &process_ref).await {
                    // Whatever the process printed last still counts
                    tail.drain().await;
                    let exit_code = sessions.get_exit_code(&process_ref).await.ok().flatten();
                    tracing::info!(%session_id, process_ref, ?exit_code, "process gone");
                    if let Some(on_gone) = on_gone.take() {
                        on_gone();
                    }
                    tail.send(SessionEvent::ProcessGone { exit_code }).await;
                    break;
                }
            }

            Some(control) = control_rx.recv() => match control {
                WatcherControl::PromptResolved => tail.classifier.resolve_prompt(),
            },

            _ = &mut shutdown_rx => {
                tracing::debug!(%session_id, "watcher shutdown requested");
                break;
            }
        }
    }
}

async fn is_gone<S: SessionAdapter>(sessions: &S, process_ref: &str) -> bool {
    matches!(sessions.is_alive(process_ref).await, Ok(false) | Err(_))
}

fn create_file_watcher(
    path: &Path,
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = tx.try_send(());
        }
    })?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
