// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: the single writer of session state.
//!
//! Every status change goes through [`Session::apply`] while the registry
//! lock is held, and every change is fanned out (session feed and event
//! bus) inside the same critical section, so observers see changes in the
//! order they were applied.

mod buffer;

pub use buffer::BufferedChunk;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use buffer::OutputBuffer;
use parking_lot::Mutex;
use sb_adapters::{ProcessAdapter, ProcessError, SessionAdapter, SpawnRequest};
use sb_core::{
    BusEvent, ClientId, Clock, IdGen, NewSession, OutputEnvelope, Session, SessionEvent,
    SessionId, SessionMode, SessionStatus, StatusTrigger, UuidIdGen, WorkspaceKind,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::event_bus::EventBus;

const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("a live session is already named {0:?}")]
    NameConflict(String),
    #[error("invalid session name: {0:?}")]
    InvalidName(String),
    #[error("session {0} is not offline")]
    NotOffline(SessionId),
    #[error("spawn failed: {0}")]
    Spawn(#[source] ProcessError),
    #[error("capture failed: {0}")]
    Capture(#[source] ProcessError),
    #[error("discovery failed: {0}")]
    Discovery(#[source] ProcessError),
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub name: String,
    pub project_path: PathBuf,
    pub mode: SessionMode,
    pub workspace: WorkspaceKind,
}

/// Per-session changes fanned out to gateway connections.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFeed {
    Output {
        session_id: SessionId,
        chunk_seq: u64,
        raw: String,
        text: String,
    },
    Status {
        session_id: SessionId,
        name: String,
        status: SessionStatus,
    },
    /// Typed classifier event other than plain output
    Event {
        session_id: SessionId,
        event: SessionEvent,
    },
    Removed {
        session_id: SessionId,
    },
}

/// A feed change with its registry-wide feed sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub seq: u64,
    pub change: SessionFeed,
}

impl SessionFeed {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionFeed::Output { session_id, .. }
            | SessionFeed::Status { session_id, .. }
            | SessionFeed::Event { session_id, .. }
            | SessionFeed::Removed { session_id } => session_id,
        }
    }
}

/// Result of [`SessionRegistry::connect_client`].
#[derive(Debug, Clone)]
pub struct ClientAttachment {
    pub session: Session,
    /// Retained output, oldest first (empty unless replay was requested)
    pub buffer: Vec<BufferedChunk>,
    pub last_chunk_seq: u64,
    /// Feed items at or below this seq are already reflected in the
    /// snapshot
    pub feed_seq: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub replay_chunks: usize,
    pub replay_bytes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            replay_chunks: 500,
            replay_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Untracked processes taken over
    pub adopted: usize,
    /// Tracked sessions whose process vanished
    pub offlined: usize,
    /// Offline sessions whose process is running again
    pub revived: usize,
}

struct Entry {
    session: Session,
    buffer: OutputBuffer,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Entry>,
    /// Names (and their process refs) with a spawn in flight
    reserved: HashMap<String, String>,
}

impl RegistryState {
    /// True if a live session, or a spawn in flight, owns `process_ref`.
    fn process_ref_in_use(&self, process_ref: &str) -> bool {
        self.reserved.values().any(|r| r == process_ref)
            || self
                .sessions
                .values()
                .any(|e| e.session.process_ref == process_ref && !e.session.is_offline())
    }

    fn name_taken(&self, name: &str) -> bool {
        self.reserved.contains_key(name)
            || self
                .sessions
                .values()
                .any(|e| e.session.name == name && !e.session.is_offline())
    }
}

pub struct SessionRegistry<S: SessionAdapter, C: Clock> {
    state: Mutex<RegistryState>,
    process: ProcessAdapter<S>,
    bus: EventBus<C>,
    clock: C,
    feed: broadcast::Sender<FeedItem>,
    /// Only advanced under the state lock
    feed_seq: AtomicU64,
    ids: UuidIdGen,
    config: RegistryConfig,
}

impl<S: SessionAdapter, C: Clock> SessionRegistry<S, C> {
    pub fn new(
        process: ProcessAdapter<S>,
        bus: EventBus<C>,
        clock: C,
        config: RegistryConfig,
    ) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: Mutex::new(RegistryState::default()),
            process,
            bus,
            clock,
            feed,
            feed_seq: AtomicU64::new(0),
            ids: UuidIdGen::with_prefix("s-"),
            config,
        }
    }

    pub fn bus(&self) -> &EventBus<C> {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedItem> {
        self.feed.subscribe()
    }

    fn new_buffer(&self) -> OutputBuffer {
        OutputBuffer::new(self.config.replay_chunks, self.config.replay_bytes)
    }

    fn send_feed(&self, change: SessionFeed) {
        let seq = self.feed_seq.fetch_add(1, Ordering::SeqCst) + 1;
        // No receivers is fine
        let _ = self.feed.send(FeedItem { seq, change });
    }

    fn publish_status(&self, session: &Session) {
        self.send_feed(SessionFeed::Status {
            session_id: session.id.clone(),
            name: session.name.clone(),
            status: session.status(),
        });
        self.bus.emit(BusEvent::AgentStatus {
            session_id: session.id.clone(),
            name: session.name.clone(),
            status: session.status(),
        });
    }

    /// Apply one trigger, publishing the change. Returns whether the
    /// status changed.
    fn transition(&self, session: &mut Session, trigger: StatusTrigger, now_ms: u64) -> bool {
        match session.apply(trigger, now_ms) {
            Ok(Some(status)) => {
                debug!(session_id = %session.id, ?trigger, %status, "status changed");
                self.publish_status(session);
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(session_id = %session.id, error = %e, "status trigger ignored");
                false
            }
        }
    }

    fn apply_trigger(&self, id: &SessionId, trigger: StatusTrigger) {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        if let Some(entry) = state.sessions.get_mut(id) {
            self.transition(&mut entry.session, trigger, now);
        }
    }

    /// Spawn a new agent session.
    pub async fn create(&self, req: CreateSession) -> Result<Session, RegistryError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidName(req.name));
        }
        let process_ref = self.process.process_ref_for(&name);
        {
            let mut state = self.state.lock();
            if state.name_taken(&name) {
                return Err(RegistryError::NameConflict(name));
            }
            state.reserved.insert(name.clone(), process_ref);
        }

        let id: SessionId = self.ids.mint();
        let spawned = self
            .process
            .spawn(SpawnRequest {
                id: id.clone(),
                name: name.clone(),
                project_path: req.project_path.clone(),
                mode: req.mode,
                workspace: req.workspace,
            })
            .await;

        let session = {
            let mut state = self.state.lock();
            state.reserved.remove(&name);
            let handle = spawned.map_err(RegistryError::Spawn)?;
            let session = Session::new(
                NewSession {
                    id: id.clone(),
                    name,
                    process_ref: handle.process_ref,
                    project_path: req.project_path,
                    workspace_path: handle.workspace_path,
                    mode: req.mode,
                    workspace: req.workspace,
                },
                self.clock.epoch_ms(),
            );
            state.sessions.insert(
                id.clone(),
                Entry {
                    session: session.clone(),
                    buffer: self.new_buffer(),
                },
            );
            self.publish_status(&session);
            session
        };
        info!(session_id = %id, name = %session.name, "session created");

        self.start_watching(&session.id, &session.process_ref).await;
        Ok(session)
    }

    async fn start_watching(&self, id: &SessionId, process_ref: &str) {
        if let Err(e) = self.process.watch(id, process_ref, true).await {
            warn!(session_id = %id, error = %e, "cannot watch output");
            self.apply_trigger(id, StatusTrigger::ProcessGone);
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.state.lock().sessions.get(id).map(|e| e.session.clone())
    }

    /// All sessions, oldest first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self
            .state
            .lock()
            .sessions
            .values()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    pub fn find_by_name(&self, name: &str) -> Vec<Session> {
        self.list().into_iter().filter(|s| s.name == name).collect()
    }

    /// Look a session up by id, then by name, preferring a live one.
    pub fn resolve(&self, id_or_name: &str) -> Option<Session> {
        if let Some(session) = self.get(&SessionId::new(id_or_name)) {
            return Some(session);
        }
        let mut named = self.find_by_name(id_or_name);
        named.sort_by_key(|s| s.is_offline());
        named.into_iter().next()
    }

    /// Add `client` to the session's connected set (set semantics).
    pub fn connect_client(
        &self,
        id: &SessionId,
        client: &ClientId,
        replay: bool,
    ) -> Result<ClientAttachment, RegistryError> {
        let mut state = self.state.lock();
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        entry.session.clients.insert(client.clone());
        Ok(ClientAttachment {
            session: entry.session.clone(),
            buffer: if replay {
                entry.buffer.snapshot()
            } else {
                Vec::new()
            },
            last_chunk_seq: entry.buffer.last_seq(),
            feed_seq: self.feed_seq.load(Ordering::SeqCst),
        })
    }

    /// Returns whether the client was connected.
    pub fn disconnect_client(&self, id: &SessionId, client: &ClientId) -> bool {
        self.state
            .lock()
            .sessions
            .get_mut(id)
            .is_some_and(|e| e.session.clients.remove(client))
    }

    pub fn disconnect_client_everywhere(&self, client: &ClientId) {
        for entry in self.state.lock().sessions.values_mut() {
            entry.session.clients.remove(client);
        }
    }

    /// Session that can receive input, or `None` if it is offline.
    fn deliverable(&self, id: &SessionId) -> Result<Option<Session>, RegistryError> {
        let session = self
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok((!session.is_offline()).then_some(session))
    }

    /// Type `text` into the session. Input while a permission prompt is
    /// showing is delivered as-is and leaves the prompt pending.
    pub async fn send_input(&self, id: &SessionId, text: &str) -> Result<bool, RegistryError> {
        if self.deliverable(id)?.is_none() {
            return Ok(false);
        }
        Ok(self.process.write(id, text).await)
    }

    pub async fn send_interrupt(&self, id: &SessionId) -> Result<bool, RegistryError> {
        if self.deliverable(id)?.is_none() {
            return Ok(false);
        }
        Ok(self.process.interrupt(id).await)
    }

    /// Answer a pending permission prompt. Not delivered unless the
    /// session is waiting for one.
    pub async fn send_permission_response(
        &self,
        id: &SessionId,
        approved: bool,
    ) -> Result<bool, RegistryError> {
        let Some(session) = self.deliverable(id)? else {
            return Ok(false);
        };
        if session.status() != SessionStatus::WaitingPermission {
            debug!(session_id = %id, status = %session.status(), "no prompt to answer");
            return Ok(false);
        }
        let delivered = self.process.respond_permission(id, approved).await;
        if delivered {
            self.apply_trigger(id, StatusTrigger::PermissionResolved { approved });
        }
        Ok(delivered)
    }

    pub async fn capture_pane(&self, id: &SessionId, escapes: bool) -> Result<String, RegistryError> {
        if self.get(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        self.process
            .capture(id, escapes)
            .await
            .map_err(RegistryError::Capture)
    }

    /// Kill the process and forget the session. True only the first time.
    pub async fn kill(&self, id: &SessionId) -> bool {
        let (entry, claimed) = {
            let mut state = self.state.lock();
            let Some(entry) = state.sessions.remove(id) else {
                return false;
            };
            self.send_feed(SessionFeed::Removed {
                session_id: id.clone(),
            });
            // An offline session's tmux name may already back a newer session
            let claimed = entry.session.is_offline()
                && state.process_ref_in_use(&entry.session.process_ref);
            (entry, claimed)
        };
        let session = &entry.session;
        if claimed {
            self.process.detach(id);
            debug!(
                session_id = %id,
                process_ref = %session.process_ref,
                "process now belongs to another session, leaving it running"
            );
        } else if !self.process.kill(id).await {
            // Nothing watched it; clear out a dead pane left by the exit
            self.process.kill_unwatched(&session.process_ref).await;
        }
        info!(session_id = %id, name = %session.name, "session killed");
        true
    }

    /// Start a fresh process for an offline session, keeping its id and
    /// name. The process runs in the session's existing workspace.
    pub async fn respawn(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let session = {
            let mut state = self.state.lock();
            let session = state
                .sessions
                .get(id)
                .map(|e| e.session.clone())
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            if !session.is_offline() {
                return Err(RegistryError::NotOffline(id.clone()));
            }
            if state.name_taken(&session.name) {
                return Err(RegistryError::NameConflict(session.name));
            }
            state
                .reserved
                .insert(session.name.clone(), session.process_ref.clone());
            session
        };

        let spawned = self
            .process
            .spawn(SpawnRequest {
                id: id.clone(),
                name: session.name.clone(),
                project_path: session.workspace_path.clone(),
                mode: session.mode,
                workspace: WorkspaceKind::Shared,
            })
            .await;

        let revived = {
            let now = self.clock.epoch_ms();
            let mut state = self.state.lock();
            state.reserved.remove(&session.name);
            let handle = spawned.map_err(RegistryError::Spawn)?;
            let entry = state
                .sessions
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            entry.session.process_ref = handle.process_ref;
            self.transition(&mut entry.session, StatusTrigger::Reattached, now);
            entry.session.clone()
        };
        info!(session_id = %id, name = %revived.name, "session respawned");

        self.start_watching(id, &revived.process_ref).await;
        Ok(revived)
    }

    /// Fold one classifier event into the session's state.
    pub fn apply_output(&self, envelope: OutputEnvelope) {
        let OutputEnvelope { session_id, event } = envelope;
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        let Some(entry) = state.sessions.get_mut(&session_id) else {
            debug!(%session_id, "event for unknown session dropped");
            return;
        };

        let (trigger, typed) = match event {
            SessionEvent::Output {
                raw,
                text,
                activity,
            } => {
                let chunk_seq = entry.buffer.push(raw.clone(), text.clone());
                self.send_feed(SessionFeed::Output {
                    session_id: session_id.clone(),
                    chunk_seq,
                    raw,
                    text,
                });
                (activity.then_some(StatusTrigger::Activity), None)
            }
            other => (other.trigger(), Some(other)),
        };

        if let Some(event) = typed {
            self.send_feed(SessionFeed::Event {
                session_id: session_id.clone(),
                event,
            });
        }
        let Some(trigger) = trigger else {
            return;
        };
        // A pipe that is still talking proves the process is back
        if entry.session.is_offline()
            && matches!(
                trigger,
                StatusTrigger::Activity | StatusTrigger::PermissionRequested
            )
        {
            self.transition(&mut entry.session, StatusTrigger::Reattached, now);
        }
        self.transition(&mut entry.session, trigger, now);
    }

    /// Consume classifier output until every sender is gone.
    pub async fn run(&self, mut rx: mpsc::Receiver<OutputEnvelope>) {
        while let Some(envelope) = rx.recv().await {
            self.apply_output(envelope);
        }
        debug!("output channel closed");
    }

    /// Discovery sweep: adopt untracked prefixed processes, mark sessions
    /// whose process vanished offline, and revive offline sessions whose
    /// process is running again.
    pub async fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        let discovered = self
            .process
            .discover()
            .await
            .map_err(RegistryError::Discovery)?;
        let live: HashSet<&str> = discovered.iter().map(|d| d.process_ref.as_str()).collect();

        let mut report = ReconcileReport::default();
        let mut revive = Vec::new();
        let mut adopt = Vec::new();
        {
            let now = self.clock.epoch_ms();
            let mut state = self.state.lock();
            let RegistryState { sessions, reserved } = &mut *state;
            // A name reused after going offline leaves two sessions on one ref
            let mut claimed: HashSet<String> = sessions
                .values()
                .filter(|e| !e.session.is_offline())
                .map(|e| e.session.process_ref.clone())
                .collect();

            for entry in sessions.values_mut() {
                let session = &mut entry.session;
                if reserved.contains_key(&session.name) {
                    continue;
                }
                let alive = live.contains(session.process_ref.as_str());
                if !alive && !session.is_offline() {
                    self.transition(session, StatusTrigger::ProcessGone, now);
                    report.offlined += 1;
                } else if alive && session.is_offline() && !claimed.contains(&session.process_ref) {
                    claimed.insert(session.process_ref.clone());
                    revive.push((session.id.clone(), session.process_ref.clone()));
                }
            }

            for found in &discovered {
                let tracked = sessions
                    .values()
                    .any(|e| e.session.process_ref == found.process_ref)
                    || reserved.values().any(|r| *r == found.process_ref);
                if tracked {
                    continue;
                }
                let session = Session::new(
                    NewSession {
                        id: self.ids.mint(),
                        name: found.name.clone(),
                        process_ref: found.process_ref.clone(),
                        project_path: found.cwd.clone(),
                        workspace_path: found.cwd.clone(),
                        mode: SessionMode::default(),
                        workspace: WorkspaceKind::Shared,
                    },
                    now,
                );
                self.publish_status(&session);
                adopt.push((session.id.clone(), session.process_ref.clone()));
                sessions.insert(
                    session.id.clone(),
                    Entry {
                        session,
                        buffer: self.new_buffer(),
                    },
                );
            }
        }

        for (id, process_ref) in adopt {
            match self.process.attach(&id, &process_ref).await {
                Ok(()) => {
                    info!(session_id = %id, %process_ref, "adopted running process");
                    report.adopted += 1;
                }
                Err(e) => {
                    warn!(session_id = %id, %process_ref, error = %e, "cannot adopt process");
                    if self.state.lock().sessions.remove(&id).is_some() {
                        self.send_feed(SessionFeed::Removed { session_id: id });
                    }
                }
            }
        }
        for (id, process_ref) in revive {
            match self.process.attach(&id, &process_ref).await {
                Ok(()) => {
                    self.apply_trigger(&id, StatusTrigger::Reattached);
                    info!(session_id = %id, %process_ref, "session revived");
                    report.revived += 1;
                }
                Err(e) => warn!(session_id = %id, %process_ref, error = %e, "cannot revive session"),
            }
        }

        if report != ReconcileReport::default() {
            info!(
                adopted = report.adopted,
                offlined = report.offlined,
                revived = report.revived,
                "discovery sweep"
            );
        }
        Ok(report)
    }

    /// Stop all watchers. Processes keep running for the next daemon.
    pub fn shutdown(&self) {
        self.process.detach_all();
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
