// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed agent sessions and their status state machine.
//!
//! A [`Session`] never exposes a status setter: every change goes through
//! [`Session::apply`], which consults [`SessionStatus::next`]. That table is
//! the only place transitions are defined.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

crate::define_id! {
    /// Opaque identifier of a managed session, unique for the daemon's lifetime.
    pub struct SessionId;
}

crate::define_id! {
    /// Identifier of one front-end client connection.
    pub struct ClientId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Working,
    WaitingPermission,
    Offline,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Working => "working",
            SessionStatus::WaitingPermission => "waiting_permission",
            SessionStatus::Offline => "offline",
        }
    }

    /// Resolve the status reached from `self` on `trigger`.
    ///
    /// Returns `Ok(self)` for triggers that leave the status unchanged and
    /// `Err` for triggers that have no edge from this state.
    pub fn next(self, trigger: StatusTrigger) -> Result<SessionStatus, InvalidTransition> {
        use SessionStatus::*;
        use StatusTrigger::*;

        let to = match (self, trigger) {
            (_, ProcessGone) => Offline,
            (Offline, Reattached) => Idle,
            (Offline, _) => return Err(InvalidTransition { from: self, trigger }),
            (_, Reattached) => return Err(InvalidTransition { from: self, trigger }),

            (Idle | Working | WaitingPermission, Activity) => Working,

            (Working | Idle, Quiet) => Idle,
            (WaitingPermission, Quiet) => {
                return Err(InvalidTransition { from: self, trigger })
            }

            (Idle | Working | WaitingPermission, PermissionRequested) => WaitingPermission,

            (WaitingPermission, PermissionResolved { approved: true }) => Working,
            (WaitingPermission, PermissionResolved { approved: false }) => Idle,
            (Idle | Working, PermissionResolved { .. }) => {
                return Err(InvalidTransition { from: self, trigger })
            }
        };
        Ok(to)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTrigger {
    /// Fresh output or any recognized agent activity
    Activity,
    /// The classifier's explicit idle/quiet signal
    Quiet,
    PermissionRequested,
    /// A permission response reached the process
    PermissionResolved { approved: bool },
    /// Backing process confirmed gone (sweep or pipe closure)
    ProcessGone,
    /// Backing process found again or respawned
    Reattached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from {from} on {trigger:?}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub trigger: StatusTrigger,
}

/// Peer swarm or hierarchical orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Swarm,
    Hierarchy,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Swarm => "swarm",
            SessionMode::Hierarchy => "hierarchy",
        }
    }
}

/// How the session's working tree relates to the project checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceKind {
    #[default]
    Shared,
    Worktree,
    Copy,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    /// Backing-process handle (the multiplexer session name)
    pub process_ref: String,
    pub project_path: PathBuf,
    /// Directory the process actually runs in
    pub workspace_path: PathBuf,
    pub mode: SessionMode,
    pub workspace: WorkspaceKind,
    status: SessionStatus,
    pub clients: BTreeSet<ClientId>,
    pub pipe_alive: bool,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
}

impl Session {
    /// A freshly spawned or adopted session, starting `idle`.
    pub fn new(params: NewSession, now_ms: u64) -> Self {
        Self {
            id: params.id,
            name: params.name,
            process_ref: params.process_ref,
            project_path: params.project_path,
            workspace_path: params.workspace_path,
            mode: params.mode,
            workspace: params.workspace,
            status: SessionStatus::Idle,
            clients: BTreeSet::new(),
            pipe_alive: true,
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_offline(&self) -> bool {
        self.status == SessionStatus::Offline
    }

    /// Apply a trigger, returning the new status if it changed.
    ///
    /// Activity-bearing triggers refresh `last_activity_ms` even when the
    /// status stays the same. Going offline clears `pipe_alive`; reattaching
    /// sets it.
    pub fn apply(
        &mut self,
        trigger: StatusTrigger,
        now_ms: u64,
    ) -> Result<Option<SessionStatus>, InvalidTransition> {
        let next = self.status.next(trigger)?;
        match trigger {
            StatusTrigger::Activity
            | StatusTrigger::PermissionRequested
            | StatusTrigger::PermissionResolved { .. } => self.last_activity_ms = now_ms,
            StatusTrigger::ProcessGone => self.pipe_alive = false,
            StatusTrigger::Reattached => {
                self.pipe_alive = true;
                self.last_activity_ms = now_ms;
            }
            StatusTrigger::Quiet => {}
        }
        if next == self.status {
            return Ok(None);
        }
        self.status = next;
        Ok(Some(next))
    }
}

/// Construction parameters for [`Session::new`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub name: String,
    pub process_ref: String,
    pub project_path: PathBuf,
    pub workspace_path: PathBuf,
    pub mode: SessionMode,
    pub workspace: WorkspaceKind,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
