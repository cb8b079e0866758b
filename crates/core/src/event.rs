// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events produced by the output classifier for one session.

use crate::session::{SessionId, StatusTrigger};
use serde::{Deserialize, Serialize};

/// Working/idle hint recognized in the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityHint {
    Working,
    Idle,
}

/// Serializes as `{"kind": "permission_requested", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged {
        activity: ActivityHint,
    },
    PermissionRequested {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        prompt: String,
    },
    /// Token and cost deltas since the previous report
    CostUpdate {
        input_tokens: u64,
        output_tokens: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
    },
    ToolCall {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Generic output chunk; always emitted so raw output stays observable
    Output {
        raw: String,
        text: String,
        /// Whether the chunk counts as fresh activity
        activity: bool,
    },
    ProcessGone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    Reattached,
}

impl SessionEvent {
    /// State machine input carried by this event, if any.
    pub fn trigger(&self) -> Option<StatusTrigger> {
        match self {
            SessionEvent::StatusChanged {
                activity: ActivityHint::Working,
            } => Some(StatusTrigger::Activity),
            SessionEvent::StatusChanged {
                activity: ActivityHint::Idle,
            } => Some(StatusTrigger::Quiet),
            SessionEvent::PermissionRequested { .. } => Some(StatusTrigger::PermissionRequested),
            SessionEvent::CostUpdate { .. }
            | SessionEvent::ToolCall { .. }
            | SessionEvent::ToolResult { .. } => Some(StatusTrigger::Activity),
            SessionEvent::Output { activity, .. } => activity.then_some(StatusTrigger::Activity),
            SessionEvent::ProcessGone { .. } => Some(StatusTrigger::ProcessGone),
            SessionEvent::Reattached => Some(StatusTrigger::Reattached),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, SessionEvent::Output { .. })
    }
}

/// A classifier event addressed to the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEnvelope {
    pub session_id: SessionId,
    pub event: SessionEvent,
}

impl OutputEnvelope {
    pub fn new(session_id: SessionId, event: SessionEvent) -> Self {
        Self { session_id, event }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
