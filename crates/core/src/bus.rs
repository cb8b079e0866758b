// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System-level events carried by the event bus.
//!
//! Internal kinds use `area:verb` tags (`work_item:created`). Observers see
//! a coarser wire name (`work_item`) plus an `action` derived from the verb.

use crate::session::{ClientId, SessionId, SessionMode, SessionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Active,
    Paused,
}

/// Serializes with `{"type": "area:verb", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    // -- work items (external tracker) --
    #[serde(rename = "work_item:created")]
    WorkItemCreated { id: String, title: String },

    #[serde(rename = "work_item:updated")]
    WorkItemUpdated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    #[serde(rename = "work_item:closed")]
    WorkItemClosed {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // -- agents --
    #[serde(rename = "agent:status")]
    AgentStatus {
        session_id: SessionId,
        name: String,
        status: SessionStatus,
    },

    #[serde(rename = "power:changed")]
    PowerChanged { state: PowerState },

    #[serde(rename = "mail:received")]
    MailReceived {
        from: String,
        to: String,
        #[serde(default)]
        subject: String,
        body: String,
    },

    #[serde(rename = "mode:switched")]
    ModeSwitched {
        mode: SessionMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },

    #[serde(rename = "cost:alert")]
    CostAlert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        total_usd: f64,
        threshold_usd: f64,
    },

    // -- chat --
    #[serde(rename = "chat:message")]
    ChatMessage {
        from: ClientId,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
}

impl BusEvent {
    /// Internal `area:verb` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::WorkItemCreated { .. } => "work_item:created",
            BusEvent::WorkItemUpdated { .. } => "work_item:updated",
            BusEvent::WorkItemClosed { .. } => "work_item:closed",
            BusEvent::AgentStatus { .. } => "agent:status",
            BusEvent::PowerChanged { .. } => "power:changed",
            BusEvent::MailReceived { .. } => "mail:received",
            BusEvent::ModeSwitched { .. } => "mode:switched",
            BusEvent::CostAlert { .. } => "cost:alert",
            BusEvent::ChatMessage { .. } => "chat:message",
        }
    }

    /// Event name presented to external observers.
    pub fn wire_name(&self) -> &'static str {
        match self {
            BusEvent::WorkItemCreated { .. }
            | BusEvent::WorkItemUpdated { .. }
            | BusEvent::WorkItemClosed { .. } => "work_item",
            BusEvent::AgentStatus { .. } => "agent_status",
            BusEvent::PowerChanged { .. } => "power",
            BusEvent::MailReceived { .. } => "mail",
            BusEvent::ModeSwitched { .. } => "mode",
            BusEvent::CostAlert { .. } => "cost_alert",
            BusEvent::ChatMessage { .. } => "message",
        }
    }

    /// Sub-classification for kinds that carry one.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            BusEvent::WorkItemCreated { .. } => Some("created"),
            BusEvent::WorkItemUpdated { .. } => Some("updated"),
            BusEvent::WorkItemClosed { .. } => Some("closed"),
            BusEvent::MailReceived { .. } => Some("received"),
            BusEvent::AgentStatus { .. }
            | BusEvent::PowerChanged { .. }
            | BusEvent::ModeSwitched { .. }
            | BusEvent::CostAlert { .. }
            | BusEvent::ChatMessage { .. } => None,
        }
    }

    /// The event's fields as a JSON object, without the internal tag.
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("type");
        }
        value
    }
}

/// A bus event with its bus-global sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub event: BusEvent,
}

impl SequencedEvent {
    /// Observer-facing payload: fields plus `action` (when present) and `ts`.
    pub fn wire_payload(&self) -> serde_json::Value {
        let mut value = self.event.payload();
        if let Some(map) = value.as_object_mut() {
            if let Some(action) = self.event.action() {
                map.insert("action".to_string(), action.into());
            }
            map.insert("ts".to_string(), self.timestamp_ms.into());
        }
        value
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
