// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-session transport identity types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Opaque token naming one tool-session transport.
    pub struct TransportId;
}

crate::define_id! {
    /// Resolved identity of the agent process that owns a transport.
    pub struct AgentIdentity;
}

/// One protocol session bound to one agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    pub id: TransportId,
    pub agent: AgentIdentity,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,
}
