// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Exit code for an action the daemon accepted but could not deliver
/// (the session's pane is gone).
pub const NOT_DELIVERED: i32 = 2;

/// An error carrying the process exit code. An empty message prints nothing.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
