// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: the tmux host and the output classifier

pub mod classifier;
mod env;
pub mod process;
pub mod session;
pub mod subprocess;
pub mod traced;

pub use classifier::OutputClassifier;
pub use process::{
    DiscoveredProcess, ProcessAdapter, ProcessConfig, ProcessError, ProcessHandle, SpawnRequest,
};
pub use session::{PaneInfo, SessionAdapter, SessionError, TmuxAdapter};
pub use traced::TracedSession;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSession, FakeSessionAdapter, SessionCall};
