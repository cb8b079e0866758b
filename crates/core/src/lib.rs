// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-core: domain types for the Switchboard session and event bridge

pub mod bus;
pub mod clock;
pub mod event;
pub mod id;
pub mod session;
pub mod transport;

pub use bus::{BusEvent, PowerState, SequencedEvent};
#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
pub use clock::{Clock, SystemClock};
pub use event::{ActivityHint, OutputEnvelope, SessionEvent};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use session::{
    ClientId, InvalidTransition, NewSession, Session, SessionId, SessionMode, SessionStatus,
    StatusTrigger, WorkspaceKind,
};
pub use transport::{AgentIdentity, Transport, TransportId};
