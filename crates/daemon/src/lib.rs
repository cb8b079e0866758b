// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switchboard daemon library
//!
//! The `sbd` binary is a thin shell over [`lifecycle`]. The gateway
//! protocol and [`gateway::client::GatewayClient`] are exposed for the CLI.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod discovery;
pub mod env;
pub mod event_bus;
pub mod gateway;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, Settings};
pub use gateway::client::{ClientConfig, ConnectionState, GatewayClient, GatewayClientError};
pub use gateway::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
pub use lifecycle::Services;
