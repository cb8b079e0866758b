// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime gateway: authenticated WebSocket connections carrying bus
//! events, chat, typing and the per-session terminal plane.

pub mod backoff;
pub mod client;
mod connection;
pub mod protocol;

pub(crate) use connection::ws_handler;
