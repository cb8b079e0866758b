// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tools offered to agents over `tools/list` and `tools/call`

use async_trait::async_trait;
use sb_adapters::SessionAdapter;
use sb_core::{AgentIdentity, BusEvent, Clock, SessionId};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::gateway::protocol::SessionSummary;
use crate::registry::RegistryError;
use crate::server::AppState;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("{0} is offline, input was not delivered")]
    NotDelivered(String),
}

#[async_trait]
pub trait Tool<S: SessionAdapter, C: Clock>: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema for `arguments`
    fn input_schema(&self) -> Value;
    async fn call(
        &self,
        state: &AppState<S, C>,
        caller: &AgentIdentity,
        args: Value,
    ) -> Result<Value, ToolError>;
}

pub fn builtin<S: SessionAdapter, C: Clock>() -> Vec<Box<dyn Tool<S, C>>> {
    vec![
        Box::new(ListSessions),
        Box::new(SessionStatusTool),
        Box::new(SendMail),
        Box::new(NotifyPeer),
    ]
}

fn parse<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    Ok(serde_json::from_value(args)?)
}

fn resolve<S: SessionAdapter, C: Clock>(
    state: &AppState<S, C>,
    session: &str,
) -> Result<SessionId, ToolError> {
    state
        .registry
        .resolve(session)
        .map(|s| s.id)
        .ok_or_else(|| RegistryError::NotFound(session.to_string()).into())
}

struct ListSessions;

#[async_trait]
impl<S: SessionAdapter, C: Clock> Tool<S, C> for ListSessions {
    fn name(&self) -> &'static str {
        "list_sessions"
    }

    fn description(&self) -> &'static str {
        "List every session with its status"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(
        &self,
        state: &AppState<S, C>,
        _caller: &AgentIdentity,
        _args: Value,
    ) -> Result<Value, ToolError> {
        let sessions: Vec<_> = state
            .registry
            .list()
            .iter()
            .map(SessionSummary::from)
            .collect();
        Ok(json!({ "sessions": sessions }))
    }
}

struct SessionStatusTool;

#[derive(Deserialize)]
struct SessionArgs {
    session: String,
}

#[async_trait]
impl<S: SessionAdapter, C: Clock> Tool<S, C> for SessionStatusTool {
    fn name(&self) -> &'static str {
        "session_status"
    }

    fn description(&self) -> &'static str {
        "Status of one session, by id or name"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "session": { "type": "string" } },
            "required": ["session"],
        })
    }

    async fn call(
        &self,
        state: &AppState<S, C>,
        _caller: &AgentIdentity,
        args: Value,
    ) -> Result<Value, ToolError> {
        let args: SessionArgs = parse(args)?;
        let session = state
            .registry
            .resolve(&args.session)
            .ok_or_else(|| RegistryError::NotFound(args.session.clone()))?;
        Ok(serde_json::to_value(SessionSummary::from(&session))?)
    }
}

struct SendMail;

#[derive(Deserialize)]
struct MailArgs {
    to: String,
    #[serde(default)]
    subject: String,
    body: String,
}

#[async_trait]
impl<S: SessionAdapter, C: Clock> Tool<S, C> for SendMail {
    fn name(&self) -> &'static str {
        "send_mail"
    }

    fn description(&self) -> &'static str {
        "Send mail to another session; it is published on the event bus"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Session id or name" },
                "subject": { "type": "string" },
                "body": { "type": "string" },
            },
            "required": ["to", "body"],
        })
    }

    async fn call(
        &self,
        state: &AppState<S, C>,
        caller: &AgentIdentity,
        args: Value,
    ) -> Result<Value, ToolError> {
        let args: MailArgs = parse(args)?;
        let to = resolve(state, &args.to)?;
        let seq = state.bus.emit(BusEvent::MailReceived {
            from: caller.to_string(),
            to: to.to_string(),
            subject: args.subject,
            body: args.body,
        });
        Ok(json!({ "seq": seq, "to": to }))
    }
}

struct NotifyPeer;

#[derive(Deserialize)]
struct NotifyArgs {
    session: String,
    text: String,
}

#[async_trait]
impl<S: SessionAdapter, C: Clock> Tool<S, C> for NotifyPeer {
    fn name(&self) -> &'static str {
        "notify_peer"
    }

    fn description(&self) -> &'static str {
        "Type a line into another session's terminal"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session": { "type": "string", "description": "Session id or name" },
                "text": { "type": "string" },
            },
            "required": ["session", "text"],
        })
    }

    async fn call(
        &self,
        state: &AppState<S, C>,
        caller: &AgentIdentity,
        args: Value,
    ) -> Result<Value, ToolError> {
        let args: NotifyArgs = parse(args)?;
        let id = resolve(state, &args.session)?;
        if !state.registry.send_input(&id, &args.text).await? {
            return Err(ToolError::NotDelivered(args.session));
        }
        tracing::info!(from = %caller, to = %id, "peer notified");
        Ok(json!({ "delivered": true, "session_id": id }))
    }
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
