// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface of the transport manager: `POST`, `GET` and `DELETE /mcp`

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream};
use sb_adapters::SessionAdapter;
use sb_core::{AgentIdentity, Clock, Transport, TransportId};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::tools::{self, ToolError};
use super::TransportError;
use crate::server::AppState;

/// Transport id, issued on `initialize`
pub const TRANSPORT_HEADER: &str = "mcp-session-id";
/// Calling agent's session id or name
pub const AGENT_HEADER: &str = "x-sb-session";

const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub(crate) struct RpcRequest {
    /// Absent on notifications
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

/// Authenticate and resolve the calling agent.
fn caller<S: SessionAdapter, C: Clock>(
    state: &AppState<S, C>,
    headers: &HeaderMap,
) -> Result<AgentIdentity, TransportError> {
    if !state.secret.allows(headers, None) {
        return Err(TransportError::Unauthorized);
    }
    let name = header(headers, AGENT_HEADER)
        .ok_or_else(|| TransportError::UnknownAgent(format!("missing {AGENT_HEADER}")))?;
    let session = state
        .registry
        .resolve(name)
        .ok_or_else(|| TransportError::UnknownAgent(name.to_string()))?;
    Ok(AgentIdentity::new(session.id.as_str()))
}

fn transport_id(headers: &HeaderMap) -> Option<TransportId> {
    header(headers, TRANSPORT_HEADER)
        .filter(|id| !id.is_empty())
        .map(TransportId::from)
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

pub(crate) async fn call<S: SessionAdapter, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Json(request): Json<RpcRequest>,
) -> Result<Response, TransportError> {
    let agent = caller(&state, &headers)?;
    let transport = state.transports.route(
        transport_id(&headers).as_ref(),
        &agent,
        request.method == "initialize",
    )?;
    debug!(transport_id = %transport.id, method = %request.method, "mcp request");

    let mut response = match request.id.clone() {
        // Notifications get no body
        None => StatusCode::ACCEPTED.into_response(),
        Some(id) => Json(dispatch(&state, &transport, id, &request).await).into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(transport.id.as_str()) {
        response.headers_mut().insert(TRANSPORT_HEADER, value);
    }
    Ok(response)
}

async fn dispatch<S: SessionAdapter, C: Clock>(
    state: &AppState<S, C>,
    transport: &Transport,
    id: Value,
    request: &RpcRequest,
) -> Value {
    match request.method.as_str() {
        "initialize" => {
            let version = request
                .params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            rpc_result(
                id,
                json!({
                    "protocolVersion": version,
                    "serverInfo": { "name": "sbd", "version": env!("CARGO_PKG_VERSION") },
                    "capabilities": { "tools": { "listChanged": false } },
                }),
            )
        }
        "ping" => rpc_result(id, json!({})),
        "tools/list" => {
            let tools: Vec<_> = tools::builtin::<S, C>()
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "inputSchema": tool.input_schema(),
                    })
                })
                .collect();
            rpc_result(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let Some(name) = request.params.get("name").and_then(Value::as_str) else {
                return rpc_error(id, INVALID_PARAMS, "tools/call requires a tool name");
            };
            let args = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let outcome = call_tool(state, &transport.agent, name, args).await;
            rpc_result(id, tool_result(outcome))
        }
        other => rpc_error(id, METHOD_NOT_FOUND, format!("unsupported method '{other}'")),
    }
}

async fn call_tool<S: SessionAdapter, C: Clock>(
    state: &AppState<S, C>,
    agent: &AgentIdentity,
    name: &str,
    args: Value,
) -> Result<Value, ToolError> {
    let tools = tools::builtin::<S, C>();
    let tool = tools
        .iter()
        .find(|tool| tool.name() == name)
        .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
    tool.call(state, agent, args).await
}

/// Tool failures are reported in-band so the agent can read them.
fn tool_result(outcome: Result<Value, ToolError>) -> Value {
    let (text, is_error) = match outcome {
        Ok(value) => (value.to_string(), false),
        Err(e) => {
            warn!(error = %e, "tool call failed");
            (e.to_string(), true)
        }
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

/// `GET /mcp`: server-to-agent messages for one transport.
pub(crate) async fn stream<S: SessionAdapter, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, TransportError> {
    let agent = caller(&state, &headers)?;
    let id = transport_id(&headers).ok_or(TransportError::MissingSession)?;
    let rx = state.transports.open_stream(&id, &agent)?;

    let frames = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    let frame = Event::default().event("message").data(message.to_string());
                    return Some((Ok(frame), rx));
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "transport stream lagged");
                }
                // Terminated
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(frames).keep_alive(KeepAlive::new().interval(state.settings.heartbeat())))
}

/// `DELETE /mcp`
pub(crate) async fn terminate<S: SessionAdapter, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
) -> Result<StatusCode, TransportError> {
    let agent = caller(&state, &headers)?;
    let id = transport_id(&headers).ok_or(TransportError::MissingSession)?;
    state.transports.terminate(&id, &agent)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
