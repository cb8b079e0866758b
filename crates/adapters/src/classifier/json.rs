// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming JSON unit detection and mapping of agent JSON messages

use sb_core::SessionEvent;
use serde_json::Value;

/// Largest JSON unit buffered before giving up on it.
pub(crate) const MAX_JSON_BYTES: usize = 256 * 1024;

pub(crate) enum Push {
    More,
    Complete(String),
    Overflow,
    /// Not an object after all; the text taken so far, `ch` included
    Abandoned(String),
}

/// Collects one brace-balanced object, string and escape aware.
#[derive(Debug, Default)]
pub(crate) struct JsonAccumulator {
    buf: String,
    depth: u32,
    in_string: bool,
    escaped: bool,
    /// Saw a key or `}` after the opening brace
    confirmed: bool,
}

impl JsonAccumulator {
    pub(crate) fn push(&mut self, ch: char) -> Push {
        self.buf.push(ch);
        if self.buf.len() > MAX_JSON_BYTES {
            return Push::Overflow;
        }
        // An object's first token after `{` is a key or the closing brace
        if self.depth == 1 && !self.confirmed && !ch.is_whitespace() {
            if ch != '"' && ch != '}' {
                return Push::Abandoned(std::mem::take(&mut self.buf));
            }
            self.confirmed = true;
        }
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return Push::More;
        }
        match ch {
            '"' => self.in_string = true,
            '{' => self.depth += 1,
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    return Push::Complete(std::mem::take(&mut self.buf));
                }
            }
            _ => {}
        }
        Push::More
    }
}

/// What a parsed JSON message contributes, before cost deltas are computed.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct JsonFacts {
    pub events: Vec<SessionEvent>,
    /// Per-message usage, already a delta
    pub usage: Option<(u64, u64)>,
    /// Cumulative session cost
    pub total_cost_usd: Option<f64>,
    pub permission: Option<(Option<String>, String)>,
}

/// Interpret one complete JSON unit. `None` if it does not parse;
/// unknown shapes yield no facts.
pub(crate) fn interpret(unit: &str) -> Option<JsonFacts> {
    let mut facts = JsonFacts::default();
    let value = serde_json::from_str::<Value>(unit).ok()?;
    match value.get("type").and_then(Value::as_str) {
        Some("tool_use") => facts.events.extend(tool_use(&value)),
        Some("tool_result") => facts.events.extend(tool_result(&value)),
        Some("assistant") => {
            let message = value.get("message").unwrap_or(&value);
            for block in content_blocks(message) {
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    facts.events.extend(tool_use(block));
                }
            }
            facts.usage = message.get("usage").and_then(usage_pair);
        }
        Some("user") => {
            let message = value.get("message").unwrap_or(&value);
            for block in content_blocks(message) {
                if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                    facts.events.extend(tool_result(block));
                }
            }
        }
        Some("result") => {
            facts.total_cost_usd = value.get("total_cost_usd").and_then(Value::as_f64);
        }
        Some("permission_request") => {
            let tool = value
                .get("tool_name")
                .or_else(|| value.get("tool"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let prompt = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| match &tool {
                    Some(t) => format!("Permission requested for {t}"),
                    None => "Permission requested".to_string(),
                });
            facts.permission = Some((tool, prompt));
        }
        _ => {}
    }
    Some(facts)
}

fn content_blocks(message: &Value) -> impl Iterator<Item = &Value> {
    message
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn tool_use(block: &Value) -> Option<SessionEvent> {
    let name = block.get("name").and_then(Value::as_str)?;
    Some(SessionEvent::ToolCall {
        name: name.to_string(),
        input: block.get("input").cloned().unwrap_or(Value::Null),
    })
}

fn tool_result(block: &Value) -> Option<SessionEvent> {
    let content = match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Some(SessionEvent::ToolResult {
        tool_use_id: block
            .get("tool_use_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        content,
        is_error: block
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn usage_pair(usage: &Value) -> Option<(u64, u64)> {
    let field = |k: &str| usage.get(k).and_then(Value::as_u64).unwrap_or(0);
    let input = field("input_tokens")
        + field("cache_creation_input_tokens")
        + field("cache_read_input_tokens");
    let output = field("output_tokens");
    (input > 0 || output > 0).then_some((input, output))
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
