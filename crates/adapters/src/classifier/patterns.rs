// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-level recognizers for the agent's terminal UI

use regex::Regex;
use sb_core::ActivityHint;
use std::sync::LazyLock;

/// Phrases the agent uses when it stops to ask for approval.
const PERMISSION_PHRASES: &[&str] = &[
    "do you want to proceed?",
    "do you want to make this edit",
    "do you want to create",
    "do you want to allow",
    "requires approval",
    "allow this action?",
    "(y/n)",
];

/// Shown in the status line while the agent is generating.
const WORKING_PHRASES: &[&str] = &["esc to interrupt"];

/// Shown when the input box is waiting for the user.
const IDLE_PHRASES: &[&str] = &["? for shortcuts"];

static TOOL_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[⏺●]\s*([A-Za-z][\w.:-]*)\((.*?)\)?\s*$").ok());

static TOKEN_COUNTS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d,]+)\s+input tokens?\b.*?([\d,]+)\s+output tokens?\b").ok()
});

static TOTAL_COST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)total cost:\s*\$\s*([\d,]*\.?\d+)").ok());

/// Something a single line of output tells us.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineSignal {
    Permission,
    Hint(ActivityHint),
    Tool { name: String, args: String },
    /// Cumulative token counters
    Tokens { input: u64, output: u64 },
    /// Cumulative session cost
    Cost(f64),
}

/// Signals found in a completed line, in the order they should apply.
pub(crate) fn scan_line(line: &str) -> Vec<LineSignal> {
    let line = line.trim();
    let mut signals = Vec::new();
    if line.is_empty() {
        return signals;
    }
    signals.extend(scan_status(line));

    if let Some(caps) = TOOL_HEADER.as_ref().and_then(|re| re.captures(line)) {
        signals.push(LineSignal::Tool {
            name: caps[1].to_string(),
            args: caps.get(2).map_or("", |m| m.as_str()).to_string(),
        });
    }
    if let Some(caps) = TOKEN_COUNTS.as_ref().and_then(|re| re.captures(line)) {
        if let (Some(input), Some(output)) = (parse_count(&caps[1]), parse_count(&caps[2])) {
            signals.push(LineSignal::Tokens { input, output });
        }
    }
    if let Some(caps) = TOTAL_COST.as_ref().and_then(|re| re.captures(line)) {
        if let Ok(cost) = caps[1].replace(',', "").parse::<f64>() {
            signals.push(LineSignal::Cost(cost));
        }
    }
    signals
}

/// Status-only recognizers, safe to run on an unfinished line.
pub(crate) fn scan_status(line: &str) -> Option<LineSignal> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if PERMISSION_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(LineSignal::Permission);
    }
    if WORKING_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(LineSignal::Hint(ActivityHint::Working));
    }
    if trimmed == ">" || trimmed == "❯" || IDLE_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(LineSignal::Hint(ActivityHint::Idle));
    }
    None
}

fn parse_count(s: &str) -> Option<u64> {
    s.replace(',', "").parse().ok()
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
