// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming classifier turning raw pane output into typed session events.
//!
//! Bytes are flushed as soon as they end on a complete escape sequence and
//! UTF-8 character; only an unfinished tail is held back. Every flushed
//! chunk produces a generic [`SessionEvent::Output`] first, then whatever
//! the recognizers found in it, so raw output is never swallowed.

mod ansi;
mod json;
mod patterns;

use json::{JsonAccumulator, Push};
use patterns::LineSignal;
use sb_core::{ActivityHint, SessionEvent};
use serde_json::json;

/// Longest line kept for pattern matching; longer lines are cut.
const MAX_LINE_CHARS: usize = 4096;

#[derive(Debug, Default)]
struct Totals {
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
}

/// Per-session classifier state. Restart with [`OutputClassifier::reset`].
#[derive(Debug, Default)]
pub struct OutputClassifier {
    held: Vec<u8>,
    line: String,
    line_chars: usize,
    /// The unfinished line already produced its status signal
    line_signalled: bool,
    json: Option<JsonAccumulator>,
    hint: Option<ActivityHint>,
    prompt_pending: bool,
    last_tool: Option<String>,
    totals: Totals,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether a permission prompt is on screen and unanswered.
    pub fn prompt_pending(&self) -> bool {
        self.prompt_pending
    }

    /// The prompt was answered out of band (a permission response was sent).
    pub fn resolve_prompt(&mut self) {
        self.prompt_pending = false;
    }

    /// Quiet-period signal: reports idle once after activity stops.
    pub fn quiet(&mut self) -> Option<SessionEvent> {
        if self.prompt_pending || self.hint != Some(ActivityHint::Working) {
            return None;
        }
        self.hint = Some(ActivityHint::Idle);
        Some(SessionEvent::StatusChanged {
            activity: ActivityHint::Idle,
        })
    }

    /// Consume a chunk of raw bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SessionEvent> {
        self.held.extend_from_slice(bytes);
        let ready = ansi::complete_prefix_len(&self.held);
        if ready == 0 {
            return Vec::new();
        }
        let chunk: Vec<u8> = self.held.drain(..ready).collect();
        let raw = String::from_utf8_lossy(&chunk).into_owned();
        let stripped = ansi::strip(&raw);

        let mut found = Vec::new();
        self.scan(&stripped, &mut found);

        let visible = stripped.chars().any(|c| !c.is_whitespace());
        let settles = found.iter().any(|e| {
            matches!(
                e,
                SessionEvent::PermissionRequested { .. }
                    | SessionEvent::StatusChanged {
                        activity: ActivityHint::Idle
                    }
            )
        });
        let activity = visible && !self.prompt_pending && !settles;
        if activity {
            self.hint = Some(ActivityHint::Working);
        }

        let mut events = Vec::with_capacity(found.len() + 1);
        events.push(SessionEvent::Output {
            raw,
            text: stripped.replace('\r', ""),
            activity,
        });
        events.extend(found);
        events
    }

    fn scan(&mut self, text: &str, out: &mut Vec<SessionEvent>) {
        for ch in text.chars() {
            if let Some(acc) = self.json.as_mut() {
                match acc.push(ch) {
                    Push::More => {}
                    Push::Complete(unit) => {
                        self.json = None;
                        if !self.apply_json(&unit, out) {
                            self.scan_lines(&unit, out);
                        }
                    }
                    Push::Overflow => {
                        tracing::debug!("dropping oversize json unit");
                        self.json = None;
                    }
                    Push::Abandoned(text) => {
                        self.json = None;
                        self.scan_lines(&text, out);
                    }
                }
                continue;
            }
            if ch == '{' && self.line.trim().is_empty() {
                self.line.clear();
                self.line_chars = 0;
                self.line_signalled = false;
                let mut acc = JsonAccumulator::default();
                acc.push(ch);
                self.json = Some(acc);
            } else {
                self.push_line_char(ch, out);
            }
        }
        // Prompts and status lines often arrive without a newline
        if !self.line_signalled {
            if let Some(signal) = patterns::scan_status(&self.line) {
                self.line_signalled = true;
                let line = self.line.clone();
                self.apply_signal(signal, &line, out);
            }
        }
    }

    /// Line recognition only, for text that turned out not to be JSON.
    fn scan_lines(&mut self, text: &str, out: &mut Vec<SessionEvent>) {
        for ch in text.chars() {
            self.push_line_char(ch, out);
        }
    }

    fn push_line_char(&mut self, ch: char, out: &mut Vec<SessionEvent>) {
        if ch == '\n' || ch == '\r' {
            self.finish_line(out);
            return;
        }
        if self.line_chars >= MAX_LINE_CHARS {
            self.finish_line(out);
        }
        self.line.push(ch);
        self.line_chars += 1;
    }

    fn finish_line(&mut self, out: &mut Vec<SessionEvent>) {
        let line = std::mem::take(&mut self.line);
        let signalled = std::mem::take(&mut self.line_signalled);
        self.line_chars = 0;
        for signal in patterns::scan_line(&line) {
            if signalled && matches!(signal, LineSignal::Permission | LineSignal::Hint(_)) {
                continue;
            }
            self.apply_signal(signal, &line, out);
        }
    }

    fn apply_signal(&mut self, signal: LineSignal, line: &str, out: &mut Vec<SessionEvent>) {
        match signal {
            LineSignal::Permission => self.request_permission(None, line.trim(), out),
            LineSignal::Hint(ActivityHint::Working) => {
                self.prompt_pending = false;
                self.set_hint(ActivityHint::Working, out);
            }
            LineSignal::Hint(ActivityHint::Idle) => {
                if !self.prompt_pending {
                    self.set_hint(ActivityHint::Idle, out);
                }
            }
            LineSignal::Tool { name, args } => {
                if self.prompt_pending {
                    return;
                }
                self.last_tool = Some(name.clone());
                out.push(SessionEvent::ToolCall {
                    name,
                    input: json!({ "args": args }),
                });
            }
            LineSignal::Tokens { input, output } => self.report_tokens(input, output, out),
            LineSignal::Cost(total) => self.report_cost(total, out),
        }
    }

    /// False if `unit` is not valid JSON.
    fn apply_json(&mut self, unit: &str, out: &mut Vec<SessionEvent>) -> bool {
        let Some(facts) = json::interpret(unit) else {
            return false;
        };
        for event in facts.events {
            if let SessionEvent::ToolCall { name, .. } = &event {
                self.last_tool = Some(name.clone());
            }
            out.push(event);
        }
        if let Some((input, output)) = facts.usage {
            out.push(SessionEvent::CostUpdate {
                input_tokens: input,
                output_tokens: output,
                cost_usd: None,
            });
        }
        if let Some(total) = facts.total_cost_usd {
            self.report_cost(total, out);
        }
        if let Some((tool, prompt)) = facts.permission {
            self.request_permission(tool, &prompt, out);
        }
        true
    }

    fn request_permission(
        &mut self,
        tool: Option<String>,
        prompt: &str,
        out: &mut Vec<SessionEvent>,
    ) {
        if self.prompt_pending {
            return;
        }
        self.prompt_pending = true;
        out.push(SessionEvent::PermissionRequested {
            tool: tool.or_else(|| self.last_tool.clone()),
            prompt: prompt.to_string(),
        });
    }

    fn set_hint(&mut self, hint: ActivityHint, out: &mut Vec<SessionEvent>) {
        if self.hint == Some(hint) {
            return;
        }
        self.hint = Some(hint);
        out.push(SessionEvent::StatusChanged { activity: hint });
    }

    /// Convert cumulative counters into a delta; a drop means the counter restarted.
    fn report_tokens(&mut self, input: u64, output: u64, out: &mut Vec<SessionEvent>) {
        let delta = |prev: u64, now: u64| if now >= prev { now - prev } else { now };
        let d_in = delta(self.totals.input_tokens, input);
        let d_out = delta(self.totals.output_tokens, output);
        self.totals.input_tokens = input;
        self.totals.output_tokens = output;
        if d_in > 0 || d_out > 0 {
            out.push(SessionEvent::CostUpdate {
                input_tokens: d_in,
                output_tokens: d_out,
                cost_usd: None,
            });
        }
    }

    fn report_cost(&mut self, total: f64, out: &mut Vec<SessionEvent>) {
        let prev = self.totals.cost_usd;
        let delta = if total >= prev { total - prev } else { total };
        self.totals.cost_usd = total;
        if delta > 0.0 {
            out.push(SessionEvent::CostUpdate {
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: Some(delta),
            });
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
