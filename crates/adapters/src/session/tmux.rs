// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session adapter

use super::{PaneInfo, SessionAdapter, SessionError};
use crate::subprocess::{run_with_timeout, stderr_of, TMUX_TIMEOUT};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Tmux-based session adapter
#[derive(Clone, Default)]
pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionAdapter for TmuxAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        if !cwd.is_dir() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        // A leftover session with this name belongs to a dead registry entry
        if self.is_alive(name).await.unwrap_or(false) {
            tracing::warn!(session = name, "stale tmux session, killing first");
            self.kill(name).await?;
        }

        let mut tmux_cmd = Command::new("tmux");
        tmux_cmd.args(["new-session", "-d", "-s", name, "-c"]).arg(cwd);
        for (key, value) in env {
            tmux_cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        tmux_cmd.arg(cmd);

        let output = run_with_timeout(tmux_cmd, TMUX_TIMEOUT, "tmux new-session")
            .await
            .map_err(SessionError::SpawnFailed)?;
        if !output.status.success() {
            let stderr = stderr_of(&output);
            tracing::error!(session = name, stderr = %stderr, "tmux spawn failed");
            return Err(SessionError::SpawnFailed(stderr));
        }

        // Keep the pane around after exit so the exit code stays readable
        if let Err(e) = tmux_run(
            &["set-option", "-t", &pane_target(name), "remain-on-exit", "on"],
            "tmux set-option",
        )
        .await
        {
            tracing::warn!(session = name, error = %e, "could not set remain-on-exit");
        }

        Ok(name.to_string())
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        // -l = literal mode, -- = end of options (text may start with -)
        let target = pane_target(id);
        tmux_run(
            &["send-keys", "-t", &target, "-l", "--", text],
            "tmux send-keys literal",
        )
        .await
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        self.send_key(id, "Enter").await
    }

    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError> {
        tmux_run(&["send-keys", "-t", &pane_target(id), key], "tmux send-keys").await
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        // Already-dead sessions are fine
        let mut cmd = Command::new("tmux");
        cmd.args(["kill-session", "-t", &session_target(id)]);
        let _ = run_with_timeout(cmd, TMUX_TIMEOUT, "tmux kill-session").await;
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        match tmux_run(&["has-session", "-t", &session_target(id)], "tmux has-session").await {
            Ok(()) => {}
            Err(SessionError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        // remain-on-exit keeps dead panes; a session is alive only if its pane is
        let output = match tmux_output(
            &["display-message", "-t", &pane_target(id), "-p", "#{pane_dead}"],
            "tmux display-message",
        )
        .await
        {
            Ok(output) => output,
            Err(SessionError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "0")
    }

    async fn capture_pane(&self, id: &str, escapes: bool) -> Result<String, SessionError> {
        let target = pane_target(id);
        let mut args = vec!["capture-pane", "-t", &target, "-p"];
        if escapes {
            args.push("-e");
        }
        let output = tmux_output(&args, "tmux capture-pane").await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn pipe_output(&self, id: &str, path: &Path) -> Result<(), SessionError> {
        // -o only opens a pipe if none is active, so re-attaching is harmless
        let shell = format!("cat >> {}", shell_quote(&path.to_string_lossy()));
        tmux_run(
            &["pipe-pane", "-o", "-t", &pane_target(id), &shell],
            "tmux pipe-pane",
        )
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<PaneInfo>, SessionError> {
        let mut cmd = Command::new("tmux");
        cmd.args([
            "list-panes",
            "-a",
            "-F",
            "#{session_name}\t#{pane_current_path}",
        ]);
        let output = run_with_timeout(cmd, TMUX_TIMEOUT, "tmux list-panes")
            .await
            .map_err(SessionError::CommandFailed)?;
        if !output.status.success() {
            // No server running means no sessions
            return Ok(Vec::new());
        }
        Ok(parse_pane_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let output = tmux_output(
            &["display-message", "-t", &pane_target(id), "-p", "#{pane_dead_status}"],
            "tmux display-message",
        )
        .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<i32>()
            .ok())
    }
}

/// One entry per session (first pane wins), sorted by name.
fn parse_pane_list(stdout: &str) -> Vec<PaneInfo> {
    let mut by_name = BTreeMap::new();
    for line in stdout.lines() {
        let Some((name, cwd)) = line.split_once('\t') else {
            continue;
        };
        by_name
            .entry(name.to_string())
            .or_insert_with(|| PathBuf::from(cwd));
    }
    by_name
        .into_iter()
        .map(|(name, cwd)| PaneInfo { name, cwd })
        .collect()
}

/// Exact-match session target. A bare name would also match any session
/// whose name starts with it.
fn session_target(name: &str) -> String {
    format!("={name}")
}

/// Active pane of the exactly-named session.
fn pane_target(name: &str) -> String {
    format!("={name}:")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Run a tmux command, discarding output.
async fn tmux_run(args: &[&str], description: &str) -> Result<(), SessionError> {
    tmux_output(args, description).await.map(|_| ())
}

/// Run a tmux command; a non-zero exit maps to `NotFound` for the `-t` target.
async fn tmux_output(
    args: &[&str],
    description: &str,
) -> Result<std::process::Output, SessionError> {
    let mut cmd = Command::new("tmux");
    cmd.args(args);
    let output = run_with_timeout(cmd, TMUX_TIMEOUT, description)
        .await
        .map_err(SessionError::CommandFailed)?;
    if !output.status.success() {
        let target = args
            .windows(2)
            .find(|w| w[0] == "-t")
            .map(|w| w[1].trim_start_matches('=').trim_end_matches(':'))
            .unwrap_or("unknown");
        return Err(SessionError::NotFound(target.to_string()));
    }
    Ok(output)
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
