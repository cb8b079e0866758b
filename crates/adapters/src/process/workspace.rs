// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Working-directory isolation for new sessions

use crate::subprocess::{run_with_timeout, stderr_of, GIT_WORKTREE_TIMEOUT, WORKSPACE_COPY_TIMEOUT};
use sb_core::WorkspaceKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Branch name used for a session's worktree.
pub(crate) fn worktree_branch(name: &str) -> String {
    format!("sb/{name}")
}

/// Prepare the directory a session runs in and return it.
///
/// `shared` runs directly in the project. `worktree` and `copy` create
/// `<workspaces_dir>/<dir_name>` first.
pub(crate) async fn prepare(
    kind: WorkspaceKind,
    project_path: &Path,
    workspaces_dir: &Path,
    dir_name: &str,
) -> Result<PathBuf, String> {
    if !project_path.is_dir() {
        return Err(format!(
            "project path does not exist: {}",
            project_path.display()
        ));
    }
    let target = workspaces_dir.join(dir_name);
    match kind {
        WorkspaceKind::Shared => Ok(project_path.to_path_buf()),
        WorkspaceKind::Worktree => {
            create_parent(workspaces_dir).await?;
            let mut cmd = Command::new("git");
            cmd.arg("worktree")
                .arg("add")
                .arg("-B")
                .arg(worktree_branch(dir_name))
                .arg(&target)
                .current_dir(project_path);
            let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add").await?;
            if !output.status.success() {
                return Err(format!("git worktree add failed: {}", stderr_of(&output)));
            }
            Ok(target)
        }
        WorkspaceKind::Copy => {
            if target.exists() {
                return Err(format!("workspace already exists: {}", target.display()));
            }
            create_parent(workspaces_dir).await?;
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| format!("failed to create {}: {e}", target.display()))?;
            let mut cmd = Command::new("cp");
            cmd.arg("-a").arg(project_path.join(".")).arg(&target);
            let output = run_with_timeout(cmd, WORKSPACE_COPY_TIMEOUT, "workspace copy").await?;
            if !output.status.success() {
                return Err(format!("workspace copy failed: {}", stderr_of(&output)));
            }
            Ok(target)
        }
    }
}

async fn create_parent(dir: &Path) -> Result<(), String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("failed to create {}: {e}", dir.display()))
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
