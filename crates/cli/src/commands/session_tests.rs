// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use serial_test::serial;

use super::*;

fn summary(id: &str, name: &str, status: SessionStatus, active_ms: u64) -> SessionSummary {
    SessionSummary {
        id: SessionId::new(id),
        name: name.to_string(),
        status,
        project_path: PathBuf::from("/src/app"),
        workspace_path: PathBuf::from(format!("/state/workspaces/{name}")),
        mode: SessionMode::Swarm,
        workspace: WorkspaceKind::Worktree,
        clients: 2,
        pipe_alive: true,
        created_at_ms: 1_000,
        last_activity_ms: active_ms,
    }
}

fn render(table: &Table) -> String {
    let mut buf = Vec::new();
    table.render(&mut buf);
    String::from_utf8(buf).unwrap()
}

#[test]
#[serial]
fn session_list_shows_status_clients_and_activity() {
    std::env::set_var("NO_COLOR", "1");
    let sessions = vec![
        summary("sess-0001", "scout", SessionStatus::Working, 55_000),
        summary("sess-0002", "reviewer", SessionStatus::WaitingPermission, 0),
    ];
    let out = render(&session_table(&sessions, 60_000));
    let lines: Vec<&str> = out.lines().collect();
    std::env::remove_var("NO_COLOR");

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID"));
    assert!(lines[1].contains("scout"));
    assert!(lines[1].contains("working"));
    assert!(lines[1].contains(" 5s "), "activity column in {:?}", lines[1]);
    assert!(lines[1].ends_with("/state/workspaces/scout"));
    assert!(lines[2].contains("waiting_permission"));
    assert!(lines[2].contains(" - "), "unset activity renders as dash");
}

#[test]
fn actions_map_to_wire_messages() {
    assert_eq!(
        Action::Input("ls".into()).into_message("scout".into()),
        ClientMessage::SessionInput {
            session_id: "scout".into(),
            text: "ls".into(),
        }
    );
    assert_eq!(
        Action::Permission { approved: false }.into_message("scout".into()),
        ClientMessage::SessionPermissionResponse {
            session_id: "scout".into(),
            approved: false,
        }
    );
    assert_eq!(Action::Interrupt.wire_action(), "interrupt");
    assert_eq!(
        Action::Permission { approved: true }.wire_action(),
        "permission_response"
    );
}

#[test]
fn delivery_replies_match_on_action() {
    let reply = || ServerMessage::Delivery {
        session_id: SessionId::new("sess-1"),
        action: "input".into(),
        delivered: false,
    };
    assert_eq!(
        delivery_reply(reply(), "input"),
        Some((SessionId::new("sess-1"), false))
    );
    assert_eq!(delivery_reply(reply(), "kill"), None);
}

#[test]
fn relative_projects_are_made_absolute() {
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(absolute(Path::new("app")).unwrap(), cwd.join("app"));
    assert_eq!(
        absolute(Path::new("/src/app")).unwrap(),
        PathBuf::from("/src/app")
    );
}

#[test]
fn arg_enums_convert_to_domain_types() {
    assert_eq!(SessionMode::from(ModeArg::Hierarchy), SessionMode::Hierarchy);
    assert_eq!(WorkspaceKind::from(WorkspaceArg::Copy), WorkspaceKind::Copy);
    assert_eq!(WorkspaceKind::from(WorkspaceArg::default()), WorkspaceKind::Shared);
}
