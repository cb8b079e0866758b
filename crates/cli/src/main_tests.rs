// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::error::ErrorKind;
use clap::FromArgMatches;
use yare::parameterized;

use super::{cli_command, format_error, Cli, Commands};
use crate::output::OutputFormat;

fn parse(args: &[&str]) -> Cli {
    let matches = cli_command().try_get_matches_from(args).unwrap();
    Cli::from_arg_matches(&matches).unwrap()
}

#[parameterized(
    short = { "-V" },
    long = { "--version" },
)]
fn version_flags(flag: &str) {
    let err = cli_command()
        .try_get_matches_from(["sb", flag])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayVersion);
}

#[test]
fn send_joins_trailing_words() {
    let cli = parse(&["sb", "send", "scout", "run", "the", "tests"]);
    match cli.command {
        Some(Commands::Send { session, text }) => {
            assert_eq!(session, "scout");
            assert_eq!(text.join(" "), "run the tests");
        }
        _ => panic!("expected send"),
    }
}

#[test]
fn send_requires_text() {
    let err = cli_command()
        .try_get_matches_from(["sb", "send", "scout"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn attach_flags() {
    let cli = parse(&["sb", "attach", "scout", "--raw", "--no-replay"]);
    assert!(matches!(
        cli.command,
        Some(Commands::Attach { ref session, raw: true, no_replay: true }) if session == "scout"
    ));
}

#[test]
fn spawn_defaults_and_overrides() {
    use crate::commands::session::{ModeArg, WorkspaceArg};

    let cli = parse(&["sb", "spawn", "scout", "/src/app"]);
    assert!(matches!(
        cli.command,
        Some(Commands::Spawn {
            mode: ModeArg::Swarm,
            workspace: WorkspaceArg::Shared,
            ..
        })
    ));

    let cli = parse(&[
        "sb",
        "spawn",
        "lead",
        "/src/app",
        "--mode",
        "hierarchy",
        "--workspace",
        "worktree",
    ]);
    assert!(matches!(
        cli.command,
        Some(Commands::Spawn {
            mode: ModeArg::Hierarchy,
            workspace: WorkspaceArg::Worktree,
            ..
        })
    ));
}

#[test]
fn unknown_workspace_kind_is_rejected() {
    let err = cli_command()
        .try_get_matches_from(["sb", "spawn", "x", "/p", "--workspace", "nfs"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn tail_events_since() {
    let cli = parse(&["sb", "tail-events", "--since", "42"]);
    assert!(matches!(
        cli.command,
        Some(Commands::TailEvents { since: Some(42) })
    ));
}

#[test]
fn global_flags_work_after_the_subcommand() {
    let cli = parse(&[
        "sb", "list", "--url", "ws://box:9/ws", "--secret", "s", "-o", "json",
    ]);
    assert_eq!(cli.url.as_deref(), Some("ws://box:9/ws"));
    assert_eq!(cli.secret.as_deref(), Some("s"));
    assert_eq!(cli.output, OutputFormat::Json);
}

#[test]
fn format_error_skips_redundant_chain() {
    let err = anyhow::anyhow!("inner failure").context("outer: inner failure");
    assert_eq!(format_error(&err), "outer: inner failure");

    let err = anyhow::anyhow!("socket closed").context("attach failed");
    assert_eq!(
        format_error(&err),
        "attach failed\n\nCaused by:\n    0: socket closed"
    );
}
