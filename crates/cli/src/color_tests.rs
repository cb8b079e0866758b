// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use yare::parameterized;

fn force_color() {
    std::env::set_var("COLOR", "1");
    std::env::remove_var("NO_COLOR");
}

fn disable_color() {
    std::env::set_var("NO_COLOR", "1");
    std::env::remove_var("COLOR");
}

#[test]
#[serial]
fn styles_returns_styled_when_color_forced() {
    force_color();
    assert_ne!(format!("{:?}", styles()), format!("{:?}", Styles::plain()));
}

#[test]
#[serial]
fn styles_returns_plain_when_no_color() {
    disable_color();
    assert_eq!(format!("{:?}", styles()), format!("{:?}", Styles::plain()));
}

#[test]
#[serial]
fn header_produces_ansi_when_color_forced() {
    force_color();
    let result = header("foo");
    assert!(result.starts_with(codes::HEADER_START));
    assert!(result.ends_with(codes::RESET));
}

#[test]
#[serial]
fn helpers_plain_when_no_color() {
    disable_color();
    assert_eq!(header("foo"), "foo");
    assert_eq!(muted("dim"), "dim");
    assert_eq!(status("working"), "working");
}

#[test]
#[serial]
fn no_color_overrides_force() {
    std::env::set_var("NO_COLOR", "1");
    std::env::set_var("COLOR", "1");
    assert!(!should_colorize(), "NO_COLOR=1 should override COLOR=1");
}

#[parameterized(
    working = { "working", Some("\x1b[32m") },
    idle = { "idle", Some("\x1b[33m") },
    waiting_permission = { "waiting_permission", Some("\x1b[33m") },
    offline = { "offline", Some("\x1b[31m") },
    killed = { "killed", Some("\x1b[31m") },
    mixed_case = { "Working", Some("\x1b[32m") },
    unknown = { "custom", None },
)]
fn session_statuses_are_colored(text: &str, code: Option<&str>) {
    let result = apply_status(text);
    match code {
        Some(code) => {
            assert!(result.starts_with(code), "{text} should start with {code:?}");
            assert!(result.contains(text), "original casing is kept");
        }
        None => assert_eq!(result, text),
    }
}
