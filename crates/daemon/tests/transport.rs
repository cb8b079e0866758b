// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/mcp` over raw HTTP: initialize, recovery and mail push

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{http, TestDaemon, SECRET};
use sb_daemon::registry::CreateSession;

fn post(agent: &str, transport: Option<&str>, body: &str) -> String {
    let transport = transport
        .map(|id| format!("mcp-session-id: {id}\r\n"))
        .unwrap_or_default();
    format!(
        "POST /mcp HTTP/1.1\r\nHost: sbd\r\nAuthorization: Bearer {SECRET}\r\nx-sb-session: {agent}\r\n{transport}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

async fn create(daemon: &TestDaemon, name: &str) {
    daemon
        .services
        .registry
        .create(CreateSession {
            name: name.into(),
            project_path: daemon.project.clone(),
            mode: Default::default(),
            workspace: Default::default(),
        })
        .await
        .unwrap();
}

fn header_value<'r>(response: &'r str, name: &str) -> Option<&'r str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

#[tokio::test]
async fn initialize_then_call_with_issued_id() {
    let daemon = TestDaemon::start().await;
    create(&daemon, "scout").await;

    let init = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
    let response = http(daemon.addr, &post("scout", None, init), |r| {
        r.contains("serverInfo")
    })
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let id = header_value(&response, "mcp-session-id").unwrap().to_string();
    assert!(id.starts_with("mcp-"));

    let list = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#;
    let response = http(daemon.addr, &post("scout", Some(&id), list), |r| {
        r.contains("notify_peer")
    })
    .await;
    assert_eq!(header_value(&response, "mcp-session-id"), Some(id.as_str()));
}

#[tokio::test]
async fn missing_id_on_a_tool_call_is_a_bad_request() {
    let daemon = TestDaemon::start().await;
    create(&daemon, "scout").await;
    let call = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
    let response = http(daemon.addr, &post("scout", None, call), |r| {
        r.contains("\r\n\r\n")
    })
    .await;
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");
}

#[tokio::test]
async fn mail_is_pushed_to_the_recipients_stream() {
    let daemon = TestDaemon::start().await;
    create(&daemon, "scout").await;
    create(&daemon, "medic").await;

    // medic opens a stream on a recovered transport
    let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    http(daemon.addr, &post("medic", Some("mcp-medic"), ping), |r| {
        r.contains("result")
    })
    .await;
    let stream_request = format!(
        "GET /mcp HTTP/1.1\r\nHost: sbd\r\nAuthorization: Bearer {SECRET}\r\nx-sb-session: medic\r\nmcp-session-id: mcp-medic\r\n\r\n"
    );
    let addr = daemon.addr;
    let stream = tokio::spawn(async move {
        http(addr, &stream_request, |r| r.contains("notifications/message")).await
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let send = r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"send_mail","arguments":{"to":"medic","body":"tests are green"}}}"#;
    let response = http(daemon.addr, &post("scout", Some("mcp-scout"), send), |r| {
        r.contains("isError")
    })
    .await;
    assert!(response.contains(r#""isError":false"#), "{response}");

    let pushed = stream.await.unwrap();
    assert!(pushed.contains("event: message"));
    assert!(pushed.contains("tests are green"));
}
