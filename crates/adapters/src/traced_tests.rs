// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::FakeSessionAdapter;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a future on a fresh runtime with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

fn assert_log(logs: &str, label: &str, expected: &str) {
    assert!(logs.contains(expected), "Should log {label}. Logs:\n{logs}");
}

#[test]
#[serial(tracing)]
fn spawn_logs_span_and_timing() {
    let (logs, result) = with_tracing(|| async {
        TracedSession::new(FakeSessionAdapter::new())
            .spawn("sb-scout", Path::new("/tmp"), "claude", &[])
            .await
    });

    assert_eq!(result.unwrap(), "sb-scout");
    assert_log(&logs, "span name", "session.spawn");
    assert_log(&logs, "session name", "sb-scout");
    assert_log(&logs, "completion", "session created");
    assert_log(&logs, "timing", "elapsed_ms");
}

#[test]
#[serial(tracing)]
fn failed_send_is_logged() {
    let (logs, result) = with_tracing(|| async {
        TracedSession::new(FakeSessionAdapter::new())
            .send_literal("sb-missing", "hi")
            .await
    });

    assert!(result.is_err());
    assert_log(&logs, "send span", "session.send");
    assert_log(&logs, "failure", "send failed");
}

#[test]
#[serial(tracing)]
fn kill_and_pipe_are_logged() {
    let (logs, _) = with_tracing(|| async {
        let traced = TracedSession::new(FakeSessionAdapter::new());
        let id = traced
            .spawn("sb-a", Path::new("/tmp"), "claude", &[])
            .await
            .unwrap();
        traced
            .pipe_output(&id, Path::new("/tmp/sb-a.log"))
            .await
            .unwrap();
        traced.kill(&id).await
    });

    assert_log(&logs, "pipe", "output piped");
    assert_log(&logs, "kill span", "session.kill");
    assert_log(&logs, "kill completion", "killed");
}

#[tokio::test]
async fn delegates_to_inner_adapter() {
    let fake = FakeSessionAdapter::new();
    let traced = TracedSession::new(fake.clone());
    traced
        .spawn("sb-a", Path::new("/tmp"), "claude", &[])
        .await
        .unwrap();
    traced.send_key("sb-a", "Escape").await.unwrap();
    assert_eq!(fake.typed("sb-a"), vec!["<Escape>"]);
    assert!(traced.inner().get_session("sb-a").is_some());
}
