// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::FakeSessionAdapter;
use std::io::Write;
use tempfile::TempDir;

fn append(path: &Path, text: &str) {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap()
        .write_all(text.as_bytes())
        .unwrap();
}

#[tokio::test]
async fn read_from_advances_offset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.log");
    append(&path, "abc");

    let mut offset = 0;
    assert_eq!(read_from(&path, &mut offset).await.unwrap(), b"abc");
    assert_eq!(offset, 3);
    assert!(read_from(&path, &mut offset).await.unwrap().is_empty());

    append(&path, "de");
    assert_eq!(read_from(&path, &mut offset).await.unwrap(), b"de");
    assert_eq!(offset, 5);
}

#[tokio::test]
async fn read_from_restarts_after_truncation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.log");
    append(&path, "long line\n");
    let mut offset = 10;

    std::fs::write(&path, "x").unwrap();
    assert_eq!(read_from(&path, &mut offset).await.unwrap(), b"x");
    assert_eq!(offset, 1);
}

#[tokio::test]
async fn polling_works_without_notifications() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.log");
    let fake = FakeSessionAdapter::new();
    fake.add_session("sb-a", dir.path(), true);
    let (tx, mut rx) = mpsc::channel(16);

    // Watching a file that does not exist yet fails; polling takes over
    let handle = start_watcher(
        WatcherConfig {
            session_id: SessionId::new("s-1"),
            process_ref: "sb-a".to_string(),
            pipe_path: path.clone(),
            offset: 0,
            poll_interval: Duration::from_millis(10),
            quiet_after: Duration::from_secs(60),
            on_gone: Box::new(|| {}),
        },
        fake,
        tx,
    );
    append(&path, "late\n");

    let envelope = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(envelope.event.is_output());
    drop(handle);
}

#[tokio::test]
async fn shutdown_stops_the_watcher() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.log");
    append(&path, "");
    let fake = FakeSessionAdapter::new();
    fake.add_session("sb-a", dir.path(), true);
    let (tx, mut rx) = mpsc::channel(16);

    let handle = start_watcher(
        WatcherConfig {
            session_id: SessionId::new("s-1"),
            process_ref: "sb-a".to_string(),
            pipe_path: path,
            offset: 0,
            poll_interval: Duration::from_millis(10),
            quiet_after: Duration::from_secs(60),
            on_gone: Box::new(|| {}),
        },
        fake,
        tx,
    );
    handle.shutdown.send(()).unwrap();

    // The sender is dropped when the task ends
    let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}
