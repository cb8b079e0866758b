// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sb_adapters::{FakeSessionAdapter, ProcessConfig};
use sb_core::{ActivityHint, FakeClock};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type Registry = SessionRegistry<FakeSessionAdapter, FakeClock>;

struct Harness {
    _dir: TempDir,
    project: PathBuf,
    fake: FakeSessionAdapter,
    clock: FakeClock,
    registry: Arc<Registry>,
}

fn harness() -> Harness {
    harness_polling(Duration::from_millis(10))
}

/// A long poll interval keeps watchers from noticing exits on their own.
fn harness_polling(poll_interval: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir(&project).unwrap();
    let fake = FakeSessionAdapter::new();
    let clock = FakeClock::new();
    let (tx, rx) = mpsc::channel(256);
    let config = ProcessConfig {
        poll_interval,
        quiet_after: Duration::from_secs(30),
        ..ProcessConfig::new(dir.path().join("pipes"), dir.path().join("workspaces"))
    };
    let process = ProcessAdapter::new(fake.clone(), config, tx);
    let bus = EventBus::new(100, clock.clone());
    let registry = Arc::new(SessionRegistry::new(
        process,
        bus,
        clock.clone(),
        RegistryConfig {
            replay_chunks: 3,
            replay_bytes: 1024,
        },
    ));
    let runner = Arc::clone(&registry);
    tokio::spawn(async move { runner.run(rx).await });
    Harness {
        _dir: dir,
        project,
        fake,
        clock,
        registry,
    }
}

fn create_req(h: &Harness, name: &str) -> CreateSession {
    CreateSession {
        name: name.to_string(),
        project_path: h.project.clone(),
        mode: SessionMode::Swarm,
        workspace: WorkspaceKind::Shared,
    }
}

async fn create(h: &Harness, name: &str) -> Session {
    let session = h.registry.create(create_req(h, name)).await.unwrap();
    h.clock.advance(Duration::from_millis(1));
    session
}

fn output(text: &str) -> SessionEvent {
    SessionEvent::Output {
        raw: text.to_string(),
        text: text.to_string(),
        activity: true,
    }
}

fn feed(h: &Harness, id: &SessionId, event: SessionEvent) {
    h.registry
        .apply_output(OutputEnvelope::new(id.clone(), event));
}

fn status_of(h: &Harness, id: &SessionId) -> SessionStatus {
    h.registry.get(id).unwrap().status()
}

async fn wait_status(
    rx: &mut broadcast::Receiver<FeedItem>,
    id: &SessionId,
    status: SessionStatus,
) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await.unwrap().change {
                SessionFeed::Status {
                    session_id,
                    status: s,
                    ..
                } if session_id == *id && s == status => return,
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for status");
}

/// Statuses published on the feed so far, in order.
fn drain_statuses(rx: &mut broadcast::Receiver<FeedItem>) -> Vec<SessionStatus> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        if let SessionFeed::Status { status, .. } = item.change {
            out.push(status);
        }
    }
    out
}

#[tokio::test]
async fn create_starts_idle_and_announces_it() {
    let h = harness();
    let session = create(&h, "scout").await;

    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.process_ref, "sb-scout");
    assert!(session.id.as_str().starts_with("s-"));
    assert_eq!(h.registry.list().len(), 1);

    let replay = h.registry.bus().replay_since(0);
    assert_eq!(replay.events.len(), 1);
    assert_eq!(
        replay.events[0].event,
        BusEvent::AgentStatus {
            session_id: session.id.clone(),
            name: "scout".to_string(),
            status: SessionStatus::Idle,
        }
    );
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let h = harness();
    let err = h.registry.create(create_req(&h, "  ")).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidName(_)));
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn live_name_conflicts_until_it_goes_offline() {
    let h = harness();
    let mut rx = h.registry.subscribe();
    let first = create(&h, "scout").await;

    let err = h.registry.create(create_req(&h, "scout")).await.unwrap_err();
    assert!(matches!(err, RegistryError::NameConflict(ref n) if n == "scout"));

    h.fake.set_exited("sb-scout", 0);
    wait_status(&mut rx, &first.id, SessionStatus::Offline).await;

    let second = create(&h, "scout").await;
    assert_ne!(second.id, first.id);
    assert_eq!(h.registry.find_by_name("scout").len(), 2);
}

#[tokio::test]
async fn concurrent_creates_with_one_name_have_one_winner() {
    let h = harness();
    let (a, b) = tokio::join!(
        h.registry.create(create_req(&h, "scout")),
        h.registry.create(create_req(&h, "scout"))
    );
    let (won, lost) = match (a, b) {
        (Ok(s), Err(e)) | (Err(e), Ok(s)) => (s, e),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(won.name, "scout");
    assert!(matches!(lost, RegistryError::NameConflict(_)));
    assert_eq!(h.registry.list().len(), 1);
}

#[tokio::test]
async fn failed_spawn_releases_the_name() {
    let h = harness();
    h.fake.fail_next_spawn("no server");
    let err = h.registry.create(create_req(&h, "scout")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Spawn(_)));
    assert!(h.registry.list().is_empty());

    create(&h, "scout").await;
}

#[tokio::test]
async fn pane_output_marks_working_and_is_buffered() {
    let h = harness();
    let mut rx = h.registry.subscribe();
    let session = create(&h, "scout").await;

    assert!(h.fake.emit("sb-scout", "hello\n"));
    wait_status(&mut rx, &session.id, SessionStatus::Working).await;

    let attached = h
        .registry
        .connect_client(&session.id, &ClientId::new("c1"), true)
        .unwrap();
    assert_eq!(attached.buffer.len(), 1);
    assert_eq!(attached.buffer[0].text, "hello\n");
    assert_eq!(attached.last_chunk_seq, 1);
}

#[tokio::test]
async fn output_feed_carries_chunk_sequence() {
    let h = harness();
    let session = create(&h, "scout").await;
    let mut rx = h.registry.subscribe();

    feed(&h, &session.id, output("one"));
    feed(&h, &session.id, output("two"));

    let chunks: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|item| match item.change {
            SessionFeed::Output {
                chunk_seq, text, ..
            } => Some((chunk_seq, text)),
            _ => None,
        })
        .collect();
    assert_eq!(
        chunks,
        vec![(1, "one".to_string()), (2, "two".to_string())]
    );
}

#[tokio::test]
async fn connect_client_has_set_semantics() {
    let h = harness();
    let session = create(&h, "scout").await;
    for text in ["a", "b", "c", "d", "e"] {
        feed(&h, &session.id, output(text));
    }
    let client = ClientId::new("c1");

    let first = h
        .registry
        .connect_client(&session.id, &client, true)
        .unwrap();
    let second = h
        .registry
        .connect_client(&session.id, &client, true)
        .unwrap();

    assert_eq!(second.session.clients.len(), 1);
    assert_eq!(first.buffer, second.buffer);
    let seqs: Vec<_> = first.buffer.iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![3, 4, 5]);

    let live_only = h
        .registry
        .connect_client(&session.id, &ClientId::new("c2"), false)
        .unwrap();
    assert!(live_only.buffer.is_empty());
    assert_eq!(live_only.last_chunk_seq, 5);
}

#[tokio::test]
async fn attach_snapshot_marks_the_feed_position() {
    let h = harness();
    let session = create(&h, "scout").await;
    let mut rx = h.registry.subscribe();
    feed(&h, &session.id, output("before"));

    let attached = h
        .registry
        .connect_client(&session.id, &ClientId::new("c1"), true)
        .unwrap();
    feed(&h, &session.id, output("after"));

    let items: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    let (old, new): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|item| item.seq <= attached.feed_seq);
    assert!(old
        .iter()
        .any(|i| matches!(&i.change, SessionFeed::Output { text, .. } if text == "before")));
    assert!(new
        .iter()
        .all(|i| !matches!(&i.change, SessionFeed::Output { text, .. } if text == "before")));
    assert!(new
        .iter()
        .any(|i| matches!(&i.change, SessionFeed::Output { text, .. } if text == "after")));
}

#[tokio::test]
async fn connect_to_unknown_session_is_not_found() {
    let h = harness();
    let err = h
        .registry
        .connect_client(&SessionId::new("nope"), &ClientId::new("c1"), true)
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn clients_disconnect_per_session_or_everywhere() {
    let h = harness();
    let a = create(&h, "a").await;
    let b = create(&h, "b").await;
    let client = ClientId::new("c1");
    h.registry.connect_client(&a.id, &client, false).unwrap();
    h.registry.connect_client(&b.id, &client, false).unwrap();

    assert!(h.registry.disconnect_client(&a.id, &client));
    assert!(!h.registry.disconnect_client(&a.id, &client));
    assert!(h.registry.get(&b.id).unwrap().clients.contains(&client));

    h.registry.disconnect_client_everywhere(&client);
    assert!(h.registry.get(&b.id).unwrap().clients.is_empty());
}

#[tokio::test]
async fn approving_a_prompt_resumes_work() {
    let h = harness();
    let session = create(&h, "scout").await;
    feed(
        &h,
        &session.id,
        SessionEvent::PermissionRequested {
            tool: Some("Bash".to_string()),
            prompt: "Do you want to proceed?".to_string(),
        },
    );
    assert_eq!(status_of(&h, &session.id), SessionStatus::WaitingPermission);

    assert!(h
        .registry
        .send_permission_response(&session.id, true)
        .await
        .unwrap());
    assert_eq!(status_of(&h, &session.id), SessionStatus::Working);
    assert_eq!(h.fake.typed("sb-scout"), vec!["<Enter>"]);
}

#[tokio::test]
async fn denying_a_prompt_goes_idle() {
    let h = harness();
    let session = create(&h, "scout").await;
    feed(
        &h,
        &session.id,
        SessionEvent::PermissionRequested {
            tool: None,
            prompt: "Allow this action?".to_string(),
        },
    );

    assert!(h
        .registry
        .send_permission_response(&session.id, false)
        .await
        .unwrap());
    assert_eq!(status_of(&h, &session.id), SessionStatus::Idle);
    assert_eq!(h.fake.typed("sb-scout"), vec!["<Escape>"]);
}

#[tokio::test]
async fn permission_response_without_prompt_is_not_delivered() {
    let h = harness();
    let session = create(&h, "scout").await;

    assert!(!h
        .registry
        .send_permission_response(&session.id, true)
        .await
        .unwrap());
    assert!(h.fake.typed("sb-scout").is_empty());
    assert_eq!(status_of(&h, &session.id), SessionStatus::Idle);
}

#[tokio::test]
async fn input_during_prompt_is_delivered_and_leaves_it_pending() {
    let h = harness();
    let session = create(&h, "scout").await;
    feed(
        &h,
        &session.id,
        SessionEvent::PermissionRequested {
            tool: None,
            prompt: "(y/n)".to_string(),
        },
    );

    assert!(h.registry.send_input(&session.id, "wait").await.unwrap());
    assert_eq!(h.fake.typed("sb-scout"), vec!["wait", "<Enter>"]);
    assert_eq!(status_of(&h, &session.id), SessionStatus::WaitingPermission);
}

#[tokio::test]
async fn quiet_during_prompt_is_ignored() {
    let h = harness();
    let session = create(&h, "scout").await;
    feed(
        &h,
        &session.id,
        SessionEvent::PermissionRequested {
            tool: None,
            prompt: "(y/n)".to_string(),
        },
    );
    feed(
        &h,
        &session.id,
        SessionEvent::StatusChanged {
            activity: ActivityHint::Idle,
        },
    );
    assert_eq!(status_of(&h, &session.id), SessionStatus::WaitingPermission);
}

#[tokio::test]
async fn actions_on_offline_session_are_not_delivered() {
    let h = harness();
    let session = create(&h, "scout").await;
    feed(&h, &session.id, SessionEvent::ProcessGone { exit_code: Some(1) });
    let offline = h.registry.get(&session.id).unwrap();
    assert!(offline.is_offline());
    assert!(!offline.pipe_alive);

    assert!(!h.registry.send_input(&session.id, "hi").await.unwrap());
    assert!(!h.registry.send_interrupt(&session.id).await.unwrap());
    assert!(!h
        .registry
        .send_permission_response(&session.id, true)
        .await
        .unwrap());
    assert!(h.fake.typed("sb-scout").is_empty());

    let err = h
        .registry
        .send_input(&SessionId::new("ghost"), "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn activity_on_offline_session_reattaches_first() {
    let h = harness();
    let session = create(&h, "scout").await;
    feed(&h, &session.id, SessionEvent::ProcessGone { exit_code: None });
    let mut rx = h.registry.subscribe();

    feed(&h, &session.id, output("still here"));

    assert_eq!(
        drain_statuses(&mut rx),
        vec![SessionStatus::Idle, SessionStatus::Working]
    );
    assert!(h.registry.get(&session.id).unwrap().pipe_alive);
}

#[tokio::test]
async fn typed_events_are_fed_and_count_as_activity() {
    let h = harness();
    let session = create(&h, "scout").await;
    let mut rx = h.registry.subscribe();
    let cost = SessionEvent::CostUpdate {
        input_tokens: 1200,
        output_tokens: 300,
        cost_usd: None,
    };

    feed(&h, &session.id, cost.clone());

    assert_eq!(
        rx.try_recv().unwrap().change,
        SessionFeed::Event {
            session_id: session.id.clone(),
            event: cost,
        }
    );
    assert_eq!(status_of(&h, &session.id), SessionStatus::Working);
}

#[tokio::test]
async fn kill_forgets_the_session_once() {
    let h = harness();
    let session = create(&h, "scout").await;
    let mut rx = h.registry.subscribe();

    assert!(h.registry.kill(&session.id).await);
    assert!(!h.registry.kill(&session.id).await);
    assert!(h.registry.get(&session.id).is_none());
    assert!(h.fake.get_session("sb-scout").is_none());
    assert_eq!(
        rx.try_recv().unwrap().change,
        SessionFeed::Removed {
            session_id: session.id.clone()
        }
    );
}

#[tokio::test]
async fn killing_offline_session_spares_live_namesake() {
    let h = harness();
    let mut rx = h.registry.subscribe();
    let old = create(&h, "scout").await;
    h.fake.set_exited("sb-scout", 0);
    wait_status(&mut rx, &old.id, SessionStatus::Offline).await;
    let new = create(&h, "scout").await;
    assert_eq!(new.process_ref, old.process_ref);

    assert!(h.registry.kill(&old.id).await);

    assert!(h.fake.get_session("sb-scout").unwrap().alive);
    assert!(h.registry.send_input(&new.id, "keep going").await.unwrap());
}

#[tokio::test]
async fn namesake_is_spared_even_before_the_watcher_notices() {
    // The exit is reported by hand while the old watcher is still attached
    let h = harness_polling(Duration::from_secs(60));
    let old = create(&h, "scout").await;
    h.fake.set_exited("sb-scout", 0);
    feed(&h, &old.id, SessionEvent::ProcessGone { exit_code: Some(0) });
    let new = create(&h, "scout").await;

    assert!(h.registry.kill(&old.id).await);

    assert!(h.fake.get_session("sb-scout").unwrap().alive);
    assert!(h.registry.send_input(&new.id, "keep going").await.unwrap());
}

#[tokio::test]
async fn killing_offline_session_clears_its_dead_pane() {
    let h = harness();
    let mut rx = h.registry.subscribe();
    let session = create(&h, "scout").await;
    h.fake.set_exited("sb-scout", 2);
    wait_status(&mut rx, &session.id, SessionStatus::Offline).await;

    assert!(h.registry.kill(&session.id).await);
    assert!(h.fake.get_session("sb-scout").is_none());
}

#[tokio::test]
async fn respawn_revives_offline_session_in_place() {
    let h = harness_polling(Duration::from_secs(60));
    let session = create(&h, "scout").await;

    let err = h.registry.respawn(&session.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotOffline(_)));

    h.fake.set_exited("sb-scout", 1);
    feed(&h, &session.id, SessionEvent::ProcessGone { exit_code: Some(1) });

    let revived = h.registry.respawn(&session.id).await.unwrap();
    assert_eq!(revived.id, session.id);
    assert_eq!(revived.status(), SessionStatus::Idle);
    assert!(h.fake.get_session("sb-scout").unwrap().alive);

    assert!(h.registry.send_input(&session.id, "go on").await.unwrap());
}

#[tokio::test]
async fn respawn_is_refused_while_the_name_is_live_elsewhere() {
    let h = harness();
    let old = create(&h, "scout").await;
    feed(&h, &old.id, SessionEvent::ProcessGone { exit_code: None });
    create(&h, "scout").await;

    let err = h.registry.respawn(&old.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::NameConflict(_)));
}

#[tokio::test]
async fn resolve_prefers_live_session_by_name() {
    let h = harness();
    let old = create(&h, "scout").await;
    feed(&h, &old.id, SessionEvent::ProcessGone { exit_code: None });
    let live = create(&h, "scout").await;

    assert_eq!(h.registry.resolve("scout").unwrap().id, live.id);
    assert_eq!(h.registry.resolve(old.id.as_str()).unwrap().id, old.id);
    assert!(h.registry.resolve("nobody").is_none());
}

#[tokio::test]
async fn capture_reads_the_pane() {
    let h = harness();
    let session = create(&h, "scout").await;
    h.fake.set_pane("sb-scout", "\x1b[1m>\x1b[0m ready");

    assert_eq!(
        h.registry.capture_pane(&session.id, true).await.unwrap(),
        "\x1b[1m>\x1b[0m ready"
    );
    let err = h
        .registry
        .capture_pane(&SessionId::new("nope"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn reconcile_adopts_prefixed_processes_only() {
    let h = harness();
    h.fake.add_session("sb-orphan", &h.project, true);
    h.fake.add_session("scratch", &h.project, true);

    let report = h.registry.reconcile().await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            adopted: 1,
            ..Default::default()
        }
    );
    let adopted = h.registry.find_by_name("orphan");
    assert_eq!(adopted.len(), 1);
    assert_eq!(adopted[0].process_ref, "sb-orphan");
    assert_eq!(adopted[0].workspace_path, h.project);
    assert_eq!(adopted[0].status(), SessionStatus::Idle);

    // Already tracked on the next sweep
    let again = h.registry.reconcile().await.unwrap();
    assert_eq!(again, ReconcileReport::default());
}

#[tokio::test]
async fn reconcile_marks_vanished_processes_offline() {
    let h = harness_polling(Duration::from_secs(60));
    let session = create(&h, "scout").await;
    h.fake.set_exited("sb-scout", 0);

    let report = h.registry.reconcile().await.unwrap();
    assert_eq!(report.offlined, 1);
    assert!(h.registry.get(&session.id).unwrap().is_offline());
}

#[tokio::test]
async fn reconcile_revives_offline_session_with_live_process() {
    let h = harness_polling(Duration::from_secs(60));
    let session = create(&h, "scout").await;
    feed(&h, &session.id, SessionEvent::ProcessGone { exit_code: None });

    let report = h.registry.reconcile().await.unwrap();
    assert_eq!(report.revived, 1);
    assert_eq!(status_of(&h, &session.id), SessionStatus::Idle);
}
