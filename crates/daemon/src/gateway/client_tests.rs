// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event_bus::Gap;
use crate::gateway::protocol::{WireEvent, PROTOCOL_VERSION};
use sb_core::{SessionId, SessionStatus};
use tokio::net::TcpListener;

fn quick_config(url: String) -> ClientConfig {
    ClientConfig {
        backoff: Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_attempts: 3,
        },
        auth_timeout: Duration::from_secs(2),
        ..ClientConfig::new(url, "s3cret")
    }
}

/// Accept one socket, send the challenge and answer the first message
/// with `reply`.
async fn one_shot_server(reply: ServerMessage) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let challenge = ServerMessage::AuthChallenge {
            protocol: PROTOCOL_VERSION,
        };
        ws.send(WsMessage::Text(protocol::encode(&challenge).unwrap().into()))
            .await
            .unwrap();
        let _ = ws.next().await;
        ws.send(WsMessage::Text(protocol::encode(&reply).unwrap().into()))
            .await
            .unwrap();
        let _ = ws.close(None).await;
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn unreachable_gateway_exhausts_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = GatewayClient::new(quick_config(format!("ws://{addr}/ws")));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, GatewayClientError::Exhausted { attempts: 3 }));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let url = one_shot_server(ServerMessage::error(ErrorCode::AuthFailed, "nope")).await;
    let mut client = GatewayClient::new(quick_config(url));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, GatewayClientError::AuthFailed(ref m) if m == "nope"));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connected_adopts_server_client_id_and_seq() {
    let url = one_shot_server(ServerMessage::Connected {
        client_id: ClientId::new("cli-7"),
        last_seq: 41,
    })
    .await;
    let mut client = GatewayClient::new(quick_config(url));
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.client_id().map(ClientId::as_str), Some("cli-7"));
    assert_eq!(client.last_seq_seen(), 41);
}

#[test]
fn session_attachments_are_tracked() {
    let mut client = GatewayClient::new(ClientConfig::new("ws://unused", "s"));
    client.track(&ClientMessage::SessionConnect {
        session_id: "scout".into(),
        replay: true,
        raw: true,
    });
    client.track(&ClientMessage::SessionConnect {
        session_id: "medic".into(),
        replay: true,
        raw: false,
    });
    client.track(&ClientMessage::SessionDisconnect {
        session_id: "medic".into(),
    });
    assert_eq!(client.tracked_sessions().collect::<Vec<_>>(), vec!["scout"]);
}

#[test]
fn attachments_are_rekeyed_by_id_and_dropped_on_kill() {
    let mut client = GatewayClient::new(ClientConfig::new("ws://unused", "s"));
    client.track(&ClientMessage::SessionConnect {
        session_id: "scout".into(),
        replay: true,
        raw: false,
    });
    client.record(&ServerMessage::SessionConnected {
        session_id: SessionId::new("s-1"),
        name: "scout".into(),
        status: SessionStatus::Idle,
        buffer: vec![],
        raw: false,
    });
    assert_eq!(client.tracked_sessions().collect::<Vec<_>>(), vec!["s-1"]);

    client.record(&ServerMessage::SessionDisconnected {
        session_id: SessionId::new("s-1"),
        reason: Some("killed".into()),
    });
    assert_eq!(client.tracked_sessions().count(), 0);
}

#[test]
fn only_newer_seqs_are_acked() {
    let mut client = GatewayClient::new(ClientConfig {
        resume_from: Some(10),
        ..ClientConfig::new("ws://unused", "s")
    });
    let event = |seq| {
        ServerMessage::Event(WireEvent {
            seq,
            name: "mail".into(),
            action: Some("received".into()),
            payload: serde_json::json!({}),
        })
    };
    assert_eq!(client.record(&event(9)), None);
    assert_eq!(client.record(&event(11)), Some(11));
    assert_eq!(client.record(&ServerMessage::Gap(Gap { from: 12, to: 15 })), Some(15));
    assert_eq!(client.last_seq_seen(), 15);
}

#[test]
fn live_frames_before_the_resume_replay_do_not_move_the_cursor() {
    let mut client = GatewayClient::new(ClientConfig::new("ws://unused", "s"));
    client.last_seq_seen = 2;
    client.resume_pending = true;
    let event = |seq| {
        ServerMessage::Event(WireEvent {
            seq,
            name: "work_item".into(),
            action: Some("created".into()),
            payload: serde_json::json!({}),
        })
    };

    assert_eq!(client.record(&event(6)), None);
    assert_eq!(client.last_seq_seen(), 2);

    let replay = ServerMessage::SyncResponse {
        events: vec![],
        gap: None,
        last_seq: 6,
    };
    assert_eq!(client.record(&replay), Some(6));
    assert_eq!(client.record(&event(7)), Some(7));
}

/// Serve one scripted connection: challenge, capture the auth response,
/// then send `frames` and hold the socket until the client hangs up.
async fn scripted_connection(
    listener: &TcpListener,
    frames: Vec<ServerMessage>,
) -> (ClientMessage, Vec<ClientMessage>) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let challenge = ServerMessage::AuthChallenge {
        protocol: PROTOCOL_VERSION,
    };
    ws.send(WsMessage::Text(protocol::encode(&challenge).unwrap().into()))
        .await
        .unwrap();
    let auth = match ws.next().await {
        Some(Ok(WsMessage::Text(text))) => protocol::decode(text.as_str()).unwrap(),
        other => panic!("expected auth_response, got {other:?}"),
    };
    for frame in &frames {
        ws.send(WsMessage::Text(protocol::encode(frame).unwrap().into()))
            .await
            .unwrap();
    }
    let mut received = Vec::new();
    let collect = async {
        while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            received.push(protocol::decode(text.as_str()).unwrap());
        }
    };
    let _ = tokio::time::timeout(Duration::from_millis(200), collect).await;
    (auth, received)
}

#[tokio::test]
async fn reconnect_resumes_from_last_seen_and_resubscribes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let event = |seq| WireEvent {
        seq,
        name: "work_item".into(),
        action: Some("created".into()),
        payload: serde_json::json!({}),
    };

    let server = tokio::spawn(async move {
        // First connection dies right after one live event
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let challenge = ServerMessage::AuthChallenge {
            protocol: PROTOCOL_VERSION,
        };
        ws.send(WsMessage::Text(protocol::encode(&challenge).unwrap().into()))
            .await
            .unwrap();
        let _ = ws.next().await;
        for msg in [
            ServerMessage::Connected {
                client_id: ClientId::new("cli-1"),
                last_seq: 41,
            },
            ServerMessage::Event(event(42)),
        ] {
            ws.send(WsMessage::Text(protocol::encode(&msg).unwrap().into()))
                .await
                .unwrap();
        }
        // Wait for the session_connect, then vanish without a close frame
        while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            if matches!(
                protocol::decode::<ClientMessage>(text.as_str()),
                Ok(ClientMessage::SessionConnect { .. })
            ) {
                break;
            }
        }
        drop(ws);

        scripted_connection(
            &listener,
            vec![
                ServerMessage::Connected {
                    client_id: ClientId::new("cli-1"),
                    last_seq: 47,
                },
                ServerMessage::SyncResponse {
                    events: (43..=47).map(event).collect(),
                    gap: None,
                    last_seq: 47,
                },
            ],
        )
        .await
    });

    let mut client = GatewayClient::new(quick_config(url));
    client.connect().await.unwrap();
    assert!(matches!(client.next().await.unwrap(), ServerMessage::Event(ref e) if e.seq == 42));
    client
        .send(ClientMessage::SessionConnect {
            session_id: "scout".into(),
            replay: true,
            raw: true,
        })
        .await
        .unwrap();

    match client.next().await.unwrap() {
        ServerMessage::SyncResponse { events, .. } => {
            let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
            assert_eq!(seqs, vec![43, 44, 45, 46, 47]);
        }
        other => panic!("expected sync_response, got {other:?}"),
    }
    assert_eq!(client.last_seq_seen(), 47);
    client.close().await;

    let (auth, received) = server.await.unwrap();
    assert!(matches!(
        auth,
        ClientMessage::AuthResponse { resume_from: Some(42), ref client_id, .. }
            if client_id.as_ref().map(ClientId::as_str) == Some("cli-1")
    ));
    assert!(received.contains(&ClientMessage::SessionConnect {
        session_id: "scout".into(),
        replay: false,
        raw: true,
    }));
    assert!(!received
        .iter()
        .any(|m| matches!(m, ClientMessage::Sync { .. })));
}
