// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process daemon on an ephemeral port, backed by the fake tmux adapter

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sb_adapters::FakeSessionAdapter;
use sb_core::FakeClock;
use sb_daemon::gateway::backoff::Backoff;
use sb_daemon::{ClientConfig, Config, GatewayClient, ServerMessage, Services};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-secret";

pub struct TestDaemon {
    _dir: TempDir,
    pub addr: SocketAddr,
    pub project: PathBuf,
    pub fake: FakeSessionAdapter,
    pub clock: FakeClock,
    pub services: Services<FakeSessionAdapter, FakeClock>,
}

impl TestDaemon {
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir(&project).unwrap();

        let mut config = Config::for_state_dir(dir.path().join("state")).unwrap();
        config.shared_secret = SECRET.to_string();
        config.settings.watcher_poll_ms = 10;
        config.settings.quiet_after_ms = 30_000;
        config.settings.auth_timeout_secs = 1;

        let fake = FakeSessionAdapter::new();
        let clock = FakeClock::new();
        let services = Services::start(&config, fake.clone(), clock.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = sb_daemon::server::router(Arc::clone(&services.state));
        tokio::spawn(async move { axum::serve(listener, app).await });

        Self {
            _dir: dir,
            addr,
            project,
            fake,
            clock,
            services,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            backoff: Backoff {
                initial: Duration::from_millis(5),
                max: Duration::from_millis(20),
                max_attempts: 3,
            },
            ..ClientConfig::new(self.ws_url(), SECRET)
        }
    }

    pub async fn client(&self) -> GatewayClient {
        let mut client = GatewayClient::new(self.client_config());
        client.connect().await.unwrap();
        client
    }
}

/// TCP relay in front of the daemon whose connections can be cut, so
/// clients see the server side vanish mid-stream.
pub struct Relay {
    pub addr: SocketAddr,
    links: Arc<std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl Relay {
    pub async fn start(target: SocketAddr) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let links = Arc::new(std::sync::Mutex::new(Vec::new()));
        let accepted = Arc::clone(&links);
        tokio::spawn(async move {
            while let Ok((mut inbound, _)) = listener.accept().await {
                let link = tokio::spawn(async move {
                    if let Ok(mut outbound) = tokio::net::TcpStream::connect(target).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
                accepted.lock().unwrap().push(link);
            }
        });
        Self { addr, links }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Drop every relayed connection without a close handshake.
    pub fn cut(&self) {
        for link in self.links.lock().unwrap().drain(..) {
            link.abort();
        }
    }
}

/// Next message matching `pred`, skipping others.
pub async fn expect<F>(client: &mut GatewayClient, what: &str, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = client.next().await.unwrap();
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Send a raw HTTP/1.1 request and read until `done` holds for the
/// accumulated response (or the server closes).
pub async fn http(addr: SocketAddr, request: &str, done: impl Fn(&str) -> bool) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    let mut buf = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            response.push_str(&String::from_utf8_lossy(&buf[..n]));
            if done(&response) {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out; got so far:\n{response}"));
    response
}
