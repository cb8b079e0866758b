// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests that need a full [`AppState`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use sb_adapters::{FakeSessionAdapter, ProcessAdapter, ProcessConfig};
use sb_core::{FakeClock, Session, SessionMode, WorkspaceKind};
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::event_bus::EventBus;
use crate::registry::{CreateSession, RegistryConfig, SessionRegistry};
use crate::server::{AppState, SharedState};
use crate::transport::TransportManager;

pub(crate) const SECRET: &str = "test-secret";

pub(crate) struct TestApp {
    _dir: TempDir,
    pub project: PathBuf,
    pub fake: FakeSessionAdapter,
    pub clock: FakeClock,
    pub state: SharedState<FakeSessionAdapter, FakeClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir(&project).unwrap();
        let fake = FakeSessionAdapter::new();
        let clock = FakeClock::new();
        let (tx, rx) = mpsc::channel(256);
        let config = ProcessConfig {
            poll_interval: Duration::from_millis(10),
            quiet_after: Duration::from_secs(30),
            ..ProcessConfig::new(dir.path().join("pipes"), dir.path().join("workspaces"))
        };
        let process = ProcessAdapter::new(fake.clone(), config, tx);
        let bus = EventBus::new(100, clock.clone());
        let registry = Arc::new(SessionRegistry::new(
            process,
            bus,
            clock.clone(),
            RegistryConfig::default(),
        ));
        let runner = Arc::clone(&registry);
        tokio::spawn(async move { runner.run(rx).await });

        let transports = TransportManager::new(clock.clone());
        let state = Arc::new(AppState::new(
            registry,
            transports,
            SECRET,
            Settings::default(),
        ));
        Self {
            _dir: dir,
            project,
            fake,
            clock,
            state,
        }
    }

    pub async fn create(&self, name: &str) -> Session {
        let session = self
            .state
            .registry
            .create(CreateSession {
                name: name.to_string(),
                project_path: self.project.clone(),
                mode: SessionMode::Swarm,
                workspace: WorkspaceKind::Shared,
            })
            .await
            .unwrap();
        self.clock.advance(Duration::from_millis(1));
        session
    }
}

/// Headers carrying the bearer secret.
pub(crate) fn authed() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {SECRET}")).unwrap(),
    );
    headers
}
