// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, serving, shutdown.
//!
//! tmux sessions outlive the daemon. Shutdown only stops watching them;
//! the next startup adopts whatever is still running.

use std::fs::File;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use fs2::FileExt;
use sb_adapters::{ProcessAdapter, ProcessConfig, SessionAdapter, TmuxAdapter, TracedSession};
use sb_core::{Clock, SystemClock};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::event_bus::{EventBus, Subscription};
use crate::registry::{RegistryConfig, SessionRegistry};
use crate::server::{self, AppState, SharedState};
use crate::transport::TransportManager;

/// Output envelopes in flight between pane watchers and the registry
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Session adapter used by the real daemon (wrapped with tracing)
pub type DaemonSessions = TracedSession<TmuxAdapter>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, #[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything behind the HTTP surface, independent of the concrete
/// session adapter and clock.
pub struct Services<S: SessionAdapter, C: Clock> {
    pub registry: Arc<SessionRegistry<S, C>>,
    pub state: SharedState<S, C>,
    // Routes mail events to agent transports while held
    _mail: Subscription,
    output_loop: JoinHandle<()>,
}

impl<S: SessionAdapter, C: Clock> Services<S, C> {
    /// Wire the registry, bus and transports together and start the
    /// registry's output loop.
    pub fn start(config: &Config, sessions: S, clock: C) -> Self {
        let settings = &config.settings;
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let process_config = ProcessConfig {
            command: settings.agent_command.clone(),
            prefix: settings.session_prefix.clone(),
            interrupt_key: settings.interrupt_key.clone(),
            poll_interval: settings.watcher_poll(),
            quiet_after: settings.quiet_after(),
            ..ProcessConfig::new(&config.pipes_dir, &config.workspaces_dir)
        };
        let process = ProcessAdapter::new(sessions, process_config, output_tx);
        let bus = EventBus::new(settings.bus_retention, clock.clone());
        let registry = Arc::new(SessionRegistry::new(
            process,
            bus.clone(),
            clock.clone(),
            RegistryConfig {
                replay_chunks: settings.replay_buffer_chunks,
                replay_bytes: settings.replay_buffer_bytes,
            },
        ));

        let runner = Arc::clone(&registry);
        let output_loop = tokio::spawn(async move { runner.run(output_rx).await });

        let transports = TransportManager::new(clock);
        let mail = transports.attach_to_bus(&bus);
        let state = Arc::new(AppState::new(
            Arc::clone(&registry),
            transports,
            &config.shared_secret,
            settings.clone(),
        ));

        Self {
            registry,
            state,
            _mail: mail,
            output_loop,
        }
    }

    /// Start the periodic discovery sweep.
    pub fn spawn_discovery(&self) -> JoinHandle<()> {
        let interval = self.state.settings.discovery_interval();
        tokio::spawn(crate::discovery::run(Arc::clone(&self.registry), interval))
    }

    /// Serve every HTTP surface on `listener` until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let app = server::router(Arc::clone(&self.state));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Stop watching panes. Sessions keep running.
    pub fn stop(&self) {
        self.registry.shutdown();
        self.output_loop.abort();
    }
}

/// The running daemon.
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub services: Services<DaemonSessions, SystemClock>,
    pub listener: TcpListener,
    discovery: JoinHandle<()>,
}

impl Daemon {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then clean up.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) {
        let Daemon {
            config,
            lock_file,
            services,
            listener,
            discovery,
        } = self;
        if let Err(e) = services.serve(listener, shutdown).await {
            warn!(error = %e, "server stopped with error");
        }
        discovery.abort();
        services.stop();
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!(error = %e, "failed to remove lock file");
        }
        // Lock is released when the file is dropped
        drop(lock_file);
        info!("daemon stopped");
    }
}

pub async fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Open without truncating so a running daemon's PID survives a failed lock
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    std::fs::create_dir_all(&config.pipes_dir)?;
    std::fs::create_dir_all(&config.workspaces_dir)?;

    let bind = config.settings.bind.clone();
    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            let _ = std::fs::remove_file(&config.lock_path);
            return Err(LifecycleError::BindFailed(bind, e));
        }
    };

    let sessions = TracedSession::new(TmuxAdapter::new());
    let services = Services::start(config, sessions, SystemClock);
    // First sweep runs immediately and adopts sessions from a previous run
    let discovery = services.spawn_discovery();

    info!(bind = %bind, "daemon started");
    Ok(Daemon {
        config: config.clone(),
        lock_file,
        services,
        listener,
        discovery,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
