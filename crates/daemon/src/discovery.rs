// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic discovery sweep keeping the registry in step with tmux

use std::sync::Arc;
use std::time::Duration;

use sb_adapters::SessionAdapter;
use sb_core::Clock;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::registry::SessionRegistry;

/// Reconcile once right away, then every `interval`.
pub async fn run<S: SessionAdapter, C: Clock>(
    registry: Arc<SessionRegistry<S, C>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match registry.reconcile().await {
            Ok(report) if report.adopted + report.offlined + report.revived > 0 => {
                info!(
                    adopted = report.adopted,
                    offlined = report.offlined,
                    revived = report.revived,
                    "discovery sweep"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "discovery sweep failed"),
        }
    }
}
