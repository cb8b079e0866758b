// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect schedule: exponential, capped, with jitter

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    /// Connection attempts before giving up
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl Backoff {
    /// Delay after failed attempt `attempt` (0-based), before jitter.
    pub fn base(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Jittered delay for a `unit` drawn from `[0, 1]`: between half and
    /// all of the base delay.
    pub fn delay(&self, attempt: u32, unit: f64) -> Duration {
        self.base(attempt).mul_f64(0.5 + 0.5 * unit.clamp(0.0, 1.0))
    }

    pub fn jittered(&self, attempt: u32) -> Duration {
        self.delay(attempt, rand::rng().random::<f64>())
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
