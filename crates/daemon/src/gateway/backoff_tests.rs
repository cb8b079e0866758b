// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    first = { 0, 500 },
    second = { 1, 1000 },
    fourth = { 3, 4000 },
    capped = { 6, 30_000 },
    huge_attempt = { 40, 30_000 },
)]
fn base_delay_doubles_up_to_cap(attempt: u32, expected_ms: u64) {
    assert_eq!(
        Backoff::default().base(attempt),
        Duration::from_millis(expected_ms)
    );
}

#[parameterized(
    low = { 0.0, 2000 },
    mid = { 0.5, 3000 },
    high = { 1.0, 4000 },
    clamped = { 7.0, 4000 },
)]
fn jitter_spans_half_to_full(unit: f64, expected_ms: u64) {
    assert_eq!(
        Backoff::default().delay(3, unit),
        Duration::from_millis(expected_ms)
    );
}

#[test]
fn random_jitter_stays_in_bounds() {
    let backoff = Backoff::default();
    for attempt in 0..backoff.max_attempts {
        let base = backoff.base(attempt);
        let delay = backoff.jittered(attempt);
        assert!(delay >= base / 2, "{delay:?} below half of {base:?}");
        assert!(delay <= base, "{delay:?} above {base:?}");
    }
}
