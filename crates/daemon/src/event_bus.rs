// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide sequenced event bus.
//!
//! Every emission gets the next bus-global sequence number and lands in a
//! bounded retention window. Observers either register a synchronous
//! handler ([`EventBus::subscribe_all`]) or take a [`BusReceiver`] that
//! starts from a known sequence number and refills itself from the window
//! when it falls behind.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sb_core::{BusEvent, Clock, SequencedEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events that fell out of the retention window, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub from: u64,
    pub to: u64,
}

/// Retained events after some sequence number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replay {
    pub events: Vec<SequencedEvent>,
    pub gap: Option<Gap>,
}

pub type Handler = Arc<dyn Fn(&SequencedEvent) + Send + Sync>;

struct BusState {
    next_seq: u64,
    retention: usize,
    retained: VecDeque<SequencedEvent>,
    live: broadcast::Sender<SequencedEvent>,
    handlers: BTreeMap<u64, Handler>,
    next_handler: u64,
}

impl BusState {
    fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    fn replay_since(&self, after: u64) -> Replay {
        let events: Vec<_> = self
            .retained
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect();
        let first_kept = events
            .first()
            .map(|e| e.seq)
            .unwrap_or_else(|| self.last_seq() + 1);
        let gap = (after + 1 < first_kept).then_some(Gap {
            from: after + 1,
            to: first_kept - 1,
        });
        Replay { events, gap }
    }
}

#[derive(Clone)]
pub struct EventBus<C: Clock> {
    state: Arc<Mutex<BusState>>,
    clock: C,
}

impl<C: Clock> EventBus<C> {
    pub fn new(retention: usize, clock: C) -> Self {
        let retention = retention.max(1);
        let (live, _) = broadcast::channel(retention.max(64));
        Self {
            state: Arc::new(Mutex::new(BusState {
                next_seq: 1,
                retention,
                retained: VecDeque::with_capacity(retention),
                live,
                handlers: BTreeMap::new(),
                next_handler: 0,
            })),
            clock,
        }
    }

    /// Publish an event, returning its sequence number.
    ///
    /// Handlers run before this returns, in sequence order. They must not
    /// emit on the same bus.
    pub fn emit(&self, event: BusEvent) -> u64 {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let sequenced = SequencedEvent {
            seq,
            timestamp_ms: self.clock.epoch_ms(),
            event,
        };
        tracing::debug!(seq, kind = sequenced.event.kind(), "bus event");

        for handler in state.handlers.values() {
            handler(&sequenced);
        }
        // No receivers is fine
        let _ = state.live.send(sequenced.clone());
        state.retained.push_back(sequenced);
        while state.retained.len() > state.retention {
            state.retained.pop_front();
        }
        seq
    }

    /// Highest sequence number issued so far (0 before the first event).
    pub fn last_seq(&self) -> u64 {
        self.state.lock().last_seq()
    }

    /// Retained events strictly newer than `after`, reporting any that were
    /// already evicted.
    pub fn replay_since(&self, after: u64) -> Replay {
        self.state.lock().replay_since(after)
    }

    /// Run `handler` for every future event until the subscription is
    /// dropped or unsubscribed.
    pub fn subscribe_all(
        &self,
        handler: impl Fn(&SequencedEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut state = self.state.lock();
        let id = state.next_handler;
        state.next_handler += 1;
        state.handlers.insert(id, Arc::new(handler));
        Subscription {
            state: Arc::downgrade(&self.state),
            id: Some(id),
        }
    }

    /// Snapshot of events after `after` plus a live receiver, taken in one
    /// critical section so nothing falls between them.
    pub fn subscribe_from(&self, after: u64) -> (Replay, BusReceiver<C>) {
        let state = self.state.lock();
        let replay = state.replay_since(after);
        let last = replay.events.last().map_or(after, |e| e.seq);
        let rx = state.live.subscribe();
        drop(state);
        (
            replay,
            BusReceiver {
                bus: self.clone(),
                rx,
                last,
                pending: VecDeque::new(),
            },
        )
    }

    /// Live receiver starting after the current last sequence number.
    pub fn subscribe_live(&self) -> (u64, BusReceiver<C>) {
        let state = self.state.lock();
        let last = state.last_seq();
        let rx = state.live.subscribe();
        drop(state);
        (
            last,
            BusReceiver {
                bus: self.clone(),
                rx,
                last,
                pending: VecDeque::new(),
            },
        )
    }
}

/// Handle returned by [`EventBus::subscribe_all`].
pub struct Subscription {
    state: Weak<Mutex<BusState>>,
    id: Option<u64>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(id), Some(state)) = (self.id.take(), self.state.upgrade()) {
            state.lock().handlers.remove(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Item yielded by a [`BusReceiver`].
#[derive(Debug, Clone, PartialEq)]
pub enum BusDelivery {
    Event(SequencedEvent),
    Gap(Gap),
}

/// Ordered, duplicate-free stream of bus events after a starting point.
pub struct BusReceiver<C: Clock> {
    bus: EventBus<C>,
    rx: broadcast::Receiver<SequencedEvent>,
    last: u64,
    pending: VecDeque<BusDelivery>,
}

impl<C: Clock> BusReceiver<C> {
    /// Sequence number of the last event yielded.
    pub fn last_seq(&self) -> u64 {
        self.last
    }

    /// Skip everything up to and including `seq`.
    pub fn advance_to(&mut self, seq: u64) {
        self.last = self.last.max(seq);
        let last = self.last;
        self.pending
            .retain(|d| !matches!(d, BusDelivery::Event(e) if e.seq <= last));
    }

    /// Next delivery, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusDelivery> {
        loop {
            if let Some(delivery) = self.pending.pop_front() {
                match &delivery {
                    BusDelivery::Event(e) if e.seq <= self.last => continue,
                    BusDelivery::Event(e) => self.last = e.seq,
                    BusDelivery::Gap(gap) => self.last = self.last.max(gap.to),
                }
                return Some(delivery);
            }
            match self.rx.recv().await {
                Ok(event) if event.seq <= self.last => continue,
                Ok(event) => {
                    self.last = event.seq;
                    return Some(BusDelivery::Event(event));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, last = self.last, "bus receiver lagged, refilling");
                    let replay = self.bus.replay_since(self.last);
                    if let Some(gap) = replay.gap {
                        self.pending.push_back(BusDelivery::Gap(gap));
                    }
                    self.pending
                        .extend(replay.events.into_iter().map(BusDelivery::Event));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
