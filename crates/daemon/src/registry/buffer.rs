// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-session output history

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One flushed output chunk, in both renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedChunk {
    /// Per-session chunk sequence number
    pub seq: u64,
    pub raw: String,
    pub text: String,
}

impl BufferedChunk {
    fn weight(&self) -> usize {
        self.raw.len() + self.text.len()
    }
}

/// Ring buffer bounded by chunk count and total bytes. The newest chunk is
/// always kept, even when it alone exceeds the byte bound.
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    chunks: VecDeque<BufferedChunk>,
    bytes: usize,
    max_chunks: usize,
    max_bytes: usize,
    next_seq: u64,
}

impl OutputBuffer {
    pub(crate) fn new(max_chunks: usize, max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            bytes: 0,
            max_chunks: max_chunks.max(1),
            max_bytes,
            next_seq: 1,
        }
    }

    /// Store a chunk and return its sequence number.
    pub(crate) fn push(&mut self, raw: String, text: String) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let chunk = BufferedChunk { seq, raw, text };
        self.bytes += chunk.weight();
        self.chunks.push_back(chunk);
        while self.chunks.len() > 1
            && (self.chunks.len() > self.max_chunks || self.bytes > self.max_bytes)
        {
            if let Some(old) = self.chunks.pop_front() {
                self.bytes -= old.weight();
            }
        }
        seq
    }

    /// Sequence number of the newest chunk ever pushed (0 if none).
    pub(crate) fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub(crate) fn snapshot(&self) -> Vec<BufferedChunk> {
        self.chunks.iter().cloned().collect()
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
