// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! The priority queues backing the Scheduler (§4.I): main, event, and
//! interrupt. Priority is an integer where lower is more urgent (§3);
//! dispatch order is lowest priority value first, FIFO among ties,
//! matching §5's ordering guarantee.

use aura_core::Tasklet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

struct Entry {
    seq: u64,
    tasklet: Tasklet,
}

/// A priority queue over [`Tasklet`]s. Implemented as a plain `Vec`
/// rescanned on dequeue rather than a binary heap, since `set_priority`
/// and cancel-while-queued need to mutate an arbitrary entry in place —
/// at the scale this queue runs at (tasks admitted by one scheduler
/// loop), an O(n) scan per mutation is not a bottleneck.
pub struct PriorityQueue {
    entries: Mutex<Vec<Entry>>,
    sequence: AtomicU64,
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()), sequence: AtomicU64::new(0) }
    }

    pub fn enqueue(&self, tasklet: Tasklet) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(Entry { seq, tasklet });
    }

    /// Pops the most urgent (lowest priority value), earliest-enqueued
    /// entry.
    pub fn dequeue(&self) -> Option<Tasklet> {
        let mut entries = self.entries.lock();
        let best = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.tasklet.priority, e.seq))
            .map(|(idx, _)| idx)?;
        Some(entries.remove(best).tasklet)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reorders `run_id` within the queue. No-op if it isn't present
    /// (already dequeued or never enqueued here).
    pub fn set_priority(&self, run_id: &str, new_priority: i32) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.tasklet.run_id.0 == run_id) {
            Some(e) => {
                e.tasklet.priority = new_priority;
                true
            }
            None => false,
        }
    }

    /// Removes and returns `run_id`'s tasklet, for cancellation of a
    /// still-queued (not yet dispatched) entry.
    pub fn remove(&self, run_id: &str) -> Option<Tasklet> {
        let mut entries = self.entries.lock();
        let idx = entries.iter().position(|e| e.tasklet.run_id.0 == run_id)?;
        Some(entries.remove(idx).tasklet)
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.entries.lock().iter().any(|e| e.tasklet.run_id.0 == run_id)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
