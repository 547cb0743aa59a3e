//! Deadline-based coalescing of repeated triggers.
//!
//! A [`Debouncer<K>`] remembers, per key, the moment a burst of triggers
//! should be acted upon. Every [`touch`](Debouncer::touch) pushes the key's
//! deadline to `now + delay`, so a key only becomes due once it has been
//! quiet for the whole delay. The clock is passed in explicitly, which keeps
//! the queue deterministic under test.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::logging::targets;

/// An entry in the deadline queue (min-heap by deadline).
#[derive(Debug, Clone, Copy)]
struct QueueEntry<K> {
    key: K,
    deadline: Instant,
    generation: u64,
}

impl<K> PartialEq for QueueEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl<K> Eq for QueueEntry<K> {}

impl<K> PartialOrd for QueueEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for QueueEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

/// Coalesces triggers per key until they have been quiet for `delay`.
#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    /// Latest generation per pending key; older queue entries are stale.
    pending: HashMap<K, u64>,
    queue: BinaryHeap<QueueEntry<K>>,
    generation: u64,
}

impl<K: Copy + Eq + Hash + std::fmt::Debug> Debouncer<K> {
    /// Create a debouncer with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
            queue: BinaryHeap::new(),
            generation: 0,
        }
    }

    /// The configured quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Change the quiet period. Already scheduled deadlines are kept.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Register a trigger for `key` at `now`, resetting its deadline.
    pub fn touch(&mut self, key: K, now: Instant) {
        self.generation += 1;
        let deadline = now + self.delay;
        self.pending.insert(key, self.generation);
        self.queue.push(QueueEntry {
            key,
            deadline,
            generation: self.generation,
        });
        tracing::trace!(target: targets::DEBOUNCE, ?key, "debounce deadline reset");
    }

    /// Drop any pending trigger for `key`.
    pub fn cancel(&mut self, key: K) -> bool {
        self.pending.remove(&key).is_some()
    }

    /// Whether `key` has a pending trigger.
    pub fn is_pending(&self, key: K) -> bool {
        self.pending.contains_key(&key)
    }

    /// Number of keys waiting to become due.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn discard_stale(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.pending.get(&entry.key) == Some(&entry.generation) {
                break;
            }
            self.queue.pop();
        }
    }

    /// The earliest deadline of any pending key.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.queue.peek().map(|entry| entry.deadline)
    }

    /// Duration from `now` until the next key becomes due.
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and return every key whose deadline is at or before `now`,
    /// in deadline order.
    #[tracing::instrument(skip(self), target = "lineup_core::debounce", level = "trace")]
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();
        loop {
            self.discard_stale();
            let Some(entry) = self.queue.peek().copied() else {
                break;
            };
            if entry.deadline > now {
                break;
            }
            self.queue.pop();
            self.pending.remove(&entry.key);
            due.push(entry.key);
        }
        due
    }

    /// Remove and return every pending key regardless of its deadline.
    pub fn take_all(&mut self) -> Vec<K> {
        let mut all = Vec::with_capacity(self.pending.len());
        while let Some(entry) = self.queue.pop() {
            if self.pending.get(&entry.key) == Some(&entry.generation) {
                self.pending.remove(&entry.key);
                all.push(entry.key);
            }
        }
        self.pending.clear();
        all
    }
}

/// Sleep until `deadline` on the tokio timer.
#[cfg(feature = "tokio")]
pub async fn sleep_until(deadline: Instant) {
    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
}
