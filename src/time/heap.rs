//! Timer heap for deadline management.
//!
//! A min-heap of timer ids ordered by deadline. Cancellation does not touch
//! the heap: the owner drops the id's action and skips stale entries when
//! they surface, compacting with [`TimerHeap::retain`] when too many
//! accumulate.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Identifies one scheduled timer.
pub type TimerId = u64;

#[derive(Debug, Clone, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    id: TimerId,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first, then FIFO)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of timers ordered by deadline.
#[derive(Debug, Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
}

impl TimerHeap {
    /// Creates a new empty timer heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Adds a timer with the given deadline.
    pub fn insert(&mut self, id: TimerId, deadline: Instant) {
        self.heap.push(TimerEntry { deadline, id });
    }

    /// Returns the earliest deadline, if any.
    #[must_use]
    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops all timers whose deadline is at or before `now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut expired = Vec::new();
        while self.heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.id);
            }
        }
        expired
    }

    /// Keeps only the timers for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(TimerId) -> bool) {
        self.heap.retain(|e| keep(e.id));
    }
}
