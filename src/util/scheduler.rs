//! Cooperative deferred actions keyed on simulation time
//!
//! Nothing in the core blocks: countdown expiry, the post-win reveal, the
//! podium hold and remote shot replays are all scheduled here and drained
//! at the head of the tick whose time has reached them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Deferred<T> {
    due: f64,
    seq: u64,
    action: T,
}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for Deferred<T> {}

impl<T> PartialOrd for Deferred<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Deferred<T> {
    // Reversed so the max-heap pops the earliest due time first,
    // falling back to insertion order for equal times.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue of deferred actions
pub struct Scheduler<T> {
    queue: BinaryHeap<Deferred<T>>,
    next_seq: u64,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `action` to run once simulation time reaches `due`
    pub fn schedule_at(&mut self, due: f64, action: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Deferred {
            due,
            seq,
            action,
        });
    }

    /// Schedule `action` after `delay` seconds, clamped to `[0, inf)`
    pub fn schedule_after(&mut self, now: f64, delay: f64, action: T) {
        self.schedule_at(now + delay.max(0.0), action);
    }

    /// Drop everything scheduled so far (session reset)
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Remove and return every action due at `now`, earliest first
    pub fn drain_due(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(next) = self.queue.peek() {
            if next.due > now {
                break;
            }
            if let Some(entry) = self.queue.pop() {
                due.push(entry.action);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
