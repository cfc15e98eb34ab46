//! Per-player position history with interpolated lookup
//!
//! Samples are kept in send-time order. Lookups at a past instant find the
//! bracketing pair and blend them; lookups outside the stored range clamp to
//! the nearest sample and report an underrun.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::util::math::lerp_euler;

use super::snapshot::Snapshot;
use super::PlayerId;

/// Result of [`PositionHistory::get_at`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub snapshot: Snapshot,
    /// No bracketing pair existed; `snapshot` is the nearest stored sample
    pub underrun: bool,
}

#[derive(Debug)]
pub struct PositionHistory {
    player_id: PlayerId,
    entries: VecDeque<Snapshot>,
    /// Seconds of history kept behind the newest sample
    retention: f64,
    underrun_logged: AtomicBool,
    underruns: AtomicU64,
}

impl PositionHistory {
    pub fn new(player_id: PlayerId, retention: f64) -> Self {
        Self {
            player_id,
            entries: VecDeque::new(),
            retention,
            underrun_logged: AtomicBool::new(false),
            underruns: AtomicU64::new(0),
        }
    }

    /// History that never evicts
    pub fn unbounded(player_id: PlayerId) -> Self {
        Self::new(player_id, f64::INFINITY)
    }

    /// Retention long enough for any rewind: twice the smoothing window plus the worst RTT
    pub fn retention_for(smoothing_window: f64, max_rtt: f64) -> f64 {
        2.0 * smoothing_window.max(0.0) + max_rtt.max(0.0)
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.entries.front()
    }

    /// Total lookups that could not interpolate
    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.underrun_logged.store(false, Ordering::Relaxed);
    }

    /// Append a snapshot. Returns `false` (and stores nothing) when it is not
    /// newer than the latest stored sample or carries a non-finite component.
    pub fn append(&mut self, snapshot: Snapshot) -> bool {
        if !snapshot.is_finite() {
            return false;
        }
        if let Some(last) = self.entries.back() {
            if snapshot.send_time <= last.send_time {
                debug!(
                    player_id = self.player_id,
                    stale = snapshot.send_time,
                    latest = last.send_time,
                    "Dropped out-of-order snapshot"
                );
                return false;
            }
        }

        self.entries.push_back(snapshot);
        self.prune(snapshot.send_time);
        true
    }

    /// Keep one sample older than the window so its edge can still interpolate
    fn prune(&mut self, newest: f64) {
        let cutoff = newest - self.retention;
        while self.entries.len() > 2 && self.entries[1].send_time <= cutoff {
            self.entries.pop_front();
        }
    }

    /// State at `timestamp - backdate`.
    ///
    /// Returns `None` only when the history is empty.
    pub fn get_at(&self, timestamp: f64, backdate: f64) -> Option<Sample> {
        let target = timestamp - backdate;
        let first = self.entries.front()?;

        // First index whose time is >= target; the entry before it is the
        // last one strictly older than target.
        let idx = self.entries.partition_point(|s| s.send_time < target);

        if idx == 0 {
            let underrun = target < first.send_time;
            if underrun {
                self.record_underrun(target);
            } else {
                self.rearm();
            }
            return Some(Sample {
                snapshot: *first,
                underrun,
            });
        }

        let Some(next) = self.entries.get(idx) else {
            self.record_underrun(target);
            return self.entries.back().map(|last| Sample {
                snapshot: *last,
                underrun: true,
            });
        };
        let prev = &self.entries[idx - 1];

        let span = next.send_time - prev.send_time;
        let ratio = if span > 0.0 {
            ((target - prev.send_time) / span).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };

        self.rearm();
        Some(Sample {
            snapshot: Snapshot {
                send_time: target,
                position: prev.position.lerp(next.position, ratio),
                velocity: prev.velocity.lerp(next.velocity, ratio),
                orientation: lerp_euler(prev.orientation, next.orientation, ratio),
            },
            underrun: false,
        })
    }

    fn record_underrun(&self, target: f64) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
        if !self.underrun_logged.swap(true, Ordering::Relaxed) {
            warn!(
                player_id = self.player_id,
                target,
                oldest = self.entries.front().map(|s| s.send_time),
                newest = self.entries.back().map(|s| s.send_time),
                "Interpolation underrun, holding nearest sample"
            );
        }
    }

    fn rearm(&self) {
        self.underrun_logged.store(false, Ordering::Relaxed);
    }
}
