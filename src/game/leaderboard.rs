//! Per-player stats, win detection and final standings

use std::cmp::Ordering;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::PlayerId;

/// Running stats for one player during a round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub distance_travelled: f32,
    pub fastest_speed: f32,
    pub laps_completed: u32,
    /// Seconds of play recorded
    pub elapsed: f32,
    /// Server time the current distance was reached
    pub distance_reached_at: f64,
    last_position: Option<Vec3>,
}

impl StatsSummary {
    /// Fold in one tick of movement
    pub fn record(&mut self, now: f64, position: Vec3, speed: f32, dt: f32) {
        if let Some(last) = self.last_position {
            let step = last.distance(position);
            if step > f32::EPSILON {
                self.distance_travelled += step;
                self.distance_reached_at = now;
            }
        } else {
            self.distance_reached_at = now;
        }
        self.last_position = Some(position);
        self.fastest_speed = self.fastest_speed.max(speed);
        self.elapsed += dt.max(0.0);
    }

    pub fn average_speed(&self) -> f32 {
        if self.elapsed > 0.0 {
            self.distance_travelled / self.elapsed
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub distance_travelled: f32,
    pub average_speed: f32,
    pub fastest_speed: f32,
    pub laps_completed: u32,
    pub won: bool,
    /// Tie-break: who reached their distance first
    pub distance_reached_at: f64,
}

impl LeaderboardEntry {
    pub fn from_stats(player_id: PlayerId, name: &str, stats: &StatsSummary, won: bool) -> Self {
        Self {
            player_id,
            name: name.to_string(),
            distance_travelled: stats.distance_travelled,
            average_speed: stats.average_speed(),
            fastest_speed: stats.fastest_speed,
            laps_completed: stats.laps_completed,
            won,
            distance_reached_at: stats.distance_reached_at,
        }
    }
}

/// Winners first, then farther distance, then whoever got there earlier,
/// then lower id.
pub fn rank_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.won
        .cmp(&a.won)
        .then_with(|| b.distance_travelled.total_cmp(&a.distance_travelled))
        .then_with(|| a.distance_reached_at.total_cmp(&b.distance_reached_at))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

pub fn sort_leaderboard(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(rank_order);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinVerdict {
    Continue,
    Win,
    /// Nobody alive and nobody dead; declared a win so the session cannot stall
    Fallback,
}

impl WinVerdict {
    pub fn is_over(&self) -> bool {
        !matches!(self, WinVerdict::Continue)
    }
}

/// Decides once per round whether the round is over
#[derive(Debug, Default)]
pub struct WinDetector {
    declared: bool,
}

impl WinDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure win rule over alive/dead counts
    pub fn verdict(alive: usize, dead: usize) -> WinVerdict {
        if alive == 0 && dead == 0 {
            WinVerdict::Fallback
        } else if alive <= 1 && dead > 0 {
            WinVerdict::Win
        } else {
            WinVerdict::Continue
        }
    }

    /// Returns the verdict the first time the round is over, `None` otherwise
    pub fn check(&mut self, alive: usize, dead: usize) -> Option<WinVerdict> {
        if self.declared {
            return None;
        }
        let verdict = Self::verdict(alive, dead);
        if verdict == WinVerdict::Fallback {
            warn!(alive, dead, "Win check found no players, declaring win");
        }
        if verdict.is_over() {
            self.declared = true;
            Some(verdict)
        } else {
            None
        }
    }

    pub fn declared(&self) -> bool {
        self.declared
    }

    pub fn reset(&mut self) {
        self.declared = false;
    }
}
