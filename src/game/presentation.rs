//! One-shot notices for rendering, audio and UI collaborators
//!
//! The core never waits on these; every method returns immediately.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::leaderboard::LeaderboardEntry;
use super::shoot::ShootVerdict;
use super::state_machine::GameState;
use super::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Shot { by: PlayerId },
    Zone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitIndicator {
    /// Our shot was confirmed on this victim
    YouHit(PlayerId),
    /// We were hit by this shooter
    YouWereHit { by: PlayerId },
    /// Local prediction said one thing, the server another
    Corrected {
        predicted: Option<PlayerId>,
        resolved: Option<PlayerId>,
    },
}

/// World transforms of the two zone walls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneMarkers {
    pub chasing: (Vec3, Quat),
    pub leading: (Vec3, Quat),
}

pub trait Presentation: Send {
    fn state_entered(&mut self, _state: GameState) {}
    fn state_exited(&mut self, _state: GameState) {}
    /// `local` is true for the shooter's own predicted shot
    fn shot_fired(&mut self, _verdict: &ShootVerdict, _local: bool) {}
    fn hit_indicator(&mut self, _indicator: HitIndicator) {}
    fn player_died(&mut self, _player: PlayerId, _cause: DeathCause) {}
    fn leaderboard_ready(&mut self, _entries: &[LeaderboardEntry]) {}
    fn zone_moved(&mut self, _markers: &ZoneMarkers) {}
}

/// Presentation that only logs
#[derive(Debug, Clone, Copy)]
pub struct TracingPresentation {
    pub role: &'static str,
}

impl TracingPresentation {
    pub fn new(role: &'static str) -> Self {
        Self { role }
    }
}

impl Presentation for TracingPresentation {
    fn state_entered(&mut self, state: GameState) {
        info!(role = self.role, state = ?state, "Entered state");
    }

    fn state_exited(&mut self, state: GameState) {
        debug!(role = self.role, state = ?state, "Exited state");
    }

    fn shot_fired(&mut self, verdict: &ShootVerdict, local: bool) {
        debug!(
            role = self.role,
            shooter = verdict.shooter,
            victim = ?verdict.victim,
            local,
            "Shot fired"
        );
    }

    fn hit_indicator(&mut self, indicator: HitIndicator) {
        debug!(role = self.role, indicator = ?indicator, "Hit indicator");
    }

    fn player_died(&mut self, player: PlayerId, cause: DeathCause) {
        info!(role = self.role, player_id = player, cause = ?cause, "Player died");
    }

    fn leaderboard_ready(&mut self, entries: &[LeaderboardEntry]) {
        info!(role = self.role, entries = entries.len(), "Leaderboard ready");
    }
}

/// Everything a [`RecordingPresentation`] was told, in order
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    Entered(GameState),
    Exited(GameState),
    Shot { verdict: ShootVerdict, local: bool },
    Indicator(HitIndicator),
    Died(PlayerId, DeathCause),
    Leaderboard(Vec<LeaderboardEntry>),
    Zone(ZoneMarkers),
}

/// Presentation that keeps every notice, for embedding in tools and tests
#[derive(Debug, Default)]
pub struct RecordingPresentation {
    pub events: Vec<PresentationEvent>,
}

impl RecordingPresentation {
    pub fn take(&mut self) -> Vec<PresentationEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Presentation for RecordingPresentation {
    fn state_entered(&mut self, state: GameState) {
        self.events.push(PresentationEvent::Entered(state));
    }

    fn state_exited(&mut self, state: GameState) {
        self.events.push(PresentationEvent::Exited(state));
    }

    fn shot_fired(&mut self, verdict: &ShootVerdict, local: bool) {
        self.events.push(PresentationEvent::Shot {
            verdict: *verdict,
            local,
        });
    }

    fn hit_indicator(&mut self, indicator: HitIndicator) {
        self.events.push(PresentationEvent::Indicator(indicator));
    }

    fn player_died(&mut self, player: PlayerId, cause: DeathCause) {
        self.events.push(PresentationEvent::Died(player, cause));
    }

    fn leaderboard_ready(&mut self, entries: &[LeaderboardEntry]) {
        self.events.push(PresentationEvent::Leaderboard(entries.to_vec()));
    }

    fn zone_moved(&mut self, markers: &ZoneMarkers) {
        self.events.push(PresentationEvent::Zone(*markers));
    }
}
