//! Movement synchronization for owned and observed players

use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use super::history::{PositionHistory, Sample};
use super::snapshot::Snapshot;
use super::PlayerId;

/// Physical state read from or applied to a simulated body
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Euler angles in degrees
    pub orientation: Vec3,
}

impl From<&Snapshot> for BodyState {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            position: snapshot.position,
            velocity: snapshot.velocity,
            orientation: snapshot.orientation,
        }
    }
}

/// A body driven by an external physics provider
pub trait KinematicBody {
    fn state(&self) -> BodyState;
    fn apply(&mut self, state: &BodyState);
}

impl KinematicBody for BodyState {
    fn state(&self) -> BodyState {
        *self
    }

    fn apply(&mut self, state: &BodyState) {
        *self = *state;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    /// Simulates locally and publishes
    Owner,
    /// Mirrors published snapshots with a smoothing delay
    Observer,
}

/// Feeds one player's [`PositionHistory`]; the role is fixed at spawn
#[derive(Debug)]
pub struct MovementSync {
    role: SyncRole,
    player_id: PlayerId,
    history: Arc<RwLock<PositionHistory>>,
    smoothing_window: f64,
}

impl MovementSync {
    pub fn owner(player_id: PlayerId, history: Arc<RwLock<PositionHistory>>) -> Self {
        Self {
            role: SyncRole::Owner,
            player_id,
            history,
            smoothing_window: 0.0,
        }
    }

    pub fn observer(
        player_id: PlayerId,
        history: Arc<RwLock<PositionHistory>>,
        smoothing_window: f64,
    ) -> Self {
        Self {
            role: SyncRole::Observer,
            player_id,
            history,
            smoothing_window,
        }
    }

    pub fn role(&self) -> SyncRole {
        self.role
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn history(&self) -> &Arc<RwLock<PositionHistory>> {
        &self.history
    }

    /// Owner tick: sample the body, record it, and hand back the snapshot to publish.
    ///
    /// Returns `None` for observers or when `now` does not advance the history.
    pub fn capture<B: KinematicBody + ?Sized>(&mut self, now: f64, body: &B) -> Option<Snapshot> {
        if self.role != SyncRole::Owner {
            return None;
        }
        let state = body.state();
        let snapshot = Snapshot::new(now, state.position, state.velocity, state.orientation);
        self.history.write().append(snapshot).then_some(snapshot)
    }

    /// Observer input: a snapshot published by the owner. Older-than-latest is dropped.
    pub fn receive(&mut self, snapshot: Snapshot) -> bool {
        self.history.write().append(snapshot)
    }

    /// Observer tick: place the body at the smoothed past state.
    ///
    /// With a gap in received data the body holds the last sample until more arrives.
    pub fn follow<B: KinematicBody + ?Sized>(&mut self, now: f64, body: &mut B) -> Option<Sample> {
        if self.role != SyncRole::Observer {
            return None;
        }
        let sample = self.history.read().get_at(now, self.smoothing_window)?;
        body.apply(&BodyState::from(&sample.snapshot));
        Some(sample)
    }
}
