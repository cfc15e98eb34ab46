//! Three-phase hit-scan protocol: request, verdict, confirmation

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::combat::{CompensatedShot, LagCompensator, ShotValidation};
use super::history::PositionHistory;
use super::physics::{HitTestWorld, Ray, LAYER_ALL};
use super::PlayerId;

/// Shooter to server, sent after the local shot has already been shown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShootRequest {
    /// Per-shooter sequence number
    pub shot_id: u32,
    /// Shooter's estimate of server time when it fired
    pub claimed_time: f64,
    pub origin: Vec3,
    pub direction: Vec3,
    pub claimed_victim: Option<PlayerId>,
}

/// Server to every peer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShootVerdict {
    pub shot_id: u32,
    pub shooter: PlayerId,
    /// Server-clock instant at which observers present the shot
    pub time: f64,
    pub origin: Vec3,
    pub direction: Vec3,
    pub victim: Option<PlayerId>,
    pub hit_point: Option<Vec3>,
}

impl ShootVerdict {
    pub fn key(&self) -> (PlayerId, u32) {
        (self.shooter, self.shot_id)
    }
}

/// Server side: turn a request into a verdict via lag compensation
pub fn resolve_shot<W: HitTestWorld + ?Sized>(
    compensator: &LagCompensator,
    world: &mut W,
    shooter: PlayerId,
    request: &ShootRequest,
    range: f32,
    victim_history: Option<&PositionHistory>,
    rtt: Option<f64>,
    smoothing_window: f64,
) -> (ShootVerdict, CompensatedShot) {
    let ray = Ray::new(request.origin, request.direction, range, LAYER_ALL).ignoring(shooter);
    let shot = compensator.validate(
        world,
        &ray,
        request.claimed_time,
        request.claimed_victim,
        victim_history,
        rtt,
    );

    let verdict = ShootVerdict {
        shot_id: request.shot_id,
        shooter,
        // observers render remote players one smoothing window in the past
        time: request.claimed_time + smoothing_window,
        origin: request.origin,
        direction: ray.direction,
        victim: shot.validation.resolved(),
        hit_point: shot.hit.map(|h| h.point),
    };

    debug!(
        shooter,
        shot_id = request.shot_id,
        validation = ?shot.validation,
        "Shot resolved"
    );
    (verdict, shot)
}

/// What a client should do with an incoming verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerdictAction {
    /// Already seen; ignore
    Duplicate,
    /// Older than the tracker remembers; ignore
    Stale,
    /// Our own shot: compare against the prediction, no visual replay
    Confirm {
        predicted: Option<PlayerId>,
        validation: ShotValidation,
    },
    /// Someone else's shot: replay its visual after `delay` seconds
    Replay { delay: f64 },
}

/// Seconds a prediction or a seen verdict is remembered
pub const SHOT_MEMORY_SECS: f64 = 5.0;

/// Client side bookkeeping for shots in flight.
///
/// Predictions whose verdict never arrives and verdict keys older than
/// [`SHOT_MEMORY_SECS`] are forgotten, and verdicts that old are ignored.
#[derive(Debug, Default)]
pub struct ShotTracker {
    next_shot_id: u32,
    /// shot id -> (claimed time, predicted victim)
    predictions: HashMap<u32, (f64, Option<PlayerId>)>,
    /// (shooter, shot id) -> verdict time
    seen: HashMap<(PlayerId, u32), f64>,
}

impl ShotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a locally predicted shot and build the request for it
    pub fn fire(
        &mut self,
        claimed_time: f64,
        origin: Vec3,
        direction: Vec3,
        predicted_victim: Option<PlayerId>,
    ) -> ShootRequest {
        self.forget_before(claimed_time - SHOT_MEMORY_SECS);
        let shot_id = self.next_shot_id;
        self.next_shot_id = self.next_shot_id.wrapping_add(1);
        self.predictions.insert(shot_id, (claimed_time, predicted_victim));
        ShootRequest {
            shot_id,
            claimed_time,
            origin,
            direction,
            claimed_victim: predicted_victim,
        }
    }

    /// Classify an incoming verdict. Each `(shooter, shot_id)` is handled once.
    pub fn on_verdict(&mut self, me: PlayerId, verdict: &ShootVerdict, server_now: f64) -> VerdictAction {
        let horizon = server_now - SHOT_MEMORY_SECS;
        self.forget_before(horizon);
        if verdict.time < horizon {
            debug!(
                shooter = verdict.shooter,
                shot_id = verdict.shot_id,
                time = verdict.time,
                "Ignoring verdict older than shot memory"
            );
            return VerdictAction::Stale;
        }
        if self.seen.insert(verdict.key(), verdict.time).is_some() {
            return VerdictAction::Duplicate;
        }

        if verdict.shooter == me {
            let predicted = self
                .predictions
                .remove(&verdict.shot_id)
                .and_then(|(_, victim)| victim);
            let validation = ShotValidation::classify(predicted, verdict.victim);
            if validation.is_discrepancy() {
                // the local visual already played; the server outcome stands
                info!(
                    shot_id = verdict.shot_id,
                    predicted = ?predicted,
                    resolved = ?verdict.victim,
                    "Server overrode predicted shot outcome"
                );
            }
            return VerdictAction::Confirm {
                predicted,
                validation,
            };
        }

        VerdictAction::Replay {
            delay: (verdict.time - server_now).max(0.0),
        }
    }

    pub fn pending(&self) -> usize {
        self.predictions.len()
    }

    fn forget_before(&mut self, horizon: f64) {
        let before = self.predictions.len();
        self.predictions.retain(|_, (claimed, _)| *claimed >= horizon);
        let lost = before - self.predictions.len();
        if lost > 0 {
            debug!(lost, "Forgot shots whose verdict never arrived");
        }
        self.seen.retain(|_, time| *time >= horizon);
    }

    /// Forget everything (session reset)
    pub fn clear(&mut self) {
        self.predictions.clear();
        self.seen.clear();
    }
}
