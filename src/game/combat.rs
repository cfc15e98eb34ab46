//! Hit-scan combat: lag-compensated validation and damage

use std::ops::Deref;

use glam::Vec3;
use tracing::{debug, warn};

use super::history::PositionHistory;
use super::physics::{HitTestWorld, Ray, RayHit};
use super::PlayerId;

/// Weapon tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponConfig {
    /// Damage per confirmed hit
    pub damage: f32,
    /// Ray length
    pub range: f32,
    /// Health every player starts a round with
    pub max_health: f32,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            damage: 34.0,
            range: 200.0,
            max_health: 100.0,
        }
    }
}

/// Apply damage to health, returns (new_health, is_dead)
pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
    let new_health = (current_health - damage.max(0.0)).max(0.0);
    (new_health, new_health <= 0.0)
}

/// How the authoritative re-test compares to the client's claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotValidation {
    /// Server agrees the claimed victim was hit
    Hit(PlayerId),
    /// Server agrees nothing was hit
    Miss,
    /// Server disagrees; `resolved` wins
    Discrepancy {
        claimed: Option<PlayerId>,
        resolved: Option<PlayerId>,
    },
}

impl ShotValidation {
    pub fn classify(claimed: Option<PlayerId>, resolved: Option<PlayerId>) -> Self {
        match (claimed, resolved) {
            (Some(c), Some(r)) if c == r => ShotValidation::Hit(r),
            (None, None) => ShotValidation::Miss,
            (claimed, resolved) => ShotValidation::Discrepancy { claimed, resolved },
        }
    }

    /// The authoritative victim
    pub fn resolved(&self) -> Option<PlayerId> {
        match *self {
            ShotValidation::Hit(id) => Some(id),
            ShotValidation::Miss => None,
            ShotValidation::Discrepancy { resolved, .. } => resolved,
        }
    }

    pub fn is_discrepancy(&self) -> bool {
        matches!(self, ShotValidation::Discrepancy { .. })
    }
}

/// Temporarily relocated hitbox, restored on drop.
///
/// Holding the world mutably for the guard's lifetime means at most one
/// rollback can be active at a time.
pub struct RewindGuard<'w, W: HitTestWorld + ?Sized> {
    world: &'w mut W,
    player: PlayerId,
    original: Vec3,
}

impl<'w, W: HitTestWorld + ?Sized> RewindGuard<'w, W> {
    /// Returns `None` if the player has no hitbox in this world
    pub fn new(world: &'w mut W, player: PlayerId, rewound: Vec3) -> Option<Self> {
        let original = world.hitbox(player)?;
        world.set_hitbox(player, rewound);
        Some(Self {
            world,
            player,
            original,
        })
    }
}

impl<W: HitTestWorld + ?Sized> Deref for RewindGuard<'_, W> {
    type Target = W;

    fn deref(&self) -> &W {
        self.world
    }
}

impl<W: HitTestWorld + ?Sized> Drop for RewindGuard<'_, W> {
    fn drop(&mut self) {
        self.world.set_hitbox(self.player, self.original);
    }
}

/// Outcome of one lag-compensated re-test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompensatedShot {
    pub validation: ShotValidation,
    /// Time the victim was rewound to
    pub rewind_time: f64,
    /// Where the victim's hitbox was placed for the test, if a rewind happened
    pub rewound_to: Option<Vec3>,
    pub hit: Option<RayHit>,
}

/// Server-side rewind, re-test and restore
#[derive(Debug, Clone, Copy)]
pub struct LagCompensator {
    smoothing_window: f64,
}

impl LagCompensator {
    pub fn new(smoothing_window: f64) -> Self {
        Self { smoothing_window }
    }

    /// Claimed time minus the one-way delay; unknown RTT means no adjustment
    pub fn rewind_time(claimed_time: f64, rtt: Option<f64>) -> f64 {
        match rtt {
            Some(rtt) if rtt.is_finite() && rtt > 0.0 => claimed_time - rtt / 2.0,
            _ => claimed_time,
        }
    }

    /// Re-run a client's shot against where the claimed victim was when it fired.
    ///
    /// `victim_history` is `None` when the claimed victim is no longer
    /// connected, which counts as a miss.
    pub fn validate<W: HitTestWorld + ?Sized>(
        &self,
        world: &mut W,
        ray: &Ray,
        claimed_time: f64,
        claimed_victim: Option<PlayerId>,
        victim_history: Option<&PositionHistory>,
        rtt: Option<f64>,
    ) -> CompensatedShot {
        let rewind_time = Self::rewind_time(claimed_time, rtt);

        let Some(victim) = claimed_victim else {
            let hit = world.raycast(ray);
            return CompensatedShot {
                validation: ShotValidation::classify(None, hit.and_then(|h| h.player())),
                rewind_time,
                rewound_to: None,
                hit,
            };
        };

        let Some(history) = victim_history else {
            debug!(victim, "Claimed victim is gone, treating shot as a miss");
            return CompensatedShot {
                validation: ShotValidation::Miss,
                rewind_time,
                rewound_to: None,
                hit: None,
            };
        };

        let rewound_to = history
            .get_at(rewind_time, self.smoothing_window)
            .map(|sample| sample.snapshot.position)
            .filter(|_| world.hitbox(victim).is_some());

        let hit = match rewound_to {
            Some(position) => RewindGuard::new(&mut *world, victim, position)
                .and_then(|guard| guard.raycast(ray)),
            None => world.raycast(ray),
        };

        let validation = ShotValidation::classify(Some(victim), hit.and_then(|h| h.player()));
        if validation.is_discrepancy() {
            warn!(
                claimed = ?claimed_victim,
                resolved = ?validation.resolved(),
                rewind_time,
                "Shot claim disagrees with server re-test"
            );
        }

        CompensatedShot {
            validation,
            rewind_time,
            rewound_to,
            hit,
        }
    }

    /// Client-side prediction: test against the locally rendered world
    pub fn predict<W: HitTestWorld + ?Sized>(world: &W, ray: &Ray) -> Option<RayHit> {
        world.raycast(ray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{SphereWorld, LAYER_ALL};
    use crate::game::snapshot::Snapshot;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn damage_floors_at_zero() {
        assert_eq!(apply_damage(100.0, 34.0), (66.0, false));
        assert_eq!(apply_damage(20.0, 34.0), (0.0, true));
        // negative damage never heals
        assert_eq!(apply_damage(50.0, -10.0), (50.0, false));
    }

    #[test]
    fn classification() {
        assert_eq!(ShotValidation::classify(Some(1), Some(1)), ShotValidation::Hit(1));
        assert_eq!(ShotValidation::classify(None, None), ShotValidation::Miss);
        let d = ShotValidation::classify(Some(1), Some(2));
        assert!(d.is_discrepancy());
        assert_eq!(d.resolved(), Some(2));
        assert_eq!(ShotValidation::classify(Some(1), None).resolved(), None);
    }

    #[test]
    fn rewind_time_uses_half_rtt() {
        assert_approx_eq!(LagCompensator::rewind_time(10.0, Some(0.2)), 9.9, 1e-9);
        assert_eq!(LagCompensator::rewind_time(10.0, None), 10.0);
        assert_eq!(LagCompensator::rewind_time(10.0, Some(f64::NAN)), 10.0);
    }

    #[test]
    fn guard_restores_hitbox() {
        let mut world = SphereWorld::new(0.5);
        world.upsert_hitbox(1, Vec3::new(5.0, 0.0, 0.0));
        {
            let guard = RewindGuard::new(&mut world, 1, Vec3::ZERO).unwrap();
            assert_eq!(guard.hitbox(1), Some(Vec3::ZERO));
        }
        assert_eq!(world.hitbox(1), Some(Vec3::new(5.0, 0.0, 0.0)));
        assert!(RewindGuard::new(&mut world, 9, Vec3::ZERO).is_none());
    }

    #[test]
    fn stationary_victim_with_zero_rtt_matches_current_test() {
        let mut world = SphereWorld::new(0.5);
        let position = Vec3::new(0.0, 0.0, 10.0);
        world.upsert_hitbox(2, position);

        let mut history = PositionHistory::unbounded(2);
        history.append(Snapshot::at_rest(9.0, position));
        history.append(Snapshot::at_rest(10.0, position));

        let compensator = LagCompensator::new(0.1);
        for direction in [Vec3::Z, Vec3::X, Vec3::new(0.03, 0.0, 1.0)] {
            let ray = Ray::new(Vec3::ZERO, direction, 100.0, LAYER_ALL);
            let current = world.raycast(&ray).and_then(|h| h.player());
            let compensated =
                compensator.validate(&mut world, &ray, 10.0, current, Some(&history), Some(0.0));
            assert_eq!(compensated.validation.resolved(), current);
            assert!(!compensated.validation.is_discrepancy());
        }
    }

    #[test]
    fn rewind_backdates_by_the_smoothing_window() {
        let mut world = SphereWorld::new(0.5);
        world.upsert_hitbox(2, Vec3::new(5.0, 0.0, 0.0));

        let mut history = PositionHistory::unbounded(2);
        history.append(Snapshot::at_rest(9.5, Vec3::ZERO));
        history.append(Snapshot::at_rest(10.0, Vec3::new(5.0, 0.0, 0.0)));

        // 10.0 - 0.2 / 2 - 0.1 = 9.8, three fifths of the way to x = 5
        let compensator = LagCompensator::new(0.1);
        let ray = Ray::new(Vec3::new(3.0, 0.0, -10.0), Vec3::Z, 100.0, LAYER_ALL);
        let shot = compensator.validate(&mut world, &ray, 10.0, Some(2), Some(&history), Some(0.2));
        assert_approx_eq!(shot.rewind_time, 9.9, 1e-9);
        let rewound = shot.rewound_to.unwrap();
        assert_approx_eq!(rewound.x, 3.0, 1e-4);
        assert_eq!(shot.validation, ShotValidation::Hit(2));
        assert_approx_eq!(shot.hit.unwrap().distance, 9.5, 1e-4);
        assert_eq!(history.underrun_count(), 0);

        // where the victim was at the rewind time itself is no longer a hit
        let unsmoothed = Ray::new(Vec3::new(4.0, 0.0, -10.0), Vec3::Z, 100.0, LAYER_ALL);
        let shot =
            compensator.validate(&mut world, &unsmoothed, 10.0, Some(2), Some(&history), Some(0.2));
        assert!(shot.validation.is_discrepancy());
        assert_eq!(shot.validation.resolved(), None);

        assert_eq!(world.hitbox(2), Some(Vec3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn rewind_before_history_clamps_to_oldest_sample() {
        let mut world = SphereWorld::new(0.5);
        world.upsert_hitbox(2, Vec3::new(5.0, 0.0, 0.0));

        let mut history = PositionHistory::unbounded(2);
        history.append(Snapshot::at_rest(9.85, Vec3::new(2.0, 0.0, 0.0)));
        history.append(Snapshot::at_rest(10.0, Vec3::new(5.0, 0.0, 0.0)));

        let ray = Ray::new(Vec3::new(2.0, 0.0, -10.0), Vec3::Z, 100.0, LAYER_ALL);
        let shot = LagCompensator::new(0.1).validate(
            &mut world,
            &ray,
            10.0,
            Some(2),
            Some(&history),
            Some(0.2),
        );
        assert_eq!(shot.rewound_to, Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(shot.validation, ShotValidation::Hit(2));
        assert_eq!(history.underrun_count(), 1);
        assert_eq!(world.hitbox(2), Some(Vec3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn missing_victim_is_a_miss() {
        let mut world = SphereWorld::new(0.5);
        let ray = Ray::new(Vec3::ZERO, Vec3::X, 100.0, LAYER_ALL);
        let shot = LagCompensator::new(0.1).validate(&mut world, &ray, 1.0, Some(4), None, None);
        assert_eq!(shot.validation, ShotValidation::Miss);
    }
}
