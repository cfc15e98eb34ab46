//! Closing zone: two walls chasing the field around the track
//!
//! The zone's speed reacts to how far the players' centroid is ahead of the
//! zone's own centroid: a lagging field keeps the zone near base speed, a
//! field pulling ahead makes it accelerate non-linearly.

use serde::{Deserialize, Serialize};

use crate::net::wire::{WireField, WireSchema, WireType};
use crate::util::math::{circular_mean_fraction, clamp01, delta_angle, smooth_damp};

use super::presentation::ZoneMarkers;
use super::track::TrackGeometry;

/// Zone speed quantization: ten-thousandths of a lap per second
pub const SPEED_SCALE: f32 = 10_000.0;

/// Replicated zone state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneState {
    /// Absolute progress in laps (not wrapped)
    pub progress: f32,
    /// Metres between the two walls
    pub width: f32,
    /// Laps per second
    pub speed: f32,
}

impl WireSchema for ZoneState {
    const FIELDS: &'static [WireField] = &[
        WireField::new("progress", WireType::F32),
        WireField::new("width", WireType::F32),
        WireField::new("speed", WireType::I16 { scale: SPEED_SCALE }),
    ];

    fn write_values(&self, out: &mut Vec<f64>) {
        out.extend([self.progress as f64, self.width as f64, self.speed as f64]);
    }

    fn read_values(values: &[f64]) -> Self {
        Self {
            progress: values[0] as f32,
            width: values[1] as f32,
            speed: values[2] as f32,
        }
    }
}

impl ZoneState {
    /// Absolute progress of the (chasing, leading) walls for a rail of `rail_length` metres
    pub fn wall_progress(&self, rail_length: f32) -> (f32, f32) {
        if rail_length <= 0.0 {
            return (self.progress, self.progress);
        }
        let half = self.width.max(0.0) / rail_length / 2.0;
        (self.progress - half, self.progress + half)
    }

    /// Place both walls on the rail
    pub fn markers(&self, track: &dyn TrackGeometry) -> ZoneMarkers {
        let (chasing, leading) = self.wall_progress(track.length());
        ZoneMarkers {
            chasing: track.transform_at(chasing),
            leading: track.transform_at(leading),
        }
    }
}

/// Zone tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneConfig {
    /// Laps per second when the field is not ahead
    pub base_speed: f32,
    /// Extra laps per second at full offset
    pub speed_increase: f32,
    pub exponent: f32,
    /// Centroid offset, in degrees of lap, that counts as full offset
    pub max_offset_degrees: f32,
    /// Zone centroid sits this many laps ahead of its progress
    pub centroid_bias: f32,
    pub smooth_time: f32,
    /// Metres per second the walls close
    pub closing_rate: f32,
    pub initial_width: f32,
    pub min_speed: f32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            base_speed: 0.005,
            speed_increase: 0.02,
            exponent: 2.0,
            max_offset_degrees: 90.0,
            centroid_bias: 0.0,
            smooth_time: 2.0,
            closing_rate: 0.5,
            initial_width: 150.0,
            min_speed: 0.0,
        }
    }
}

/// Server-only zone integrator
#[derive(Debug, Clone)]
pub struct ZoneSimulation {
    config: ZoneConfig,
    state: ZoneState,
    speed_velocity: f32,
}

impl ZoneSimulation {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            state: Self::initial_state(&config),
            speed_velocity: 0.0,
        }
    }

    fn initial_state(config: &ZoneConfig) -> ZoneState {
        ZoneState {
            progress: 0.0,
            width: config.initial_width.max(0.0),
            speed: config.base_speed.max(config.min_speed),
        }
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = Self::initial_state(&self.config);
        self.speed_velocity = 0.0;
    }

    /// Speed the zone is steering toward given the players' lap fractions
    pub fn target_speed(&self, player_fractions: &[f32]) -> f32 {
        let finite: Vec<f32> = player_fractions
            .iter()
            .copied()
            .filter(|fraction| fraction.is_finite())
            .collect();
        let Some(players) = circular_mean_fraction(&finite) else {
            return self.config.base_speed;
        };
        let zone_centroid = (self.state.progress + self.config.centroid_bias).rem_euclid(1.0);
        let offset = delta_angle(zone_centroid * 360.0, players * 360.0);
        let ratio = clamp01(offset / self.config.max_offset_degrees.max(f32::EPSILON));
        self.config.base_speed + ratio.powf(self.config.exponent) * self.config.speed_increase
    }

    /// Advance one tick
    pub fn step(&mut self, player_fractions: &[f32], dt: f32) -> ZoneState {
        if dt <= 0.0 {
            return self.state;
        }

        let target = self.target_speed(player_fractions);
        let speed = smooth_damp(
            self.state.speed,
            target,
            &mut self.speed_velocity,
            self.config.smooth_time,
            dt,
        );
        if speed.is_finite() && self.speed_velocity.is_finite() {
            self.state.speed = speed.max(self.config.min_speed);
        } else {
            self.speed_velocity = 0.0;
        }
        self.state.progress += self.state.speed * dt;
        self.state.width = (self.state.width - self.config.closing_rate * dt).max(0.0);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::track::RailTrack;
    use crate::net::wire::{decode, encode};
    use assert_approx_eq::assert_approx_eq;

    fn config() -> ZoneConfig {
        ZoneConfig {
            base_speed: 0.01,
            speed_increase: 0.05,
            exponent: 2.0,
            max_offset_degrees: 90.0,
            centroid_bias: 0.0,
            smooth_time: 0.5,
            closing_rate: 2.0,
            initial_width: 10.0,
            min_speed: 0.0,
        }
    }

    #[test]
    fn empty_field_advances_at_base_speed_and_closes() {
        let mut zone = ZoneSimulation::new(config());
        let dt = 0.1;
        for _ in 0..100 {
            zone.step(&[], dt);
        }
        let state = zone.state();
        assert_approx_eq!(state.progress, 0.01 * 10.0, 1e-4);
        assert_approx_eq!(state.speed, 0.01, 1e-6);
        // 10 m at 2 m/s closes after 5 s and stays shut
        assert_eq!(state.width, 0.0);
    }

    #[test]
    fn leaders_accelerate_the_zone() {
        let zone = ZoneSimulation::new(config());
        let lagging = zone.target_speed(&[0.95]);
        let level = zone.target_speed(&[0.0]);
        let ahead = zone.target_speed(&[0.125]);
        let far_ahead = zone.target_speed(&[0.3]);

        assert_approx_eq!(lagging, 0.01, 1e-6);
        assert_approx_eq!(level, 0.01, 1e-6);
        // 45 degrees of 90 -> 0.25 of the increase
        assert_approx_eq!(ahead, 0.01 + 0.25 * 0.05, 1e-5);
        assert_approx_eq!(far_ahead, 0.06, 1e-5);
    }

    #[test]
    fn speed_is_smoothed_toward_target() {
        let mut zone = ZoneSimulation::new(config());
        let first = zone.step(&[0.3], 0.05).speed;
        assert!(first > 0.01 && first < 0.06);
        for _ in 0..400 {
            zone.step(&[zone.state().progress.rem_euclid(1.0) + 0.3], 0.05);
        }
        assert_approx_eq!(zone.state().speed, 0.06, 1e-3);
    }

    #[test]
    fn non_finite_fractions_are_ignored() {
        let mut zone = ZoneSimulation::new(config());
        assert_approx_eq!(zone.target_speed(&[f32::NAN]), 0.01, 1e-6);
        assert_approx_eq!(
            zone.target_speed(&[f32::NAN, 0.125, f32::INFINITY]),
            zone.target_speed(&[0.125]),
            1e-6
        );

        let mut last = zone.state().progress;
        for _ in 0..20 {
            let state = zone.step(&[f32::NAN, 0.3], 0.05);
            assert!(state.speed.is_finite() && state.speed >= 0.01);
            assert!(state.progress.is_finite() && state.progress > last);
            last = state.progress;
        }
    }

    #[test]
    fn zone_never_moves_backward() {
        let mut zone = ZoneSimulation::new(config());
        let mut last = zone.state().progress;
        for i in 0..200 {
            let fraction = (i as f32 * 0.037).rem_euclid(1.0);
            let state = zone.step(&[fraction], 0.05);
            assert!(state.progress >= last);
            last = state.progress;
        }
    }

    #[test]
    fn walls_straddle_progress() {
        let state = ZoneState {
            progress: 2.5,
            width: 100.0,
            speed: 0.0,
        };
        let (chasing, leading) = state.wall_progress(1000.0);
        assert_approx_eq!(chasing, 2.45, 1e-5);
        assert_approx_eq!(leading, 2.55, 1e-5);

        let track = RailTrack::ring(100.0, 64).unwrap();
        let markers = state.markers(&track);
        assert!(markers.chasing.0.distance(markers.leading.0) > 0.0);
    }

    #[test]
    fn speed_is_sent_at_reduced_precision() {
        let state = ZoneState {
            progress: 1.25,
            width: 80.0,
            speed: 0.012345,
        };
        let bytes = encode(&state).unwrap();
        assert_eq!(bytes.len(), 10);
        let decoded: ZoneState = decode(&bytes).unwrap();
        assert_eq!(decoded.progress, 1.25);
        assert_approx_eq!(decoded.speed, 0.0123, 1e-6);
    }
}
