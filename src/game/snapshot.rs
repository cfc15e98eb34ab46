//! Timestamped player state and its compact wire layout

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::net::wire::{WireField, WireSchema, WireType};

/// Velocity quantization: centimetres per second
pub const VELOCITY_SCALE: f32 = 100.0;
/// Orientation quantization: fiftieths of a degree
pub const ORIENTATION_SCALE: f32 = 50.0;

/// One player's physical state at one instant.
///
/// `orientation` is euler angles in degrees. Snapshots are never mutated
/// once appended to a history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds on the server simulation clock (or the sender's estimate of it)
    pub send_time: f64,
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Vec3,
}

impl Snapshot {
    pub fn new(send_time: f64, position: Vec3, velocity: Vec3, orientation: Vec3) -> Self {
        Self {
            send_time,
            position,
            velocity,
            orientation,
        }
    }

    /// Stationary sample with zero velocity and identity orientation
    pub fn at_rest(send_time: f64, position: Vec3) -> Self {
        Self::new(send_time, position, Vec3::ZERO, Vec3::ZERO)
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Every component is a real number
    pub fn is_finite(&self) -> bool {
        self.send_time.is_finite()
            && self.position.is_finite()
            && self.velocity.is_finite()
            && self.orientation.is_finite()
    }
}

impl WireSchema for Snapshot {
    const FIELDS: &'static [WireField] = &[
        WireField::new("send_time", WireType::F64),
        WireField::new("position.x", WireType::F32),
        WireField::new("position.y", WireType::F32),
        WireField::new("position.z", WireType::F32),
        WireField::new("velocity.x", WireType::I16 { scale: VELOCITY_SCALE }),
        WireField::new("velocity.y", WireType::I16 { scale: VELOCITY_SCALE }),
        WireField::new("velocity.z", WireType::I16 { scale: VELOCITY_SCALE }),
        WireField::new("orientation.x", WireType::I16 { scale: ORIENTATION_SCALE }),
        WireField::new("orientation.y", WireType::I16 { scale: ORIENTATION_SCALE }),
        WireField::new("orientation.z", WireType::I16 { scale: ORIENTATION_SCALE }),
    ];

    fn write_values(&self, out: &mut Vec<f64>) {
        out.push(self.send_time);
        for v in [self.position, self.velocity, wrap_orientation(self.orientation)] {
            out.extend([v.x as f64, v.y as f64, v.z as f64]);
        }
    }

    fn read_values(values: &[f64]) -> Self {
        let vec = |i: usize| Vec3::new(values[i] as f32, values[i + 1] as f32, values[i + 2] as f32);
        Self {
            send_time: values[0],
            position: vec(1),
            velocity: vec(4),
            orientation: vec(7),
        }
    }
}

/// Fold each axis into (-180, 180] so it survives i16 quantization
fn wrap_orientation(euler: Vec3) -> Vec3 {
    let wrap = |deg: f32| {
        let d = deg.rem_euclid(360.0);
        if d > 180.0 {
            d - 360.0
        } else {
            d
        }
    };
    Vec3::new(wrap(euler.x), wrap(euler.y), wrap(euler.z))
}
