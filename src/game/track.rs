//! Track rail geometry: a closed polyline of points and orientations

use std::path::Path;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Where a world position sits along the rail
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackProjection {
    /// Nearest rail point
    pub index: usize,
    /// Lap-normalized progress in [0, 1)
    pub lap_fraction: f32,
    /// Metres along the rail from point 0
    pub distance_along: f32,
}

/// Track geometry collaborator
pub trait TrackGeometry: Send + Sync {
    fn nearest_point(&self, position: Vec3) -> usize;
    fn project(&self, position: Vec3) -> TrackProjection;
    /// World transform at a lap fraction; wraps at the seam
    fn transform_at(&self, lap_fraction: f32) -> (Vec3, Quat);
    /// Total rail length in metres
    fn length(&self) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailPoint {
    pub position: Vec3,
    #[serde(default = "identity")]
    pub rotation: Quat,
}

fn identity() -> Quat {
    Quat::IDENTITY
}

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("rail needs at least 3 points, got {0}")]
    TooFewPoints(usize),

    #[error("rail has zero length")]
    Degenerate,

    #[error("failed to read rail file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rail file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RailTrack {
    points: Vec<RailPoint>,
    /// Distance from point 0 to point i
    cumulative: Vec<f32>,
    length: f32,
}

impl RailTrack {
    pub fn new(points: Vec<RailPoint>) -> Result<Self, TrackError> {
        if points.len() < 3 {
            return Err(TrackError::TooFewPoints(points.len()));
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut length = 0.0;
        for (i, point) in points.iter().enumerate() {
            cumulative.push(length);
            let next = &points[(i + 1) % points.len()];
            length += point.position.distance(next.position);
        }
        if length <= f32::EPSILON {
            return Err(TrackError::Degenerate);
        }

        Ok(Self {
            points,
            cumulative,
            length,
        })
    }

    /// Flat circular rail around the origin, facing along travel direction
    pub fn ring(radius: f32, count: usize) -> Result<Self, TrackError> {
        let points = (0..count)
            .map(|i| {
                let angle = i as f32 / count as f32 * std::f32::consts::TAU;
                RailPoint {
                    position: Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius),
                    // yaw so local +Z follows the tangent
                    rotation: Quat::from_rotation_y(-angle),
                }
            })
            .collect();
        Self::new(points)
    }

    /// Load a JSON array of `{ "position": [x, y, z], "rotation": [x, y, z, w] }`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let raw = std::fs::read_to_string(path)?;
        let points: Vec<RailPoint> = serde_json::from_str(&raw)?;
        Self::new(points)
    }

    pub fn points(&self) -> &[RailPoint] {
        &self.points
    }

    fn segment_length(&self, i: usize) -> f32 {
        let next = (i + 1) % self.points.len();
        self.points[i].position.distance(self.points[next].position)
    }

    /// Closest point on segment `i -> i+1`: (distance along rail, squared distance)
    fn project_segment(&self, i: usize, position: Vec3) -> (f32, f32) {
        let a = self.points[i].position;
        let b = self.points[(i + 1) % self.points.len()].position;
        let ab = b - a;
        let len_sq = ab.length_squared();
        let t = if len_sq > 0.0 {
            ((position - a).dot(ab) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = a + ab * t;
        (
            self.cumulative[i] + t * self.segment_length(i),
            closest.distance_squared(position),
        )
    }
}

impl TrackGeometry for RailTrack {
    fn nearest_point(&self, position: Vec3) -> usize {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.position
                    .distance_squared(position)
                    .total_cmp(&b.position.distance_squared(position))
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn project(&self, position: Vec3) -> TrackProjection {
        let index = self.nearest_point(position);
        let prev = (index + self.points.len() - 1) % self.points.len();

        // the closest segment touches the nearest point
        let (before, before_sq) = self.project_segment(prev, position);
        let (after, after_sq) = self.project_segment(index, position);
        let distance_along = if before_sq < after_sq { before } else { after };
        let distance_along = distance_along.rem_euclid(self.length);

        TrackProjection {
            index,
            lap_fraction: (distance_along / self.length).rem_euclid(1.0),
            distance_along,
        }
    }

    fn transform_at(&self, lap_fraction: f32) -> (Vec3, Quat) {
        let count = self.points.len();
        let scaled = lap_fraction.rem_euclid(1.0) * count as f32;
        let lo = scaled.floor();
        let t = scaled - lo;
        let a = &self.points[(lo as usize) % count];
        let b = &self.points[(scaled.ceil() as usize) % count];
        (
            a.position.lerp(b.position, t),
            a.rotation.slerp(b.rotation, t),
        )
    }

    fn length(&self) -> f32 {
        self.length
    }
}

/// Turns wrapped lap fractions into absolute progress by counting seam crossings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LapCounter {
    laps: i32,
    last_fraction: Option<f32>,
}

impl LapCounter {
    /// Feed the latest fraction; returns absolute progress in laps.
    /// Non-finite fractions are ignored.
    pub fn update(&mut self, fraction: f32) -> f32 {
        if !fraction.is_finite() {
            return self.progress();
        }
        if let Some(last) = self.last_fraction {
            if last > 0.75 && fraction < 0.25 {
                self.laps += 1;
            } else if last < 0.25 && fraction > 0.75 {
                self.laps -= 1;
            }
        }
        self.last_fraction = Some(fraction);
        self.progress()
    }

    /// Whether any fraction has been fed since the counter was created
    pub fn has_sample(&self) -> bool {
        self.last_fraction.is_some()
    }

    pub fn progress(&self) -> f32 {
        self.laps as f32 + self.last_fraction.unwrap_or(0.0)
    }

    /// Completed forward laps, never negative
    pub fn laps_completed(&self) -> u32 {
        self.laps.max(0) as u32
    }
}
