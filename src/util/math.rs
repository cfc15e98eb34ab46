//! Angle, damping and quantization helpers shared by the simulation

use glam::Vec3;

/// Shortest signed difference from `current` to `target`, in degrees (-180, 180]
pub fn delta_angle(current: f32, target: f32) -> f32 {
    let mut delta = (target - current).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Interpolate an angle in degrees along the shortest path
pub fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    a + delta_angle(a, b) * t
}

/// Interpolate each euler axis independently along its shortest path
pub fn lerp_euler(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    Vec3::new(
        lerp_angle(a.x, b.x, t),
        lerp_angle(a.y, b.y, t),
        lerp_angle(a.z, b.z, t),
    )
}

pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Critically damped approach of `current` toward `target`.
///
/// `velocity` carries the rate of change between calls. The step never
/// overshoots the target.
pub fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return current;
    }

    let smooth_time = smooth_time.max(0.0001);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = target + (change + temp) * exp;

    // Clamp overshoot
    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = (output - target) / dt;
    }

    output
}

/// Quantize a value into the 16-bit signed range with the given scale
pub fn quantize_i16(value: f32, scale: f32) -> i16 {
    let scaled = (value * scale).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn dequantize_i16(value: i16, scale: f32) -> f32 {
    value as f32 / scale
}

/// Average of lap fractions treated as points on a circle.
///
/// Returns `None` for an empty input or when the fractions cancel out.
pub fn circular_mean_fraction(fractions: &[f32]) -> Option<f32> {
    if fractions.is_empty() {
        return None;
    }

    let (sin_sum, cos_sum) = fractions.iter().fold((0.0f32, 0.0f32), |(s, c), f| {
        let angle = f * std::f32::consts::TAU;
        (s + angle.sin(), c + angle.cos())
    });

    if sin_sum.abs() < 1e-6 && cos_sum.abs() < 1e-6 {
        return None;
    }

    Some((sin_sum.atan2(cos_sum) / std::f32::consts::TAU).rem_euclid(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn delta_angle_takes_short_way_round() {
        assert_approx_eq!(delta_angle(350.0, 10.0), 20.0, 1e-4);
        assert_approx_eq!(delta_angle(10.0, 350.0), -20.0, 1e-4);
        assert_approx_eq!(delta_angle(0.0, 180.0), 180.0, 1e-4);
    }

    #[test]
    fn lerp_angle_wraps_through_zero() {
        let mid = lerp_angle(350.0, 10.0, 0.5);
        assert_approx_eq!(mid.rem_euclid(360.0), 0.0, 1e-3);
    }

    #[test]
    fn smooth_damp_converges_without_overshoot() {
        let mut velocity = 0.0;
        let mut value = 0.0;
        for _ in 0..600 {
            value = smooth_damp(value, 10.0, &mut velocity, 0.5, 1.0 / 60.0);
            assert!(value <= 10.0);
        }
        assert_approx_eq!(value, 10.0, 1e-2);
    }

    #[test]
    fn smooth_damp_holds_when_at_target() {
        let mut velocity = 0.0;
        let value = smooth_damp(3.0, 3.0, &mut velocity, 1.0, 0.1);
        assert_approx_eq!(value, 3.0, 1e-6);
        assert_approx_eq!(velocity, 0.0, 1e-6);
    }

    #[test]
    fn quantize_clamps_to_i16() {
        assert_eq!(quantize_i16(1_000_000.0, 1.0), i16::MAX);
        assert_eq!(quantize_i16(-1_000_000.0, 1.0), i16::MIN);
        assert_eq!(quantize_i16(1.234, 100.0), 123);
        assert_approx_eq!(dequantize_i16(123, 100.0), 1.23, 1e-6);
    }

    #[test]
    fn circular_mean_handles_seam() {
        let mean = circular_mean_fraction(&[0.95, 0.05]).unwrap();
        assert!(mean < 0.01 || mean > 0.99);
        assert!(circular_mean_fraction(&[]).is_none());
    }
}
