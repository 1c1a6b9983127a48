//! Vector helpers shared by the attitude filter and calibration.
//!
//! Directions (measured gravity, fused estimate, reference) are always unit
//! length. Normalization of a zero vector is refused instead of producing NaN,
//! so callers can keep their previous value.

use nalgebra::Vector3;

pub type Vec3 = Vector3<f64>;

/// Magnitudes at or below this are treated as zero.
pub const DEGENERATE_NORM: f64 = 1e-12;

/// The default "up" direction used before calibration and as a fallback.
pub fn up() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}

/// Unit vector in the direction of `v`, or `None` for a zero-magnitude input.
pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
    let norm = v.norm();
    if norm.is_finite() && norm > DEGENERATE_NORM {
        Some(v / norm)
    } else {
        None
    }
}

/// Angle in degrees between two unit directions.
///
/// The cosine is clamped into [-1, 1] before `acos`, which keeps rounding
/// noise (e.g. a dot product of 1.0000002) from turning into NaN.
pub fn angle_between_deg(a: &Vec3, b: &Vec3) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}
