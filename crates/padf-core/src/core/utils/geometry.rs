use nalgebra::Vector3;
use std::f64::consts::PI;
use thiserror::Error;

use crate::core::models::atom::Atom;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Angle is undefined for zero-length or non-finite vectors and for coincident or antiparallel pairs")]
    UndefinedAngle,
}

/// Euclidean distance between `a` and `b`.
#[inline]
pub fn distance(a: &Atom, b: &Atom) -> f64 {
    (b - a).norm()
}

/// Component-wise difference `b - a`.
#[inline]
pub fn difference(a: &Atom, b: &Atom) -> Vector3<f64> {
    b - a
}

/// Angle between `u` and `v` in radians, in the half-open range `[0, pi)`.
///
/// The cosine is clamped to `[-1, 1]` before the inverse cosine so that rounding
/// drift never leaves its domain.
///
/// # Errors
///
/// Returns [`GeometryError::UndefinedAngle`] if either vector has zero or non-finite
/// magnitude, if `u` and `v` are the same vector (the degenerate pairing of an
/// atom with itself), or if the vectors are antiparallel so the angle reaches `pi`.
#[inline]
pub fn angle(u: &Vector3<f64>, v: &Vector3<f64>) -> Result<f64, GeometryError> {
    let magnitude = u.norm() * v.norm();
    if magnitude == 0.0 || !magnitude.is_finite() || u == v {
        return Err(GeometryError::UndefinedAngle);
    }
    let cosine = (u.dot(v) / magnitude).clamp(-1.0, 1.0);
    let theta = cosine.acos();
    if theta >= PI {
        return Err(GeometryError::UndefinedAngle);
    }
    Ok(theta)
}
