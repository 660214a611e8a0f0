//! System-unit ↔ physics-unit scale.
//!
//! Engine code works in system units (centimetres). The solver is tuned for
//! magnitudes around one, so everything that crosses into it is scaled to
//! metres by a single factor. Masses and angles are unit-free.

use glam::Vec3;

/// Multiplicative factor from system units to physics units.
pub const SYSTEM_UNIT_TO_PHYSICS_UNIT: f32 = 0.01;

/// Multiplicative factor from physics units to system units.
pub const PHYSICS_UNIT_TO_SYSTEM_UNIT: f32 = 1.0 / SYSTEM_UNIT_TO_PHYSICS_UNIT;

/// Scale a length-like scalar into physics units.
#[inline]
#[must_use]
pub fn to_physics(x: f32) -> f32 {
    x * SYSTEM_UNIT_TO_PHYSICS_UNIT
}

/// Scale a length-like scalar into system units.
#[inline]
#[must_use]
pub fn to_system(x: f32) -> f32 {
    x * PHYSICS_UNIT_TO_SYSTEM_UNIT
}

/// Scale a length-squared quantity (torque, angular impulse, inertia).
#[inline]
#[must_use]
pub fn to_physics_sq(x: f32) -> f32 {
    x * SYSTEM_UNIT_TO_PHYSICS_UNIT * SYSTEM_UNIT_TO_PHYSICS_UNIT
}

#[inline]
#[must_use]
pub fn to_system_sq(x: f32) -> f32 {
    x * PHYSICS_UNIT_TO_SYSTEM_UNIT * PHYSICS_UNIT_TO_SYSTEM_UNIT
}

#[inline]
#[must_use]
pub fn vec_to_physics(v: Vec3) -> Vec3 {
    v * SYSTEM_UNIT_TO_PHYSICS_UNIT
}

#[inline]
#[must_use]
pub fn vec_to_system(v: Vec3) -> Vec3 {
    v * PHYSICS_UNIT_TO_SYSTEM_UNIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn factors_are_reciprocal() {
        assert_relative_eq!(SYSTEM_UNIT_TO_PHYSICS_UNIT * PHYSICS_UNIT_TO_SYSTEM_UNIT, 1.0);
    }

    #[test]
    fn scalar_round_trip() {
        assert_relative_eq!(to_system(to_physics(123.5)), 123.5, max_relative = 1e-6);
        assert_relative_eq!(to_physics(100.0), 1.0);
    }

    #[test]
    fn squared_scale() {
        assert_relative_eq!(to_physics_sq(10_000.0), 1.0, max_relative = 1e-6);
        assert_relative_eq!(to_system_sq(1.0), 10_000.0, max_relative = 1e-6);
    }

    #[test]
    fn vector_round_trip() {
        let v = Vec3::new(10.0, -250.0, 3.5);
        let back = vec_to_system(vec_to_physics(v));
        assert!((back - v).length() < 1e-4);
    }
}
