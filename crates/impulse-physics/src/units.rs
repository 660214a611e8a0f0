//! glam ↔ rapier conversions with the system/physics unit scale applied.
//!
//! Positions, velocities, forces and impulses scale linearly with length.
//! Directions, rotations and angular velocities are unit-free. Torques and
//! angular impulses scale with length squared.

use glam::{Mat3, Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::{point, vector, Isometry, Point, Real, Rotation, Vector};

pub use impulse_core::units::{
    to_physics, to_physics_sq, to_system, to_system_sq, vec_to_physics, vec_to_system,
    PHYSICS_UNIT_TO_SYSTEM_UNIT, SYSTEM_UNIT_TO_PHYSICS_UNIT,
};

// -- Unscaled --

#[inline]
pub fn to_na(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

#[inline]
pub fn from_na(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn rotation_to_na(axis: Mat3) -> Rotation<Real> {
    quat_to_na(Quat::from_mat3(&axis))
}

pub fn quat_to_na(q: Quat) -> Rotation<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn rotation_from_na(rot: &Rotation<Real>) -> Mat3 {
    Mat3::from_quat(quat_from_na(rot))
}

pub fn quat_from_na(rot: &Rotation<Real>) -> Quat {
    let c = rot.coords;
    Quat::from_xyzw(c.x, c.y, c.z, c.w).normalize()
}

// -- Scaled --

/// System-unit vector → physics-unit backend vector.
#[inline]
pub fn vector_to_physics(v: Vec3) -> Vector<Real> {
    to_na(v * SYSTEM_UNIT_TO_PHYSICS_UNIT)
}

/// Physics-unit backend vector → system-unit vector.
#[inline]
pub fn vector_to_system(v: &Vector<Real>) -> Vec3 {
    from_na(v) * PHYSICS_UNIT_TO_SYSTEM_UNIT
}

#[inline]
pub fn point_to_physics(p: Vec3) -> Point<Real> {
    let p = p * SYSTEM_UNIT_TO_PHYSICS_UNIT;
    point![p.x, p.y, p.z]
}

#[inline]
pub fn point_to_system(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z) * PHYSICS_UNIT_TO_SYSTEM_UNIT
}

/// Torque / angular impulse (length²) into physics units.
#[inline]
pub fn moment_to_physics(v: Vec3) -> Vector<Real> {
    to_na(v * SYSTEM_UNIT_TO_PHYSICS_UNIT * SYSTEM_UNIT_TO_PHYSICS_UNIT)
}

#[inline]
pub fn moment_to_system(v: &Vector<Real>) -> Vec3 {
    from_na(v) * PHYSICS_UNIT_TO_SYSTEM_UNIT * PHYSICS_UNIT_TO_SYSTEM_UNIT
}

/// System-unit origin + axis → backend isometry.
pub fn isometry_to_physics(origin: Vec3, axis: Mat3) -> Isometry<Real> {
    Isometry::from_parts(vector_to_physics(origin).into(), rotation_to_na(axis))
}

/// Backend isometry → system-unit origin + axis.
pub fn isometry_to_system(iso: &Isometry<Real>) -> (Vec3, Mat3) {
    (
        vector_to_system(&iso.translation.vector),
        rotation_from_na(&iso.rotation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vector_scaling() {
        let v = vector_to_physics(Vec3::new(100.0, -50.0, 0.0));
        assert_relative_eq!(v.x, 1.0, max_relative = 1e-6);
        assert_relative_eq!(v.y, -0.5, max_relative = 1e-6);
        let back = vector_to_system(&v);
        assert_relative_eq!(back.x, 100.0, max_relative = 1e-5);
    }

    #[test]
    fn moment_scaling_is_squared() {
        let m = moment_to_physics(Vec3::new(10_000.0, 0.0, 0.0));
        assert_relative_eq!(m.x, 1.0, max_relative = 1e-5);
        assert_relative_eq!(moment_to_system(&m).x, 10_000.0, max_relative = 1e-5);
    }

    #[test]
    fn rotation_round_trip() {
        let axis = Mat3::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 2.0);
        let back = rotation_from_na(&rotation_to_na(axis));
        for (a, b) in axis.to_cols_array().iter().zip(back.to_cols_array().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn rotation_agrees_with_glam() {
        let q = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let rot = quat_to_na(q);
        let rotated = from_na(&(rot * to_na(Vec3::X)));
        assert!((rotated - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn isometry_round_trip() {
        let origin = Vec3::new(250.0, -10.0, 42.0);
        let axis = Mat3::from_rotation_y(0.7);
        let (o, a) = isometry_to_system(&isometry_to_physics(origin, axis));
        assert!((o - origin).length() < 1e-3);
        assert!((a.x_axis - axis.x_axis).length() < 1e-5);
    }
}
