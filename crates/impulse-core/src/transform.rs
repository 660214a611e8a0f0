//! Narrow interface onto the entity/transform layer.

use glam::{Affine3A, Mat3, Vec3};

/// World placement of an entity, read by physics components on transform
/// change and written back once per step.
pub trait EntityTransform {
    fn origin(&self) -> Vec3;

    fn axis(&self) -> Mat3;

    fn set_origin_axis(&mut self, origin: Vec3, axis: Mat3);

    /// Local → world affine transform.
    fn local_to_world(&self) -> Affine3A {
        Affine3A::from_mat3_translation(self.axis(), self.origin())
    }

    /// World → local affine transform.
    fn world_to_local(&self) -> Affine3A {
        self.local_to_world().inverse()
    }
}

/// Plain origin/axis pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub origin: Vec3,
    pub axis: Mat3,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            axis: Mat3::IDENTITY,
        }
    }
}

impl Placement {
    #[must_use]
    pub const fn new(origin: Vec3, axis: Mat3) -> Self {
        Self { origin, axis }
    }

    #[must_use]
    pub const fn from_origin(origin: Vec3) -> Self {
        Self {
            origin,
            axis: Mat3::IDENTITY,
        }
    }
}

impl EntityTransform for Placement {
    fn origin(&self) -> Vec3 {
        self.origin
    }

    fn axis(&self) -> Mat3 {
        self.axis
    }

    fn set_origin_axis(&mut self, origin: Vec3, axis: Mat3) {
        self.origin = origin;
        self.axis = axis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_local_inverts_placement() {
        let placement = Placement::new(
            Vec3::new(10.0, 0.0, 5.0),
            Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );
        let world = placement.local_to_world().transform_point3(Vec3::X);
        assert!((world - Vec3::new(10.0, 1.0, 5.0)).length() < 1e-5);
        let local = placement.world_to_local().transform_point3(world);
        assert!((local - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn set_origin_axis_overwrites() {
        let mut placement = Placement::default();
        placement.set_origin_axis(Vec3::ONE, Mat3::from_rotation_x(0.3));
        assert_eq!(placement.origin(), Vec3::ONE);
        assert_eq!(placement.axis(), Mat3::from_rotation_x(0.3));
    }
}
