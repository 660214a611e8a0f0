//! Ball joint between two anchor points.

use glam::Vec3;
use rapier3d::prelude::{GenericJoint, JointAxesMask, JointAxis, MotorModel, Real};

use super::{ConstraintMut, JointContext};
use crate::units::{point_to_physics, to_physics};

/// Stiffness of the position motors that replace the locked linear axes
/// when an impulse clamp is set.
const CLAMPED_STIFFNESS: Real = 1.0e6;
const CLAMPED_DAMPING: Real = 1.0e3;

/// Optional impulse clamp of a ball joint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSettings {
    /// Largest linear impulse per substep in system units; zero or less
    /// keeps the anchors rigidly together.
    pub impulse_clamp: f32,
}

impl PointSettings {
    pub(crate) fn apply(&self, joint: &mut GenericJoint, ctx: &JointContext) {
        if self.impulse_clamp <= 0.0 {
            return;
        }
        joint.locked_axes.remove(JointAxesMask::LIN_AXES);
        let max_force = to_physics(self.impulse_clamp) / ctx.dt.max(Real::EPSILON);
        for axis in [JointAxis::LinX, JointAxis::LinY, JointAxis::LinZ] {
            joint.set_motor_model(axis, MotorModel::ForceBased);
            joint.set_motor(axis, 0.0, 0.0, CLAMPED_STIFFNESS, CLAMPED_DAMPING);
            joint.set_motor_max_force(axis, max_force);
        }
    }
}

impl ConstraintMut<'_> {
    /// Move the anchor on body A, given in its local space.
    pub fn set_anchor_a(&mut self, anchor: Vec3) {
        if self.point().is_none() {
            return;
        }
        let anchor = match self.inner.body_a {
            Some(_) => anchor - self.inner.centroid_a,
            None => anchor,
        };
        self.inner.frame_a.translation.vector = point_to_physics(anchor).coords;
        self.sync();
    }

    /// Move the anchor on body B, given in its local space.
    pub fn set_anchor_b(&mut self, anchor: Vec3) {
        if self.point().is_none() {
            return;
        }
        let anchor = match self.inner.body_b {
            Some(_) => anchor - self.inner.centroid_b,
            None => anchor,
        };
        self.inner.frame_b.translation.vector = point_to_physics(anchor).coords;
        self.sync();
    }

    /// Place both anchors at one world-space point, expressed in each
    /// body's current frame.
    pub fn set_world_anchor(&mut self, anchor: Vec3) {
        if self.point().is_none() {
            return;
        }
        let p = point_to_physics(anchor);
        let local = |pose: Option<rapier3d::prelude::Isometry<Real>>| {
            pose.map_or(p, |pose| pose.inverse_transform_point(&p)).coords
        };
        self.inner.frame_a.translation.vector = local(self.poses[0]);
        self.inner.frame_b.translation.vector = local(self.poses[1]);
        self.sync();
    }

    pub fn set_impulse_clamp(&mut self, clamp: f32) {
        if let Some(s) = self.point() {
            s.impulse_clamp = clamp;
            self.sync();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::tests::two_body;
    use crate::constraint::{axis_mask, ConstraintKind, Settings};
    use approx::assert_relative_eq;

    #[test]
    fn unclamped_ball_locks_translation_only() {
        let joint = two_body(ConstraintKind::Point2Point).build_joint();
        assert!(joint.locked_axes.contains(JointAxesMask::LIN_AXES));
        assert!(!joint.locked_axes.intersects(JointAxesMask::ANG_AXES));
    }

    #[test]
    fn clamp_turns_linear_axes_into_bounded_motors() {
        let mut c = two_body(ConstraintKind::Point2Point);
        c.dt = 0.02;
        c.settings = Settings::Point(PointSettings { impulse_clamp: 10.0 });
        let joint = c.build_joint();
        assert!(!joint.locked_axes.intersects(JointAxesMask::LIN_AXES));
        assert!(joint.motor_axes.contains(axis_mask(JointAxis::LinY)));
        let motor = joint.motor(JointAxis::LinZ).unwrap();
        assert_relative_eq!(motor.max_force, 5.0, max_relative = 1e-5);
        assert_relative_eq!(motor.target_pos, 0.0);
    }
}
