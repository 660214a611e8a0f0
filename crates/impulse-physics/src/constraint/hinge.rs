//! Single-axis revolute joint.

use rapier3d::prelude::{GenericJoint, Isometry, JointAxis, Real};

use super::{apply_limit, solver_angular_limits, ConstraintMut, JointContext};
use crate::units::to_physics_sq;

/// Limit and motor state of a hinge. Angles in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct HingeSettings {
    pub lower: f32,
    pub upper: f32,
    pub limit_enabled: bool,
    /// Target angular velocity, rad/s.
    pub motor_velocity: f32,
    /// Largest angular impulse the motor may apply per substep, system
    /// units.
    pub motor_max_impulse: f32,
    pub motor_enabled: bool,
}

impl Default for HingeSettings {
    fn default() -> Self {
        Self {
            lower: 1.0,
            upper: -1.0,
            limit_enabled: false,
            motor_velocity: 0.0,
            motor_max_impulse: 0.0,
            motor_enabled: false,
        }
    }
}

impl HingeSettings {
    pub(crate) fn apply(&self, joint: &mut GenericJoint, ctx: &JointContext) {
        if self.limit_enabled {
            let [lower, upper] = solver_angular_limits(self.lower, self.upper);
            apply_limit(joint, JointAxis::AngX, lower, upper);
        }
        if self.motor_enabled {
            joint.set_motor_velocity(JointAxis::AngX, -self.motor_velocity, 1.0);
            joint.set_motor_max_force(
                JointAxis::AngX,
                to_physics_sq(self.motor_max_impulse) / ctx.dt.max(Real::EPSILON),
            );
        }
    }
}

/// Hinge angle from the relative pose of frame B in frame A, in the
/// user-facing sign convention.
pub(crate) fn angle(relative: &Isometry<Real>) -> f32 {
    -relative.rotation.scaled_axis().x
}

impl ConstraintMut<'_> {
    /// An inverted pair (`lower > upper`) removes the limit.
    pub fn set_hinge_limits(&mut self, lower: f32, upper: f32) {
        if let Some(s) = self.hinge() {
            s.lower = lower;
            s.upper = upper;
            s.limit_enabled = lower <= upper;
            self.sync();
        }
    }

    pub fn enable_hinge_limit(&mut self, enabled: bool) {
        if let Some(s) = self.hinge() {
            s.limit_enabled = enabled;
            self.sync();
        }
    }

    pub fn set_hinge_motor(&mut self, target_velocity: f32, max_impulse: f32) {
        if let Some(s) = self.hinge() {
            s.motor_velocity = target_velocity;
            s.motor_max_impulse = max_impulse.max(0.0);
            self.sync();
        }
    }

    pub fn enable_hinge_motor(&mut self, enabled: bool) {
        if let Some(s) = self.hinge() {
            s.motor_enabled = enabled;
            self.sync();
        }
    }
}
