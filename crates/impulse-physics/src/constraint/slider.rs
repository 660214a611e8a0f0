//! Slider: translation and rotation along the frame's X axis.

use rapier3d::prelude::{GenericJoint, JointAxis};

use super::{apply_limit, solver_angular_limits, ConstraintMut, JointContext};
use crate::units::{to_physics, to_physics_sq};

/// Limits and motors of both slider axes. Linear values in system units,
/// angles in radians.
///
/// By default the slider translates freely and does not rotate.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderSettings {
    pub linear_lower: f32,
    pub linear_upper: f32,
    pub linear_limit_enabled: bool,
    pub angular_lower: f32,
    pub angular_upper: f32,
    pub angular_limit_enabled: bool,
    pub linear_motor_velocity: f32,
    pub linear_motor_max_force: f32,
    pub linear_motor_enabled: bool,
    pub angular_motor_velocity: f32,
    pub angular_motor_max_torque: f32,
    pub angular_motor_enabled: bool,
}

impl Default for SliderSettings {
    fn default() -> Self {
        Self {
            linear_lower: 0.0,
            linear_upper: 0.0,
            linear_limit_enabled: false,
            angular_lower: 0.0,
            angular_upper: 0.0,
            angular_limit_enabled: true,
            linear_motor_velocity: 0.0,
            linear_motor_max_force: 0.0,
            linear_motor_enabled: false,
            angular_motor_velocity: 0.0,
            angular_motor_max_torque: 0.0,
            angular_motor_enabled: false,
        }
    }
}

impl SliderSettings {
    pub(crate) fn apply(&self, joint: &mut GenericJoint, _ctx: &JointContext) {
        if self.linear_limit_enabled {
            apply_limit(
                joint,
                JointAxis::LinX,
                to_physics(self.linear_lower),
                to_physics(self.linear_upper),
            );
        }
        if self.angular_limit_enabled {
            let [lower, upper] = solver_angular_limits(self.angular_lower, self.angular_upper);
            apply_limit(joint, JointAxis::AngX, lower, upper);
        }
        if self.linear_motor_enabled {
            joint.set_motor_velocity(JointAxis::LinX, to_physics(self.linear_motor_velocity), 1.0);
            joint.set_motor_max_force(JointAxis::LinX, to_physics(self.linear_motor_max_force));
        }
        if self.angular_motor_enabled {
            joint.set_motor_velocity(JointAxis::AngX, -self.angular_motor_velocity, 1.0);
            joint.set_motor_max_force(JointAxis::AngX, to_physics_sq(self.angular_motor_max_torque));
        }
    }
}

impl ConstraintMut<'_> {
    fn update_slider(&mut self, f: impl FnOnce(&mut SliderSettings)) {
        if let Some(settings) = self.slider() {
            f(settings);
            self.sync();
        }
    }

    /// An inverted pair frees the axis.
    pub fn set_slider_linear_limits(&mut self, lower: f32, upper: f32) {
        self.update_slider(|s| {
            s.linear_lower = lower;
            s.linear_upper = upper;
            s.linear_limit_enabled = lower <= upper;
        });
    }

    pub fn enable_slider_linear_limits(&mut self, enabled: bool) {
        self.update_slider(|s| s.linear_limit_enabled = enabled);
    }

    pub fn set_slider_angular_limits(&mut self, lower: f32, upper: f32) {
        self.update_slider(|s| {
            s.angular_lower = lower;
            s.angular_upper = upper;
            s.angular_limit_enabled = lower <= upper;
        });
    }

    pub fn enable_slider_angular_limits(&mut self, enabled: bool) {
        self.update_slider(|s| s.angular_limit_enabled = enabled);
    }

    pub fn set_slider_linear_motor(&mut self, target_velocity: f32, max_force: f32) {
        self.update_slider(|s| {
            s.linear_motor_velocity = target_velocity;
            s.linear_motor_max_force = max_force.max(0.0);
        });
    }

    pub fn enable_slider_linear_motor(&mut self, enabled: bool) {
        self.update_slider(|s| s.linear_motor_enabled = enabled);
    }

    pub fn set_slider_angular_motor(&mut self, target_velocity: f32, max_torque: f32) {
        self.update_slider(|s| {
            s.angular_motor_velocity = target_velocity;
            s.angular_motor_max_torque = max_torque.max(0.0);
        });
    }

    pub fn enable_slider_angular_motor(&mut self, enabled: bool) {
        self.update_slider(|s| s.angular_motor_enabled = enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::tests::two_body;
    use crate::constraint::{axis_mask, ConstraintKind, Settings};
    use approx::assert_relative_eq;

    #[test]
    fn default_slides_but_does_not_turn() {
        let joint = two_body(ConstraintKind::Slider).build_joint();
        assert!(!joint.locked_axes.contains(axis_mask(JointAxis::LinX)));
        assert!(!joint.limit_axes.contains(axis_mask(JointAxis::LinX)));
        assert!(joint.locked_axes.contains(axis_mask(JointAxis::AngX)));
        assert!(joint.locked_axes.contains(axis_mask(JointAxis::LinY)));
    }

    #[test]
    fn linear_limits_and_motor_in_physics_units() {
        let mut c = two_body(ConstraintKind::Slider);
        c.settings = Settings::Slider(SliderSettings {
            linear_lower: -50.0,
            linear_upper: 150.0,
            linear_limit_enabled: true,
            linear_motor_velocity: 100.0,
            linear_motor_max_force: 200.0,
            linear_motor_enabled: true,
            angular_lower: 1.0,
            angular_upper: -1.0,
            ..SliderSettings::default()
        });
        let joint = c.build_joint();
        let limits = joint.limits(JointAxis::LinX).unwrap();
        assert_relative_eq!(limits.min, -0.5, max_relative = 1e-5);
        assert_relative_eq!(limits.max, 1.5, max_relative = 1e-5);
        let motor = joint.motor(JointAxis::LinX).unwrap();
        assert_relative_eq!(motor.target_vel, 1.0, max_relative = 1e-5);
        assert_relative_eq!(motor.max_force, 2.0, max_relative = 1e-5);
        // Inverted angular pair frees the rotation.
        assert!(!joint.locked_axes.contains(axis_mask(JointAxis::AngX)));
        assert!(!joint.limit_axes.contains(axis_mask(JointAxis::AngX)));
    }
}
