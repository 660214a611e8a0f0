//! Six-degree-of-freedom joint with optional per-axis springs.

use std::f32::consts::TAU;

use glam::Vec3;
use rapier3d::prelude::{GenericJoint, JointAxis, MotorModel};

use super::{apply_limit, solver_angular_limits, ConstraintKind, ConstraintMut, JointContext};
use crate::units::{to_physics, to_physics_sq};

const LINEAR: [JointAxis; 3] = [JointAxis::LinX, JointAxis::LinY, JointAxis::LinZ];
const ANGULAR: [JointAxis; 3] = [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ];

/// Limits, springs and angular motors of a generic joint.
///
/// Linear values are in system units, angles in radians, spring
/// stiffness as a frequency in Hz and spring damping as a ratio. A
/// disabled limit leaves its axis free; an enabled limit with equal bounds
/// locks it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericSettings {
    pub linear_lower: Vec3,
    pub linear_upper: Vec3,
    pub linear_limited: [bool; 3],
    pub angular_lower: Vec3,
    pub angular_upper: Vec3,
    pub angular_limited: [bool; 3],
    pub linear_stiffness: Vec3,
    pub angular_stiffness: Vec3,
    pub linear_damping: Vec3,
    pub angular_damping: Vec3,
    pub linear_spring: [bool; 3],
    pub angular_spring: [bool; 3],
    /// Spring rest positions in solver space: LinX..LinZ in physics units,
    /// then AngX..AngZ.
    pub equilibrium: [f32; 6],
    pub angular_motor_velocity: Vec3,
    pub angular_motor_max_torque: Vec3,
    pub angular_motor: [bool; 3],
}

impl Default for GenericSettings {
    fn default() -> Self {
        Self {
            linear_lower: Vec3::ZERO,
            linear_upper: Vec3::ZERO,
            linear_limited: [true; 3],
            angular_lower: Vec3::ZERO,
            angular_upper: Vec3::ZERO,
            angular_limited: [false; 3],
            linear_stiffness: Vec3::ZERO,
            angular_stiffness: Vec3::ZERO,
            linear_damping: Vec3::ZERO,
            angular_damping: Vec3::ZERO,
            linear_spring: [false; 3],
            angular_spring: [false; 3],
            equilibrium: [0.0; 6],
            angular_motor_velocity: Vec3::ZERO,
            angular_motor_max_torque: Vec3::ZERO,
            angular_motor: [false; 3],
        }
    }
}

/// Spring constant `k = m·(2πf)²`.
pub fn spring_stiffness(mass: f32, frequency: f32) -> f32 {
    let omega = TAU * frequency;
    mass * omega * omega
}

/// Damping coefficient `c = 2ζ·m·ω` for damping ratio `ζ`.
pub fn spring_damping(mass: f32, frequency: f32, ratio: f32) -> f32 {
    2.0 * ratio * mass * TAU * frequency
}

impl GenericSettings {
    pub(crate) fn apply(&self, joint: &mut GenericJoint, ctx: &JointContext) {
        for i in 0..3 {
            if self.linear_limited[i] {
                apply_limit(
                    joint,
                    LINEAR[i],
                    to_physics(self.linear_lower[i]),
                    to_physics(self.linear_upper[i]),
                );
            }
            if self.angular_limited[i] {
                let [lower, upper] =
                    solver_angular_limits(self.angular_lower[i], self.angular_upper[i]);
                apply_limit(joint, ANGULAR[i], lower, upper);
            }
        }

        let springs = LINEAR
            .iter()
            .zip(self.linear_spring)
            .zip(self.linear_stiffness.to_array().into_iter().zip(self.linear_damping.to_array()))
            .chain(
                ANGULAR
                    .iter()
                    .zip(self.angular_spring)
                    .zip(self.angular_stiffness.to_array().into_iter().zip(self.angular_damping.to_array())),
            );
        if ctx.spring_mass.is_finite() {
            for (i, ((&axis, enabled), (frequency, ratio))) in springs.enumerate() {
                if !enabled || frequency <= 0.0 {
                    continue;
                }
                joint.set_motor_model(axis, MotorModel::ForceBased);
                joint.set_motor(
                    axis,
                    self.equilibrium[i],
                    0.0,
                    spring_stiffness(ctx.spring_mass, frequency),
                    spring_damping(ctx.spring_mass, frequency, ratio),
                );
            }
        }

        for i in 0..3 {
            if self.angular_motor[i] {
                joint.set_motor_velocity(ANGULAR[i], -self.angular_motor_velocity[i], 1.0);
                joint.set_motor_max_force(ANGULAR[i], to_physics_sq(self.angular_motor_max_torque[i]));
            }
        }
    }
}

impl ConstraintMut<'_> {
    fn update_generic(&mut self, f: impl FnOnce(&mut GenericSettings)) {
        if let Some(settings) = self.generic() {
            f(settings);
            self.sync();
        }
    }

    fn update_spring(&mut self, f: impl FnOnce(&mut GenericSettings)) {
        if self.inner.kind != ConstraintKind::GenericSpring {
            tracing::warn!(constraint = %self.handle, "springs need a generic spring constraint");
            return;
        }
        self.update_generic(f);
    }

    // ---- Limits ----

    pub fn set_linear_lower_limit(&mut self, lower: Vec3) {
        self.update_generic(|s| s.linear_lower = lower);
    }

    pub fn set_linear_upper_limit(&mut self, upper: Vec3) {
        self.update_generic(|s| s.linear_upper = upper);
    }

    pub fn enable_linear_limits(&mut self, x: bool, y: bool, z: bool) {
        self.update_generic(|s| s.linear_limited = [x, y, z]);
    }

    pub fn set_angular_lower_limit(&mut self, lower: Vec3) {
        self.update_generic(|s| s.angular_lower = lower);
    }

    pub fn set_angular_upper_limit(&mut self, upper: Vec3) {
        self.update_generic(|s| s.angular_upper = upper);
    }

    pub fn enable_angular_limits(&mut self, x: bool, y: bool, z: bool) {
        self.update_generic(|s| s.angular_limited = [x, y, z]);
    }

    // ---- Springs ----

    /// Per-axis spring frequency in Hz; a positive value enables the
    /// spring on that axis.
    pub fn set_linear_stiffness(&mut self, frequency: Vec3) {
        self.update_spring(|s| {
            s.linear_stiffness = frequency;
            s.linear_spring = frequency.cmpgt(Vec3::ZERO).into();
        });
    }

    pub fn set_angular_stiffness(&mut self, frequency: Vec3) {
        self.update_spring(|s| {
            s.angular_stiffness = frequency;
            s.angular_spring = frequency.cmpgt(Vec3::ZERO).into();
        });
    }

    /// Per-axis damping ratio.
    pub fn set_linear_damping(&mut self, ratio: Vec3) {
        self.update_spring(|s| s.linear_damping = ratio);
    }

    pub fn set_angular_damping(&mut self, ratio: Vec3) {
        self.update_spring(|s| s.angular_damping = ratio);
    }

    pub fn enable_linear_spring(&mut self, x: bool, y: bool, z: bool) {
        self.update_spring(|s| s.linear_spring = [x, y, z]);
    }

    pub fn enable_angular_spring(&mut self, x: bool, y: bool, z: bool) {
        self.update_spring(|s| s.angular_spring = [x, y, z]);
    }

    /// Make the current relative pose the springs' rest position.
    pub fn set_equilibrium_point(&mut self) {
        let rel = self.inner.relative_pose(self.poses);
        let angles = rel.rotation.scaled_axis();
        let t = rel.translation.vector;
        self.update_spring(|s| s.equilibrium = [t.x, t.y, t.z, angles.x, angles.y, angles.z]);
    }

    // ---- Motors ----

    /// Angular velocity motor per axis (rad/s) with a torque cap.
    pub fn set_angular_motor(&mut self, target_velocity: Vec3, max_torque: Vec3) {
        self.update_generic(|s| {
            s.angular_motor_velocity = target_velocity;
            s.angular_motor_max_torque = max_torque;
        });
    }

    pub fn enable_angular_motor(&mut self, x: bool, y: bool, z: bool) {
        self.update_generic(|s| s.angular_motor = [x, y, z]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::tests::two_body;
    use crate::constraint::{axis_mask, ConstraintKind};
    use approx::assert_relative_eq;
    use rapier3d::prelude::JointAxesMask;

    // ---------------------------------------------------------------------------
    // Spring formulas
    // ---------------------------------------------------------------------------

    #[test]
    fn stiffness_from_frequency() {
        // 1 Hz on 1 kg: (2π)².
        assert_relative_eq!(spring_stiffness(1.0, 1.0), TAU * TAU, max_relative = 1e-6);
        assert_relative_eq!(spring_stiffness(4.0, 0.5), 4.0 * (TAU * 0.5).powi(2), max_relative = 1e-6);
        assert_relative_eq!(spring_stiffness(3.0, 0.0), 0.0);
    }

    #[test]
    fn critical_damping() {
        // ζ = 1 gives c = 2·sqrt(k·m).
        let (m, f) = (2.0, 3.0);
        let k = spring_stiffness(m, f);
        assert_relative_eq!(spring_damping(m, f, 1.0), 2.0 * (k * m).sqrt(), max_relative = 1e-5);
    }

    // ---------------------------------------------------------------------------
    // Joint building
    // ---------------------------------------------------------------------------

    #[test]
    fn default_generic_locks_translation_and_frees_rotation() {
        let c = two_body(ConstraintKind::Generic6Dof);
        let joint = c.build_joint();
        assert!(joint.locked_axes.contains(JointAxesMask::LIN_AXES));
        assert!(!joint.locked_axes.intersects(JointAxesMask::ANG_AXES));
        assert!(!joint.limit_axes.intersects(JointAxesMask::ANG_AXES));
    }

    #[test]
    fn limits_convert_units_and_angle_convention() {
        let mut c = two_body(ConstraintKind::Generic6Dof);
        let s = GenericSettings {
            linear_lower: Vec3::new(-10.0, 0.0, 0.0),
            linear_upper: Vec3::new(30.0, 0.0, 0.0),
            linear_limited: [true, false, true],
            angular_lower: Vec3::new(-0.5, 0.0, 0.0),
            angular_upper: Vec3::new(0.25, 0.0, 0.0),
            angular_limited: [true, false, false],
            ..GenericSettings::default()
        };
        c.settings = crate::constraint::Settings::Generic(s);
        let joint = c.build_joint();

        let lin = joint.limits(JointAxis::LinX).unwrap();
        assert_relative_eq!(lin.min, -0.1, max_relative = 1e-5);
        assert_relative_eq!(lin.max, 0.3, max_relative = 1e-5);
        assert!(!joint.locked_axes.contains(axis_mask(JointAxis::LinY)));
        assert!(joint.locked_axes.contains(axis_mask(JointAxis::LinZ)));

        let ang = joint.limits(JointAxis::AngX).unwrap();
        assert_relative_eq!(ang.min, -0.25);
        assert_relative_eq!(ang.max, 0.5);
    }

    #[test]
    fn spring_uses_lighter_mass() {
        let mut c = two_body(ConstraintKind::GenericSpring);
        c.settings = crate::constraint::Settings::Generic(GenericSettings {
            linear_limited: [false; 3],
            linear_stiffness: Vec3::new(2.0, 0.0, 0.0),
            linear_spring: [true, false, false],
            ..GenericSettings::default()
        });
        let joint = c.build_joint();
        let motor = joint.motor(JointAxis::LinX).unwrap();
        assert_relative_eq!(motor.stiffness, spring_stiffness(2.0, 2.0), max_relative = 1e-5);
        assert!(joint.motor_axes.contains(axis_mask(JointAxis::LinX)));
        assert!(!joint.motor_axes.contains(axis_mask(JointAxis::LinY)));
    }
}
