//! Cone-and-twist limited ball joint.

use std::f32::consts::PI;

use rapier3d::prelude::{GenericJoint, JointAxis};

use super::{apply_limit, ConstraintMut, JointContext};

/// Half-angle spans in radians. A span of π or more leaves its axis free.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingTwistSettings {
    pub swing1_span: f32,
    pub swing2_span: f32,
    pub twist_span: f32,
}

impl Default for SwingTwistSettings {
    fn default() -> Self {
        Self {
            swing1_span: PI,
            swing2_span: PI,
            twist_span: PI,
        }
    }
}

impl SwingTwistSettings {
    pub(crate) fn apply(&self, joint: &mut GenericJoint, _ctx: &JointContext) {
        for (axis, span) in [
            (JointAxis::AngX, self.twist_span),
            (JointAxis::AngY, self.swing1_span),
            (JointAxis::AngZ, self.swing2_span),
        ] {
            if span < PI {
                let span = span.max(0.0);
                apply_limit(joint, axis, -span, span);
            }
        }
    }
}

impl ConstraintMut<'_> {
    pub fn set_swing1_span(&mut self, span: f32) {
        if let Some(s) = self.swing_twist() {
            s.swing1_span = span;
            self.sync();
        }
    }

    pub fn set_swing2_span(&mut self, span: f32) {
        if let Some(s) = self.swing_twist() {
            s.swing2_span = span;
            self.sync();
        }
    }

    pub fn set_twist_span(&mut self, span: f32) {
        if let Some(s) = self.swing_twist() {
            s.twist_span = span;
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
    fn spans_map_to_twist_and_swing_axes() {
        let mut c = two_body(ConstraintKind::SwingTwist);
        c.settings = Settings::SwingTwist(SwingTwistSettings {
            swing1_span: 0.5,
            swing2_span: 0.25,
            twist_span: PI,
        });
        let joint = c.build_joint();
        assert!(!joint.limit_axes.contains(axis_mask(JointAxis::AngX)));
        assert_relative_eq!(joint.limits(JointAxis::AngY).unwrap().max, 0.5);
        assert_relative_eq!(joint.limits(JointAxis::AngZ).unwrap().min, -0.25);
    }

    #[test]
    fn zero_span_locks_the_axis() {
        let mut c = two_body(ConstraintKind::SwingTwist);
        c.settings = Settings::SwingTwist(SwingTwistSettings {
            twist_span: 0.0,
            ..SwingTwistSettings::default()
        });
        assert!(c.build_joint().locked_axes.contains(axis_mask(JointAxis::AngX)));
    }
}
