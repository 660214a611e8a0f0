//! Joints between one or two rigid bodies.
//!
//! Every constraint keeps its own description (frames, per-kind settings)
//! and rebuilds a rapier [`GenericJoint`] from it whenever a setting
//! changes. The joint handed to the backend is therefore always a pure
//! function of the stored state.
//!
//! Frames are relative to each body's centre of mass, in physics units. A
//! side without a body is attached to the world's fixed ground body; its
//! frame is the other side's frame expressed in world space at creation.

pub mod generic;
pub mod hinge;
pub mod point;
pub mod slider;
pub mod swing_twist;

use glam::{Mat3, Vec3};
use rapier3d::prelude::{
    GenericJoint, GenericJointBuilder, ImpulseJointHandle, Isometry, JointAxesMask, JointAxis,
    Real,
};

use crate::handles::{CollidableHandle, ConstraintHandle, WorldHandle};
use crate::units::{isometry_to_physics, isometry_to_system, to_physics};
use crate::world::backend::WorldBackend;

pub use generic::GenericSettings;
pub use hinge::HingeSettings;
pub use point::PointSettings;
pub use slider::SliderSettings;
pub use swing_twist::SwingTwistSettings;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Joint variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Generic6Dof,
    GenericSpring,
    Hinge,
    Slider,
    Point2Point,
    SwingTwist,
}

/// Creation parameters of a constraint.
///
/// Anchors and axes are in each body's local space (system units, relative
/// to the body's nominal origin). When only one body is given the joint
/// ties that body to the world.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDesc {
    pub kind: ConstraintKind,
    pub body_a: Option<CollidableHandle>,
    pub anchor_in_a: Vec3,
    pub axis_in_a: Mat3,
    pub body_b: Option<CollidableHandle>,
    pub anchor_in_b: Vec3,
    pub axis_in_b: Mat3,
    /// Whether the connected bodies still collide with each other.
    pub collision: bool,
    /// Linear impulse that breaks the joint; infinite never breaks.
    pub break_impulse: f32,
}

impl ConstraintDesc {
    pub fn new(
        kind: ConstraintKind,
        body_a: Option<CollidableHandle>,
        body_b: Option<CollidableHandle>,
    ) -> Self {
        Self {
            kind,
            body_a,
            anchor_in_a: Vec3::ZERO,
            axis_in_a: Mat3::IDENTITY,
            body_b,
            anchor_in_b: Vec3::ZERO,
            axis_in_b: Mat3::IDENTITY,
            collision: false,
            break_impulse: f32::INFINITY,
        }
    }

    #[must_use]
    pub fn anchor_a(mut self, anchor: Vec3, axis: Mat3) -> Self {
        self.anchor_in_a = anchor;
        self.axis_in_a = axis;
        self
    }

    #[must_use]
    pub fn anchor_b(mut self, anchor: Vec3, axis: Mat3) -> Self {
        self.anchor_in_b = anchor;
        self.axis_in_b = axis;
        self
    }

    #[must_use]
    pub fn with_collision(mut self, collision: bool) -> Self {
        self.collision = collision;
        self
    }

    #[must_use]
    pub fn with_break_impulse(mut self, impulse: f32) -> Self {
        self.break_impulse = impulse;
        self
    }
}

/// What a constraint needs to know about a connected body at creation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyInfo {
    pub(crate) centroid: Vec3,
    /// Zero for static bodies.
    pub(crate) mass: f32,
    /// Centre-of-mass pose, physics units.
    pub(crate) pose: Isometry<Real>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-kind user settings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Settings {
    Generic(GenericSettings),
    Hinge(HingeSettings),
    Slider(SliderSettings),
    Point(PointSettings),
    SwingTwist(SwingTwistSettings),
}

/// Values a settings block needs when it writes itself into a joint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JointContext {
    /// Substep length of the owning world, seconds.
    pub(crate) dt: Real,
    /// Lighter of the two connected masses; infinite when both are fixed.
    pub(crate) spring_mass: f32,
}

pub(crate) fn axis_mask(axis: JointAxis) -> JointAxesMask {
    JointAxesMask::from_bits_truncate(1 << axis as u8)
}

/// Free, locked or limited, from a solver-space pair. An inverted pair is
/// free and an empty range locks the axis.
pub(crate) fn apply_limit(joint: &mut GenericJoint, axis: JointAxis, lower: Real, upper: Real) {
    if lower > upper {
        joint.limit_axes.remove(axis_mask(axis));
    } else if lower == upper {
        joint.locked_axes.insert(axis_mask(axis));
    } else {
        joint.set_limits(axis, [lower, upper]);
    }
}

/// User angular bounds as the solver expects them: negated and swapped.
pub(crate) fn solver_angular_limits(lower: f32, upper: f32) -> [f32; 2] {
    [-upper, -lower]
}

// ---------------------------------------------------------------------------
// Constraint
// ---------------------------------------------------------------------------

/// A joint and everything needed to rebuild it.
#[derive(Debug)]
pub struct Constraint {
    pub(crate) kind: ConstraintKind,
    pub(crate) body_a: Option<CollidableHandle>,
    pub(crate) body_b: Option<CollidableHandle>,
    pub(crate) frame_a: Isometry<Real>,
    pub(crate) frame_b: Isometry<Real>,
    pub(crate) centroid_a: Vec3,
    pub(crate) centroid_b: Vec3,
    pub(crate) mass_a: f32,
    pub(crate) mass_b: f32,
    pub(crate) collision: bool,
    pub(crate) break_impulse: f32,
    pub(crate) enabled: bool,
    pub(crate) broken: bool,
    pub(crate) dt: Real,
    pub(crate) world: Option<WorldHandle>,
    pub(crate) joint: Option<ImpulseJointHandle>,
    pub(crate) settings: Settings,
}

impl Constraint {
    /// Returns `None` when neither side has a body.
    pub(crate) fn new(desc: &ConstraintDesc, a: Option<BodyInfo>, b: Option<BodyInfo>, dt: Real) -> Option<Self> {
        let basis = frame_basis(desc.kind);
        let local = |info: &BodyInfo, anchor: Vec3, axis: Mat3| {
            isometry_to_physics(anchor - info.centroid, axis * basis)
        };
        let (frame_a, frame_b) = match (a.as_ref(), b.as_ref()) {
            (Some(ia), Some(ib)) => (
                local(ia, desc.anchor_in_a, desc.axis_in_a),
                local(ib, desc.anchor_in_b, desc.axis_in_b),
            ),
            (Some(ia), None) => {
                let frame = local(ia, desc.anchor_in_a, desc.axis_in_a);
                (frame, ia.pose * frame)
            }
            (None, Some(ib)) => {
                let frame = local(ib, desc.anchor_in_b, desc.axis_in_b);
                (ib.pose * frame, frame)
            }
            (None, None) => return None,
        };
        let settings = match desc.kind {
            ConstraintKind::Generic6Dof | ConstraintKind::GenericSpring => {
                Settings::Generic(GenericSettings::default())
            }
            ConstraintKind::Hinge => Settings::Hinge(HingeSettings::default()),
            ConstraintKind::Slider => Settings::Slider(SliderSettings::default()),
            ConstraintKind::Point2Point => Settings::Point(PointSettings::default()),
            ConstraintKind::SwingTwist => Settings::SwingTwist(SwingTwistSettings::default()),
        };
        Some(Self {
            kind: desc.kind,
            body_a: desc.body_a,
            body_b: desc.body_b,
            frame_a,
            frame_b,
            centroid_a: a.map_or(Vec3::ZERO, |i| i.centroid),
            centroid_b: b.map_or(Vec3::ZERO, |i| i.centroid),
            mass_a: a.map_or(0.0, |i| i.mass),
            mass_b: b.map_or(0.0, |i| i.mass),
            collision: desc.collision,
            break_impulse: desc.break_impulse,
            enabled: true,
            broken: false,
            dt,
            world: None,
            joint: None,
            settings,
        })
    }

    /// Lighter connected mass; static or missing bodies count as infinite.
    pub(crate) fn spring_mass(&self) -> f32 {
        let finite = |m: f32| if m > 0.0 { m } else { f32::INFINITY };
        finite(self.mass_a).min(finite(self.mass_b))
    }

    /// Rebuild the backend joint from the stored state.
    pub(crate) fn build_joint(&self) -> GenericJoint {
        let mut joint = GenericJointBuilder::new(structural_locks(self.kind))
            .local_frame1(self.frame_a)
            .local_frame2(self.frame_b)
            .contacts_enabled(self.collision)
            .build();
        let ctx = JointContext {
            dt: self.dt,
            spring_mass: self.spring_mass(),
        };
        match &self.settings {
            Settings::Generic(s) => s.apply(&mut joint, &ctx),
            Settings::Hinge(s) => s.apply(&mut joint, &ctx),
            Settings::Slider(s) => s.apply(&mut joint, &ctx),
            Settings::Point(s) => s.apply(&mut joint, &ctx),
            Settings::SwingTwist(s) => s.apply(&mut joint, &ctx),
        }
        joint.set_enabled(self.enabled && !self.broken);
        joint
    }

    /// Disable the joint once its linear impulse exceeds the threshold.
    /// Returns true when it broke during this call.
    pub(crate) fn check_break(&mut self, handle: ConstraintHandle, backend: &mut WorldBackend) -> bool {
        if self.broken || !self.enabled || !self.break_impulse.is_finite() {
            return false;
        }
        let Some(joint) = self.joint.and_then(|h| backend.impulse_joints.get_mut(h)) else {
            return false;
        };
        let applied = joint.impulses.fixed_rows::<3>(0).norm();
        if applied <= to_physics(self.break_impulse) {
            return false;
        }
        self.broken = true;
        joint.data.set_enabled(false);
        tracing::debug!(constraint = %handle, applied, "constraint broke");
        true
    }

    /// Relative pose of frame B in frame A, from the connected bodies'
    /// centre-of-mass poses (`None` is the world).
    pub(crate) fn relative_pose(&self, poses: [Option<Isometry<Real>>; 2]) -> Isometry<Real> {
        let world_a = poses[0].unwrap_or_else(Isometry::identity) * self.frame_a;
        let world_b = poses[1].unwrap_or_else(Isometry::identity) * self.frame_b;
        world_a.inverse() * world_b
    }
}

/// Extra rotation from the user frame to the solver frame.
fn frame_basis(kind: ConstraintKind) -> Mat3 {
    match kind {
        // The hinge turns about the user frame's Z; the solver's free
        // angular axis is X.
        ConstraintKind::Hinge => Mat3::from_cols(Vec3::Z, Vec3::X, Vec3::Y),
        _ => Mat3::IDENTITY,
    }
}

fn structural_locks(kind: ConstraintKind) -> JointAxesMask {
    match kind {
        ConstraintKind::Generic6Dof | ConstraintKind::GenericSpring => JointAxesMask::empty(),
        ConstraintKind::Hinge => JointAxesMask::LOCKED_REVOLUTE_AXES,
        ConstraintKind::Slider => {
            JointAxesMask::LIN_Y | JointAxesMask::LIN_Z | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z
        }
        ConstraintKind::Point2Point | ConstraintKind::SwingTwist => JointAxesMask::LIN_AXES,
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read-only view of a constraint.
pub struct ConstraintRef<'a> {
    pub(crate) handle: ConstraintHandle,
    pub(crate) inner: &'a Constraint,
    /// Centre-of-mass poses of body A and body B.
    pub(crate) poses: [Option<Isometry<Real>>; 2],
}

impl ConstraintRef<'_> {
    pub fn handle(&self) -> ConstraintHandle {
        self.handle
    }

    pub fn kind(&self) -> ConstraintKind {
        self.inner.kind
    }

    pub fn body_a(&self) -> Option<CollidableHandle> {
        self.inner.body_a
    }

    pub fn body_b(&self) -> Option<CollidableHandle> {
        self.inner.body_b
    }

    pub fn world(&self) -> Option<WorldHandle> {
        self.inner.world
    }

    pub fn is_collision_enabled(&self) -> bool {
        self.inner.collision
    }

    pub fn break_impulse(&self) -> f32 {
        self.inner.break_impulse
    }

    pub fn is_broken(&self) -> bool {
        self.inner.broken
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled && !self.inner.broken
    }

    /// Frame of body A relative to its centre of mass, system units.
    pub fn frame_a(&self) -> (Vec3, Mat3) {
        isometry_to_system(&self.inner.frame_a)
    }

    pub fn frame_b(&self) -> (Vec3, Mat3) {
        isometry_to_system(&self.inner.frame_b)
    }

    /// Current rotation of a hinge about its axis, radians.
    pub fn hinge_angle(&self) -> Option<f32> {
        (self.inner.kind == ConstraintKind::Hinge)
            .then(|| hinge::angle(&self.inner.relative_pose(self.poses)))
    }

    /// Current distance between the two ball-joint anchors, system units.
    pub fn anchor_separation(&self) -> f32 {
        crate::units::to_system(self.inner.relative_pose(self.poses).translation.vector.norm())
    }

    pub fn generic_settings(&self) -> Option<&GenericSettings> {
        match &self.inner.settings {
            Settings::Generic(s) => Some(s),
            _ => None,
        }
    }

    pub fn hinge_settings(&self) -> Option<&HingeSettings> {
        match &self.inner.settings {
            Settings::Hinge(s) => Some(s),
            _ => None,
        }
    }

    pub fn slider_settings(&self) -> Option<&SliderSettings> {
        match &self.inner.settings {
            Settings::Slider(s) => Some(s),
            _ => None,
        }
    }

    pub fn point_settings(&self) -> Option<&PointSettings> {
        match &self.inner.settings {
            Settings::Point(s) => Some(s),
            _ => None,
        }
    }

    pub fn swing_twist_settings(&self) -> Option<&SwingTwistSettings> {
        match &self.inner.settings {
            Settings::SwingTwist(s) => Some(s),
            _ => None,
        }
    }
}

/// Mutable view of a constraint. Every setter pushes the rebuilt joint to
/// the backend when the constraint is in a world.
pub struct ConstraintMut<'a> {
    pub(crate) handle: ConstraintHandle,
    pub(crate) inner: &'a mut Constraint,
    pub(crate) backend: Option<&'a mut WorldBackend>,
    pub(crate) poses: [Option<Isometry<Real>>; 2],
}

impl ConstraintMut<'_> {
    pub fn view(&self) -> ConstraintRef<'_> {
        ConstraintRef {
            handle: self.handle,
            inner: self.inner,
            poses: self.poses,
        }
    }

    pub fn handle(&self) -> ConstraintHandle {
        self.handle
    }

    pub fn kind(&self) -> ConstraintKind {
        self.inner.kind
    }

    /// Push the rebuilt joint to the backend and wake both bodies.
    pub(crate) fn sync(&mut self) {
        let (Some(handle), Some(backend)) = (self.inner.joint, self.backend.as_deref_mut()) else {
            return;
        };
        let data = self.inner.build_joint();
        let Some(joint) = backend.impulse_joints.get_mut(handle) else {
            return;
        };
        joint.data = data;
        let bodies = [joint.body1, joint.body2];
        for body in bodies {
            if let Some(rb) = backend.bodies.get_mut(body) {
                rb.wake_up(true);
            }
        }
    }

    /// Takes effect on the next insertion into a world.
    pub fn enable_collision(&mut self, enabled: bool) {
        if self.inner.joint.is_some() && self.inner.collision != enabled {
            tracing::debug!(
                constraint = %self.handle,
                enabled,
                "collision flag changed while in a world; re-add to apply"
            );
        }
        self.inner.collision = enabled;
    }

    pub fn set_break_impulse(&mut self, impulse: f32) {
        self.inner.break_impulse = impulse.max(0.0);
    }

    /// Re-enabling also repairs a broken joint.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.inner.enabled = enabled;
        if enabled {
            self.inner.broken = false;
        }
        self.sync();
    }

    pub(crate) fn generic(&mut self) -> Option<&mut GenericSettings> {
        match &mut self.inner.settings {
            Settings::Generic(s) => Some(s),
            _ => {
                tracing::warn!(constraint = %self.handle, kind = ?self.inner.kind, "not a generic constraint");
                None
            }
        }
    }

    pub(crate) fn hinge(&mut self) -> Option<&mut HingeSettings> {
        match &mut self.inner.settings {
            Settings::Hinge(s) => Some(s),
            _ => {
                tracing::warn!(constraint = %self.handle, kind = ?self.inner.kind, "not a hinge");
                None
            }
        }
    }

    pub(crate) fn slider(&mut self) -> Option<&mut SliderSettings> {
        match &mut self.inner.settings {
            Settings::Slider(s) => Some(s),
            _ => {
                tracing::warn!(constraint = %self.handle, kind = ?self.inner.kind, "not a slider");
                None
            }
        }
    }

    pub(crate) fn point(&mut self) -> Option<&mut PointSettings> {
        match &mut self.inner.settings {
            Settings::Point(s) => Some(s),
            _ => {
                tracing::warn!(constraint = %self.handle, kind = ?self.inner.kind, "not a point-to-point constraint");
                None
            }
        }
    }

    pub(crate) fn swing_twist(&mut self) -> Option<&mut SwingTwistSettings> {
        match &mut self.inner.settings {
            Settings::SwingTwist(s) => Some(s),
            _ => {
                tracing::warn!(constraint = %self.handle, kind = ?self.inner.kind, "not a swing-twist constraint");
                None
            }
        }
    }

    /// Replace body A's frame, given in its local space (world space when
    /// A is the world).
    pub fn set_frame_a(&mut self, anchor: Vec3, axis: Mat3) {
        let anchor = match self.inner.body_a {
            Some(_) => anchor - self.inner.centroid_a,
            None => anchor,
        };
        self.inner.frame_a = isometry_to_physics(anchor, axis * frame_basis(self.inner.kind));
        self.sync();
    }

    /// Replace body B's frame, given in its local space (world space when
    /// B is the world).
    pub fn set_frame_b(&mut self, anchor: Vec3, axis: Mat3) {
        let anchor = match self.inner.body_b {
            Some(_) => anchor - self.inner.centroid_b,
            None => anchor,
        };
        self.inner.frame_b = isometry_to_physics(anchor, axis * frame_basis(self.inner.kind));
        self.sync();
    }
}
