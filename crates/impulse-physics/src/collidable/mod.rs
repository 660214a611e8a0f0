//! Collidable objects: rigid bodies, characters, debris, sensors and soft
//! bodies.
//!
//! A [`Collidable`] is owned by the [`PhysicsSystem`](crate::PhysicsSystem)
//! and only referenced by a world while added. Rigid variants keep their
//! rapier body in a [`BodySlot`]: boxed while detached, moved into the
//! world's body set while attached. Colliders are rebuilt from the stored
//! shape parts on every insertion.
//!
//! Callers work with the [`CollidableRef`] / [`CollidableMut`] views, which
//! pair the collidable with its world's backend so every accessor can read
//! or write the live rapier state and convert units on the way.

pub mod character;
pub mod rigid_body;
pub mod sensor;
pub mod soft_body;

use std::sync::Arc;

use glam::{Mat3, Vec3};
use impulse_core::mesh::Bounds;
use impulse_core::transform::EntityTransform;
use rapier3d::prelude::{
    ColliderHandle, Isometry, Real, RigidBody, RigidBodyHandle, SharedShape,
};

use crate::filter::FilterClass;
use crate::handles::{ColliderId, CollidableHandle, WorldHandle};
use crate::listener::CollisionListener;
use crate::units::{self, isometry_to_physics, isometry_to_system};
use crate::world::backend::WorldBackend;

pub use character::{CharacterDesc, CharacterState};
pub use soft_body::{SoftBody, SoftBodyDesc};

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollidableKind {
    RigidBody,
    Character,
    Debris,
    Sensor,
    SoftBody,
}

/// One collider placed in the collidable's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeDesc {
    pub local_origin: Vec3,
    pub local_axis: Mat3,
    pub collider: ColliderId,
}

impl ShapeDesc {
    pub fn new(collider: ColliderId) -> Self {
        Self {
            local_origin: Vec3::ZERO,
            local_axis: Mat3::IDENTITY,
            collider,
        }
    }

    #[must_use]
    pub fn at(mut self, local_origin: Vec3, local_axis: Mat3) -> Self {
        self.local_origin = local_origin;
        self.local_axis = local_axis;
        self
    }
}

/// Everything needed to create a collidable. Lengths are in system units.
#[derive(Debug, Clone, PartialEq)]
pub struct CollidableDesc {
    pub kind: CollidableKind,
    pub shapes: Vec<ShapeDesc>,
    pub origin: Vec3,
    pub axis: Mat3,
    pub kinematic: bool,
    pub ccd: bool,
    /// Zero makes a static body.
    pub mass: f32,
    pub restitution: f32,
    pub friction: f32,
    pub rolling_friction: f32,
    pub spinning_friction: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// User layer, `0..MAX_FILTER_LAYERS`.
    pub collision_filter_bit: u32,
    pub owner: Option<u64>,
    pub character: CharacterDesc,
    pub soft_body: Option<SoftBodyDesc>,
}

impl Default for CollidableDesc {
    fn default() -> Self {
        Self {
            kind: CollidableKind::RigidBody,
            shapes: Vec::new(),
            origin: Vec3::ZERO,
            axis: Mat3::IDENTITY,
            kinematic: false,
            ccd: false,
            mass: 0.0,
            restitution: 0.0,
            friction: 0.5,
            rolling_friction: 0.0,
            spinning_friction: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            collision_filter_bit: 0,
            owner: None,
            character: CharacterDesc::default(),
            soft_body: None,
        }
    }
}

impl CollidableDesc {
    pub fn rigid_body(shapes: Vec<ShapeDesc>, mass: f32) -> Self {
        Self {
            shapes,
            mass,
            ..Self::default()
        }
    }

    pub fn character(shape: ShapeDesc, character: CharacterDesc) -> Self {
        Self {
            kind: CollidableKind::Character,
            shapes: vec![shape],
            mass: 1.0,
            character,
            ..Self::default()
        }
    }

    pub fn debris(shapes: Vec<ShapeDesc>, mass: f32) -> Self {
        Self {
            kind: CollidableKind::Debris,
            shapes,
            mass,
            ..Self::default()
        }
    }

    pub fn sensor(shapes: Vec<ShapeDesc>) -> Self {
        Self {
            kind: CollidableKind::Sensor,
            shapes,
            ..Self::default()
        }
    }

    pub fn soft_body(soft_body: SoftBodyDesc, mass: f32) -> Self {
        Self {
            kind: CollidableKind::SoftBody,
            mass,
            soft_body: Some(soft_body),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, origin: Vec3, axis: Mat3) -> Self {
        self.origin = origin;
        self.axis = axis;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }
}

/// Contact material shared by every collider of a collidable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub rolling_friction: f32,
    pub spinning_friction: f32,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// One backend collider recipe: a shared shape at a fixed offset from the
/// body's centre of mass, in physics units.
#[derive(Clone)]
pub(crate) struct ShapePart {
    pub(crate) collider: ColliderId,
    pub(crate) shape: SharedShape,
    pub(crate) offset: Isometry<Real>,
    /// Per-triangle surface flags of multi-material meshes.
    pub(crate) materials: Option<Arc<[u32]>>,
}

pub(crate) enum BodySlot {
    Detached(Box<RigidBody>),
    Attached {
        handle: RigidBodyHandle,
        colliders: Vec<ColliderHandle>,
    },
}

/// Body state shared by every rapier-backed variant.
pub(crate) struct RigidState {
    pub(crate) slot: BodySlot,
    pub(crate) parts: Vec<ShapePart>,
    pub(crate) mass: f32,
    pub(crate) kinematic: bool,
    pub(crate) ccd_requested: bool,
    /// Bounding-sphere radius of the whole shape, physics units.
    pub(crate) radius: Real,
    /// Per-body gravity override, physics units.
    pub(crate) gravity: Option<Vec3>,
    pub(crate) linear_factor: Vec3,
    pub(crate) angular_factor: Vec3,
    pub(crate) character: Option<CharacterState>,
}

pub(crate) enum Body {
    Rigid(RigidState),
    Soft(SoftBody),
}

/// An object taking part in collision and dynamics.
pub struct Collidable {
    pub(crate) kind: CollidableKind,
    pub(crate) centroid: Vec3,
    pub(crate) filter_bit: u32,
    pub(crate) world: Option<WorldHandle>,
    pub(crate) owner: Option<u64>,
    pub(crate) listener: Option<Box<dyn CollisionListener>>,
    pub(crate) material: SurfaceMaterial,
    pub(crate) body: Body,
}

impl std::fmt::Debug for Collidable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collidable")
            .field("kind", &self.kind)
            .field("centroid", &self.centroid)
            .field("filter_bit", &self.filter_bit)
            .field("world", &self.world)
            .field("owner", &self.owner)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl Collidable {
    pub(crate) fn rigid(&self) -> Option<&RigidState> {
        match &self.body {
            Body::Rigid(state) => Some(state),
            Body::Soft(_) => None,
        }
    }

    pub(crate) fn rigid_mut(&mut self) -> Option<&mut RigidState> {
        match &mut self.body {
            Body::Rigid(state) => Some(state),
            Body::Soft(_) => None,
        }
    }

    pub(crate) fn soft(&self) -> Option<&SoftBody> {
        match &self.body {
            Body::Soft(body) => Some(body),
            Body::Rigid(_) => None,
        }
    }

    pub(crate) fn soft_mut(&mut self) -> Option<&mut SoftBody> {
        match &mut self.body {
            Body::Soft(body) => Some(body),
            Body::Rigid(_) => None,
        }
    }

    /// Backend body handle while attached.
    pub(crate) fn body_handle(&self) -> Option<RigidBodyHandle> {
        match self.rigid()?.slot {
            BodySlot::Attached { handle, .. } => Some(handle),
            BodySlot::Detached(_) => None,
        }
    }

    pub(crate) fn collider_handles(&self) -> &[ColliderHandle] {
        match self.rigid().map(|r| &r.slot) {
            Some(BodySlot::Attached { colliders, .. }) => colliders,
            _ => &[],
        }
    }

    pub(crate) fn rigid_body<'a>(&'a self, backend: Option<&'a WorldBackend>) -> Option<&'a RigidBody> {
        match &self.rigid()?.slot {
            BodySlot::Detached(body) => Some(body),
            BodySlot::Attached { handle, .. } => backend?.bodies.get(*handle),
        }
    }

    pub(crate) fn rigid_body_mut<'a>(
        &'a mut self,
        backend: Option<&'a mut WorldBackend>,
    ) -> Option<&'a mut RigidBody> {
        match &mut self.rigid_mut()?.slot {
            BodySlot::Detached(body) => Some(body),
            BodySlot::Attached { handle, .. } => backend?.bodies.get_mut(*handle),
        }
    }

    /// Broadphase class derived from kind and body type.
    pub(crate) fn filter_class(&self) -> FilterClass {
        match self.kind {
            CollidableKind::Character => FilterClass::Character,
            CollidableKind::Debris => FilterClass::Debris,
            CollidableKind::Sensor => FilterClass::Sensor,
            CollidableKind::SoftBody => FilterClass::SoftBody,
            CollidableKind::RigidBody => match self.rigid() {
                Some(r) if r.kinematic => FilterClass::Kinematic,
                Some(r) if r.mass <= 0.0 => FilterClass::Static,
                _ => FilterClass::Dynamic,
            },
        }
    }

    /// Kinematic bodies report the pose they will reach next step.
    fn com_pose(&self, backend: Option<&WorldBackend>) -> Option<Isometry<Real>> {
        let rb = self.rigid_body(backend)?;
        Some(if rb.is_kinematic() {
            *rb.next_position()
        } else {
            *rb.position()
        })
    }

    fn origin(&self, backend: Option<&WorldBackend>) -> Vec3 {
        match &self.body {
            Body::Soft(body) => body.center(),
            Body::Rigid(_) => self.com_pose(backend).map_or(Vec3::ZERO, |pos| {
                let (com, axis) = isometry_to_system(&pos);
                com - axis * self.centroid
            }),
        }
    }

    fn axis(&self, backend: Option<&WorldBackend>) -> Mat3 {
        self.com_pose(backend)
            .map_or(Mat3::IDENTITY, |pos| isometry_to_system(&pos).1)
    }

    fn set_origin_axis(&mut self, backend: Option<&mut WorldBackend>, origin: Vec3, axis: Mat3) {
        let attached = self.body_handle().is_some();
        if let Some(body) = self.soft_mut() {
            let offset = origin - body.center();
            body.translate(offset);
            return;
        }
        let com = isometry_to_physics(origin + axis * self.centroid, axis);
        let Some(rb) = self.rigid_body_mut(backend) else {
            return;
        };
        if attached && rb.is_kinematic() {
            rb.set_next_kinematic_position(com);
        } else {
            rb.set_position(com, true);
        }
    }

    fn aabb(&self, backend: Option<&WorldBackend>) -> Bounds {
        match &self.body {
            Body::Soft(body) => body.world_aabb(),
            Body::Rigid(state) => {
                let Some(pose) = self.com_pose(backend) else {
                    return Bounds::EMPTY;
                };
                let mut bounds = Bounds::EMPTY;
                for part in &state.parts {
                    let aabb = part.shape.compute_aabb(&(pose * part.offset));
                    bounds.add_point(units::point_to_system(&aabb.mins));
                    bounds.add_point(units::point_to_system(&aabb.maxs));
                }
                bounds
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CollidableRef
// ---------------------------------------------------------------------------

/// Read-only view of a collidable and its world backend.
pub struct CollidableRef<'a> {
    pub(crate) handle: CollidableHandle,
    pub(crate) inner: &'a Collidable,
    pub(crate) backend: Option<&'a WorldBackend>,
}

impl CollidableRef<'_> {
    pub fn handle(&self) -> CollidableHandle {
        self.handle
    }

    pub fn kind(&self) -> CollidableKind {
        self.inner.kind
    }

    pub fn world(&self) -> Option<WorldHandle> {
        self.inner.world
    }

    pub fn owner(&self) -> Option<u64> {
        self.inner.owner
    }

    pub fn centroid(&self) -> Vec3 {
        self.inner.centroid
    }

    pub fn collision_filter_bit(&self) -> u32 {
        self.inner.filter_bit
    }

    pub fn has_collision_listener(&self) -> bool {
        self.inner.listener.is_some()
    }

    /// Nominal local origin in world space: the centre of mass minus the
    /// rotated centroid.
    pub fn origin(&self) -> Vec3 {
        self.inner.origin(self.backend)
    }

    pub fn axis(&self) -> Mat3 {
        self.inner.axis(self.backend)
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.origin() + self.axis() * self.inner.centroid
    }

    pub fn friction(&self) -> f32 {
        self.inner.material.friction
    }

    pub fn restitution(&self) -> f32 {
        self.inner.material.restitution
    }

    pub fn rolling_friction(&self) -> f32 {
        self.inner.material.rolling_friction
    }

    pub fn spinning_friction(&self) -> f32 {
        self.inner.material.spinning_friction
    }

    pub fn is_static(&self) -> bool {
        self.inner.filter_class() == FilterClass::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.inner
            .rigid_body(self.backend)
            .is_some_and(RigidBody::is_kinematic)
    }

    /// Awake and able to move.
    pub fn is_active(&self) -> bool {
        match &self.inner.body {
            Body::Soft(_) => self.inner.world.is_some(),
            Body::Rigid(_) => self
                .inner
                .rigid_body(self.backend)
                .is_some_and(|rb| !rb.is_fixed() && !rb.is_sleeping()),
        }
    }

    /// World-space bounds in system units.
    pub fn aabb(&self) -> Bounds {
        self.inner.aabb(self.backend)
    }

    pub fn soft_body(&self) -> Option<&SoftBody> {
        self.inner.soft()
    }

    /// Write the current origin and axis into an entity transform.
    pub fn sync_to_transform(&self, transform: &mut dyn EntityTransform) {
        transform.set_origin_axis(self.origin(), self.axis());
    }
}

// ---------------------------------------------------------------------------
// CollidableMut
// ---------------------------------------------------------------------------

/// Mutable view of a collidable and its world backend.
pub struct CollidableMut<'a> {
    pub(crate) handle: CollidableHandle,
    pub(crate) inner: &'a mut Collidable,
    pub(crate) backend: Option<&'a mut WorldBackend>,
}

impl CollidableMut<'_> {
    /// Reborrow as a read-only view.
    pub fn view(&self) -> CollidableRef<'_> {
        CollidableRef {
            handle: self.handle,
            inner: self.inner,
            backend: self.backend.as_deref(),
        }
    }

    pub(crate) fn rb(&self) -> Option<&RigidBody> {
        self.inner.rigid_body(self.backend.as_deref())
    }

    pub(crate) fn rb_mut(&mut self) -> Option<&mut RigidBody> {
        self.inner.rigid_body_mut(self.backend.as_deref_mut())
    }

    pub fn handle(&self) -> CollidableHandle {
        self.handle
    }

    pub fn kind(&self) -> CollidableKind {
        self.inner.kind
    }

    pub fn origin(&self) -> Vec3 {
        self.inner.origin(self.backend.as_deref())
    }

    pub fn axis(&self) -> Mat3 {
        self.inner.axis(self.backend.as_deref())
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        let axis = self.axis();
        self.inner
            .set_origin_axis(self.backend.as_deref_mut(), origin, axis);
    }

    pub fn set_axis(&mut self, axis: Mat3) {
        let origin = self.origin();
        self.inner
            .set_origin_axis(self.backend.as_deref_mut(), origin, axis);
    }

    pub fn set_origin_axis(&mut self, origin: Vec3, axis: Mat3) {
        self.inner
            .set_origin_axis(self.backend.as_deref_mut(), origin, axis);
    }

    /// Read origin and axis from an entity transform.
    pub fn sync_from_transform(&mut self, transform: &dyn EntityTransform) {
        self.set_origin_axis(transform.origin(), transform.axis());
    }

    pub fn set_owner(&mut self, owner: Option<u64>) {
        self.inner.owner = owner;
    }

    // ---- Material ----

    fn for_each_collider(&mut self, mut f: impl FnMut(&mut rapier3d::prelude::Collider)) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        for &handle in self.inner.collider_handles() {
            if let Some(collider) = backend.colliders.get_mut(handle) {
                f(collider);
            }
        }
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.inner.material.friction = friction;
        self.for_each_collider(|c| c.set_friction(friction));
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.inner.material.restitution = restitution;
        self.for_each_collider(|c| c.set_restitution(restitution));
    }

    /// Applied as angular-velocity decay while in contact.
    pub fn set_rolling_friction(&mut self, friction: f32) {
        self.inner.material.rolling_friction = friction.max(0.0);
    }

    pub fn set_spinning_friction(&mut self, friction: f32) {
        self.inner.material.spinning_friction = friction.max(0.0);
    }

    // ---- Activation / filtering ----

    pub fn activate(&mut self) {
        if let Some(rb) = self.rb_mut() {
            rb.wake_up(true);
        }
    }

    /// Takes effect on the next insertion into a world.
    pub fn set_collision_filter_bit(&mut self, bit: u32) {
        if bit as usize >= crate::filter::MAX_FILTER_LAYERS {
            tracing::warn!(collidable = %self.handle, bit, "collision filter bit out of range");
            return;
        }
        if self.inner.world.is_some() && self.inner.filter_bit != bit {
            tracing::debug!(
                collidable = %self.handle,
                bit,
                "filter bit changed while in a world; re-add to apply"
            );
        }
        self.inner.filter_bit = bit;
    }

    pub fn set_collision_listener(&mut self, listener: Option<Box<dyn CollisionListener>>) {
        if self.inner.kind == CollidableKind::Debris && listener.is_some() {
            tracing::warn!(collidable = %self.handle, "debris does not report collisions");
            return;
        }
        self.inner.listener = listener;
    }

    pub fn soft_body_mut(&mut self) -> Option<&mut SoftBody> {
        self.inner.soft_mut()
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

/// Volume-weighted centroid of the shape set in the collidable's local
/// frame. Falls back to the plain average when every volume is zero.
pub(crate) fn compound_centroid(points: &[(Vec3, f32)]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    let total: f32 = points.iter().map(|(_, v)| *v).sum();
    if total > f32::EPSILON {
        points.iter().map(|(p, v)| *p * *v).sum::<Vec3>() / total
    } else {
        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f32;
        points.iter().map(|(p, _)| *p).sum::<Vec3>() / n
    }
}

/// Offset of a shape from the centre of mass, in physics units.
pub(crate) fn part_offset(shape_centroid: Vec3, local_axis: Mat3, centroid: Vec3) -> Isometry<Real> {
    isometry_to_physics(shape_centroid - centroid, local_axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn centroid_weighted_by_volume() {
        let c = compound_centroid(&[(Vec3::ZERO, 1.0), (Vec3::new(10.0, 0.0, 0.0), 3.0)]);
        assert_relative_eq!(c.x, 7.5);
    }

    #[test]
    fn centroid_of_zero_volume_shapes_is_average() {
        let c = compound_centroid(&[(Vec3::ZERO, 0.0), (Vec3::new(0.0, 4.0, 0.0), 0.0)]);
        assert_relative_eq!(c.y, 2.0);
        assert_eq!(compound_centroid(&[]), Vec3::ZERO);
    }

    #[test]
    fn desc_constructors_set_kind() {
        let id = ColliderId::Unnamed(0);
        assert_eq!(
            CollidableDesc::sensor(vec![ShapeDesc::new(id)]).kind,
            CollidableKind::Sensor
        );
        assert_eq!(
            CollidableDesc::debris(vec![ShapeDesc::new(id)], 1.0).kind,
            CollidableKind::Debris
        );
        let desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(id)], 0.0)
            .with_origin(Vec3::Z);
        assert_eq!(desc.kind, CollidableKind::RigidBody);
        assert_eq!(desc.origin, Vec3::Z);
    }
}
