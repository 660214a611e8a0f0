//! Rigid-body construction and dynamics accessors.
//!
//! The rapier body frame sits at the collidable's centre of mass. A single
//! shape gets its mass and inertia from the collider itself; a compound
//! uses massless colliders plus an explicit mass with the box inertia of
//! the compound's bounds.

use glam::{Affine3A, Vec3};
use rapier3d::prelude::{
    ColliderBuilder, InteractionGroups, MassProperties, Point, Real, RigidBody, RigidBodyBuilder,
    RigidBodyType, Vector,
};

use super::{
    compound_centroid, part_offset, Body, BodySlot, CharacterState, Collidable, CollidableDesc,
    CollidableKind, CollidableMut, CollidableRef, RigidState, ShapePart, SoftBody, SurfaceMaterial,
};
use crate::collider::ColliderManager;
use crate::handles::CollidableHandle;
use crate::units::{
    from_na, isometry_to_physics, moment_to_physics, moment_to_system, to_system,
    vector_to_physics, vector_to_system,
};
use crate::world::backend::WorldBackend;

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Collidable {
    /// Build a detached collidable. Returns `None` when a shape refers to
    /// an unknown collider or a soft body has no mesh.
    pub(crate) fn build(
        handle: CollidableHandle,
        desc: &CollidableDesc,
        colliders: &ColliderManager,
    ) -> Option<Self> {
        let material = SurfaceMaterial {
            friction: desc.friction,
            restitution: desc.restitution,
            rolling_friction: desc.rolling_friction.max(0.0),
            spinning_friction: desc.spinning_friction.max(0.0),
        };

        if desc.kind == CollidableKind::SoftBody {
            let Some(soft) = desc.soft_body.as_ref() else {
                tracing::warn!(collidable = %handle, "soft body without a mesh");
                return None;
            };
            let placement = Affine3A::from_mat3_translation(desc.axis, desc.origin);
            return Some(Self {
                kind: desc.kind,
                centroid: Vec3::ZERO,
                filter_bit: desc.collision_filter_bit,
                world: None,
                owner: desc.owner,
                listener: None,
                material,
                body: Body::Soft(SoftBody::new(soft, placement, desc.mass)),
            });
        }

        debug_assert!(!desc.shapes.is_empty(), "collidable without shapes");

        let mut resolved = Vec::with_capacity(desc.shapes.len());
        for shape in &desc.shapes {
            let Some(collider) = colliders.collider(shape.collider) else {
                tracing::warn!(collidable = %handle, collider = %shape.collider, "unknown collider");
                return None;
            };
            let local_centroid = shape.local_origin + shape.local_axis * collider.centroid();
            resolved.push((shape, collider, local_centroid));
        }

        let weighted: Vec<(Vec3, f32)> = resolved
            .iter()
            .map(|(_, collider, c)| (*c, collider.volume()))
            .collect();
        let centroid = compound_centroid(&weighted);

        let parts: Vec<ShapePart> = resolved
            .iter()
            .map(|(shape, collider, c)| ShapePart {
                collider: shape.collider,
                shape: collider.shape().clone(),
                offset: part_offset(*c, shape.local_axis, centroid),
                materials: collider.triangle_materials(),
            })
            .collect();
        let radius = parts
            .iter()
            .map(|p| {
                p.offset.translation.vector.norm()
                    + p.shape.compute_local_bounding_sphere().radius()
            })
            .fold(0.0, Real::max);

        let kinematic = desc.kinematic
            || matches!(desc.kind, CollidableKind::Character | CollidableKind::Sensor);
        let builder = if kinematic {
            RigidBodyBuilder::kinematic_position_based()
        } else if desc.mass <= 0.0 {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let mut builder = builder
            .position(isometry_to_physics(desc.origin + desc.axis * centroid, desc.axis))
            .linear_damping(desc.linear_damping.max(0.0))
            .angular_damping(desc.angular_damping.max(0.0))
            .can_sleep(desc.kind != CollidableKind::Character)
            .user_data(handle.to_user_data());
        if parts.len() > 1 && desc.mass > 0.0 {
            builder = builder.additional_mass_properties(compound_mass_properties(&parts, desc.mass));
        }

        let ccd_requested = desc.ccd && desc.kind != CollidableKind::Sensor;
        if ccd_requested && is_compound(&parts) {
            tracing::warn!(collidable = %handle, "CCD is unavailable for compound shapes");
        }

        let character = (desc.kind == CollidableKind::Character)
            .then(|| CharacterState::new(&desc.character));

        Some(Self {
            kind: desc.kind,
            centroid,
            filter_bit: desc.collision_filter_bit,
            world: None,
            owner: desc.owner,
            listener: None,
            material,
            body: Body::Rigid(RigidState {
                slot: BodySlot::Detached(Box::new(builder.build())),
                parts,
                mass: desc.mass.max(0.0),
                kinematic: desc.kinematic,
                ccd_requested,
                radius,
                gravity: None,
                linear_factor: Vec3::ONE,
                angular_factor: Vec3::ONE,
                character,
            }),
        })
    }

    /// Fresh backend colliders for every shape part.
    pub(crate) fn build_colliders(
        &self,
        handle: CollidableHandle,
        groups: InteractionGroups,
    ) -> Vec<rapier3d::prelude::Collider> {
        let Some(state) = self.rigid() else {
            return Vec::new();
        };
        let own_mass = state.parts.len() == 1 && state.mass > 0.0 && !state.kinematic;
        state
            .parts
            .iter()
            .map(|part| {
                let builder = ColliderBuilder::new(part.shape.clone())
                    .position(part.offset)
                    .friction(self.material.friction)
                    .restitution(self.material.restitution)
                    .sensor(self.kind == CollidableKind::Sensor)
                    .collision_groups(groups)
                    .solver_groups(groups)
                    .user_data(handle.to_user_data());
                if own_mass {
                    builder.mass(state.mass).build()
                } else {
                    builder.density(0.0).build()
                }
            })
            .collect()
    }

    /// CCD settings derived from the bounding sphere, `None` when CCD is
    /// off or unavailable.
    pub(crate) fn ccd_parameters(&self) -> Option<(Real, Real)> {
        let state = self.rigid()?;
        (state.ccd_requested && !is_compound(&state.parts))
            .then(|| (state.radius * 0.5, state.radius * 0.25))
    }
}

/// Mass at the body origin with the box inertia of the parts' bounds.
fn compound_mass_properties(parts: &[ShapePart], mass: f32) -> MassProperties {
    let mut mins = Vector::repeat(Real::MAX);
    let mut maxs = Vector::repeat(Real::MIN);
    for part in parts {
        let aabb = part.shape.compute_aabb(&part.offset);
        mins = mins.inf(&aabb.mins.coords);
        maxs = maxs.sup(&aabb.maxs.coords);
    }
    let e = maxs - mins;
    let k = mass / 12.0;
    MassProperties::new(
        Point::origin(),
        mass,
        Vector::new(
            k * (e.y * e.y + e.z * e.z),
            k * (e.x * e.x + e.z * e.z),
            k * (e.x * e.x + e.y * e.y),
        ),
    )
}

/// Several parts, or a single part that is itself a compound of hulls.
fn is_compound(parts: &[ShapePart]) -> bool {
    parts.len() > 1 || parts.iter().any(|p| p.shape.as_compound().is_some())
}

fn factor_mask(factor: Vec3) -> [bool; 3] {
    [factor.x != 0.0, factor.y != 0.0, factor.z != 0.0]
}

// ---------------------------------------------------------------------------
// Read accessors
// ---------------------------------------------------------------------------

impl CollidableRef<'_> {
    fn rb(&self) -> Option<&RigidBody> {
        self.inner.rigid_body(self.backend)
    }

    /// Creation mass; zero for static bodies.
    pub fn mass(&self) -> f32 {
        self.inner.rigid().map_or(0.0, |r| r.mass)
    }

    /// Principal inertia in system units (mass·length²).
    pub fn inertia(&self) -> Vec3 {
        self.rb().map_or(Vec3::ZERO, |rb| {
            moment_to_system(&rb.mass_properties().local_mprops.principal_inertia())
        })
    }

    /// Effective gravity: the per-body override or the world's gravity.
    pub fn gravity(&self) -> Vec3 {
        match self.inner.rigid().and_then(|r| r.gravity) {
            Some(g) => g * crate::units::PHYSICS_UNIT_TO_SYSTEM_UNIT,
            None => self
                .backend
                .map_or(Vec3::ZERO, |b| vector_to_system(&b.gravity)),
        }
    }

    pub fn linear_damping(&self) -> f32 {
        self.rb().map_or(0.0, RigidBody::linear_damping)
    }

    pub fn angular_damping(&self) -> f32 {
        self.rb().map_or(0.0, RigidBody::angular_damping)
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.rb().map_or(Vec3::ZERO, |rb| vector_to_system(rb.linvel()))
    }

    /// Radians per second; unit-free.
    pub fn angular_velocity(&self) -> Vec3 {
        self.rb().map_or(Vec3::ZERO, |rb| from_na(rb.angvel()))
    }

    pub fn linear_factor(&self) -> Vec3 {
        self.inner.rigid().map_or(Vec3::ZERO, |r| r.linear_factor)
    }

    pub fn angular_factor(&self) -> Vec3 {
        self.inner.rigid().map_or(Vec3::ZERO, |r| r.angular_factor)
    }

    /// User force accumulated for the next step.
    pub fn total_force(&self) -> Vec3 {
        self.rb().map_or(Vec3::ZERO, |rb| vector_to_system(&rb.user_force()))
    }

    pub fn total_torque(&self) -> Vec3 {
        self.rb().map_or(Vec3::ZERO, |rb| moment_to_system(&rb.user_torque()))
    }

    pub fn is_ccd(&self) -> bool {
        self.rb().is_some_and(RigidBody::is_ccd_enabled)
    }

    /// Motion threshold derived from the bounding sphere, system units.
    pub fn ccd_motion_threshold(&self) -> f32 {
        self.inner
            .ccd_parameters()
            .map_or(0.0, |(threshold, _)| to_system(threshold))
    }

    pub fn ccd_swept_sphere_radius(&self) -> f32 {
        self.inner
            .ccd_parameters()
            .map_or(0.0, |(_, radius)| to_system(radius))
    }
}

// ---------------------------------------------------------------------------
// Write accessors
// ---------------------------------------------------------------------------

impl CollidableMut<'_> {
    pub fn mass(&self) -> f32 {
        self.view().mass()
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.view().linear_velocity()
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.view().angular_velocity()
    }

    /// Zero turns a dynamic body static and a positive mass turns a static
    /// body dynamic. Kinematic bodies only record the value.
    pub fn set_mass(&mut self, mass: f32) {
        let mass = mass.max(0.0);
        let first_collider = self.inner.collider_handles().first().copied();
        let movable = matches!(
            self.inner.kind,
            CollidableKind::RigidBody | CollidableKind::Debris
        );
        let Some(state) = self.inner.rigid_mut() else {
            return;
        };
        state.mass = mass;
        let kinematic = state.kinematic || !movable;
        let compound = (state.parts.len() > 1)
            .then(|| compound_mass_properties(&state.parts, mass.max(f32::EPSILON)));

        if let (Some(handle), false, None) = (first_collider, kinematic, &compound) {
            if let Some(collider) = self
                .backend
                .as_deref_mut()
                .and_then(|b| b.colliders.get_mut(handle))
            {
                collider.set_mass(mass);
            }
        }
        let Some(rb) = self.rb_mut() else {
            return;
        };
        if let Some(props) = compound {
            rb.set_additional_mass_properties(props, true);
        }
        if !kinematic {
            let target = if mass > 0.0 {
                RigidBodyType::Dynamic
            } else {
                RigidBodyType::Fixed
            };
            if rb.body_type() != target {
                rb.set_body_type(target, true);
            }
        }
    }

    /// Override gravity for this body only.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        let Some(state) = self.inner.rigid_mut() else {
            return;
        };
        state.gravity = Some(gravity * crate::units::SYSTEM_UNIT_TO_PHYSICS_UNIT);
        if let Some(rb) = self.rb_mut() {
            rb.set_gravity_scale(0.0, true);
        }
    }

    /// Go back to following the world's gravity.
    pub fn clear_gravity(&mut self) {
        let Some(state) = self.inner.rigid_mut() else {
            return;
        };
        state.gravity = None;
        if let Some(rb) = self.rb_mut() {
            rb.set_gravity_scale(1.0, true);
        }
    }

    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        if let Some(rb) = self.rb_mut() {
            rb.set_linear_damping(linear.max(0.0));
            rb.set_angular_damping(angular.max(0.0));
        }
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        if let Some(rb) = self.rb_mut() {
            rb.set_linvel(vector_to_physics(velocity), true);
        }
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        if let Some(rb) = self.rb_mut() {
            rb.set_angvel(crate::units::to_na(velocity), true);
        }
    }

    /// Zero components lock the matching translation axis.
    pub fn set_linear_factor(&mut self, factor: Vec3) {
        let Some(state) = self.inner.rigid_mut() else {
            return;
        };
        state.linear_factor = factor;
        let [x, y, z] = factor_mask(factor);
        if let Some(rb) = self.rb_mut() {
            rb.set_enabled_translations(x, y, z, true);
        }
    }

    /// Zero components lock the matching rotation axis.
    pub fn set_angular_factor(&mut self, factor: Vec3) {
        let Some(state) = self.inner.rigid_mut() else {
            return;
        };
        state.angular_factor = factor;
        let [x, y, z] = factor_mask(factor);
        if let Some(rb) = self.rb_mut() {
            rb.set_enabled_rotations(x, y, z, true);
        }
    }

    pub fn clear_forces(&mut self) {
        if let Some(rb) = self.rb_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
    }

    pub fn clear_velocities(&mut self) {
        if let Some(rb) = self.rb_mut() {
            rb.set_linvel(Vector::zeros(), false);
            rb.set_angvel(Vector::zeros(), false);
        }
    }

    pub fn apply_central_force(&mut self, force: Vec3) {
        if let Some(rb) = self.rb_mut() {
            rb.add_force(vector_to_physics(force), true);
        }
    }

    /// Force applied at `rel_pos` from the centre of mass, world-oriented.
    pub fn apply_force(&mut self, force: Vec3, rel_pos: Vec3) {
        if let Some(rb) = self.rb_mut() {
            let point = rb.center_of_mass() + vector_to_physics(rel_pos);
            rb.add_force_at_point(vector_to_physics(force), point, true);
        }
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if let Some(rb) = self.rb_mut() {
            rb.add_torque(moment_to_physics(torque), true);
        }
    }

    pub fn apply_central_impulse(&mut self, impulse: Vec3) {
        if let Some(rb) = self.rb_mut() {
            rb.apply_impulse(vector_to_physics(impulse), true);
        }
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, rel_pos: Vec3) {
        if let Some(rb) = self.rb_mut() {
            let point = rb.center_of_mass() + vector_to_physics(rel_pos);
            rb.apply_impulse_at_point(vector_to_physics(impulse), point, true);
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        if let Some(rb) = self.rb_mut() {
            rb.apply_torque_impulse(moment_to_physics(impulse), true);
        }
    }

    /// Enable continuous collision detection. Refused for compound shapes.
    pub fn set_ccd(&mut self, enabled: bool) {
        let Some(state) = self.inner.rigid_mut() else {
            return;
        };
        if enabled && is_compound(&state.parts) {
            tracing::warn!(collidable = %self.handle, "CCD is unavailable for compound shapes");
            return;
        }
        state.ccd_requested = enabled;
        let prediction = self.inner.ccd_parameters().map_or(0.0, |(_, r)| r);
        if let Some(rb) = self.rb_mut() {
            rb.enable_ccd(enabled);
            rb.set_soft_ccd_prediction(prediction);
        }
    }

    /// Teleport the centre of mass, keeping orientation.
    pub fn set_center_of_mass(&mut self, com: Vec3) {
        let axis = self.axis();
        let centroid = self.inner.centroid;
        self.set_origin_axis(com - axis * centroid, axis);
    }
}

/// Apply the per-body gravity override as an impulse for one substep.
pub(crate) fn apply_custom_gravity(state: &RigidState, backend: &mut WorldBackend, dt: Real) {
    let (Some(gravity), BodySlot::Attached { handle, .. }) = (state.gravity, &state.slot) else {
        return;
    };
    if let Some(rb) = backend.bodies.get_mut(*handle) {
        if rb.is_dynamic() && !rb.is_sleeping() {
            let impulse = crate::units::to_na(gravity * (rb.mass() * dt));
            rb.apply_impulse(impulse, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collider::Collider;
    use crate::collidable::ShapeDesc;
    use crate::units::to_physics;
    use approx::assert_relative_eq;
    use glam::Mat3;

    fn manager_with(colliders: Vec<Collider>) -> (ColliderManager, Vec<crate::ColliderId>) {
        let mut manager = ColliderManager::new();
        let ids = colliders
            .into_iter()
            .map(|c| manager.alloc_unnamed_collider(c))
            .collect();
        (manager, ids)
    }

    #[test]
    fn single_shape_centroid_comes_from_collider() {
        let box_ = Collider::create_box(Vec3::new(0.0, 0.0, 20.0), Vec3::splat(10.0), 0.0).unwrap();
        let (manager, ids) = manager_with(vec![box_]);
        let desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(ids[0])], 1.0);
        let c = Collidable::build(CollidableHandle(0), &desc, &manager).unwrap();
        assert_relative_eq!(c.centroid.z, 20.0);
        assert_eq!(c.rigid().map(|r| r.parts.len()), Some(1));
    }

    #[test]
    fn compound_centroid_is_volume_weighted() {
        let small = Collider::create_box(Vec3::ZERO, Vec3::splat(1.0), 0.0).unwrap();
        let large = Collider::create_box(Vec3::ZERO, Vec3::splat(2.0), 0.0).unwrap();
        let (manager, ids) = manager_with(vec![small, large]);
        let desc = CollidableDesc::rigid_body(
            vec![
                ShapeDesc::new(ids[0]),
                ShapeDesc::new(ids[1]).at(Vec3::new(9.0, 0.0, 0.0), Mat3::IDENTITY),
            ],
            1.0,
        );
        let c = Collidable::build(CollidableHandle(0), &desc, &manager).unwrap();
        // Volumes 8 and 64.
        assert_relative_eq!(c.centroid.x, 8.0, max_relative = 1e-5);
    }

    #[test]
    fn unknown_collider_is_refused() {
        let manager = ColliderManager::new();
        let desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(crate::ColliderId::Unnamed(4))], 1.0);
        assert!(Collidable::build(CollidableHandle(0), &desc, &manager).is_none());
    }

    #[test]
    fn ccd_parameters_from_bounding_sphere() {
        let ball = Collider::create_sphere(Vec3::ZERO, 20.0).unwrap();
        let (manager, ids) = manager_with(vec![ball]);
        let mut desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(ids[0])], 1.0);
        desc.ccd = true;
        let c = Collidable::build(CollidableHandle(0), &desc, &manager).unwrap();
        let (threshold, swept) = c.ccd_parameters().unwrap();
        assert_relative_eq!(threshold, to_physics(10.0), max_relative = 1e-5);
        assert_relative_eq!(swept, to_physics(5.0), max_relative = 1e-5);
    }

    #[test]
    fn ccd_unavailable_for_decomposed_collider() {
        let mesh = impulse_core::mesh::TriMesh::cuboid("crate", Vec3::splat(20.0));
        let hulls = Collider::create_convex_decomp(&mesh, Vec3::ONE, 0.0).unwrap();
        assert!(!hulls.is_convex());
        let (manager, ids) = manager_with(vec![hulls]);
        let mut desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(ids[0])], 1.0);
        desc.ccd = true;
        let mut c = Collidable::build(CollidableHandle(0), &desc, &manager).unwrap();
        assert!(c.ccd_parameters().is_none());

        let mut body = super::super::CollidableMut {
            handle: CollidableHandle(0),
            inner: &mut c,
            backend: None,
        };
        body.set_ccd(true);
        assert!(c.ccd_parameters().is_none());
    }

    #[test]
    fn compound_inertia_uses_bounds() {
        let cube = Collider::create_box(Vec3::ZERO, Vec3::splat(50.0), 0.0).unwrap();
        let (manager, ids) = manager_with(vec![cube.clone(), cube]);
        let desc = CollidableDesc::rigid_body(
            vec![
                ShapeDesc::new(ids[0]).at(Vec3::new(-50.0, 0.0, 0.0), Mat3::IDENTITY),
                ShapeDesc::new(ids[1]).at(Vec3::new(50.0, 0.0, 0.0), Mat3::IDENTITY),
            ],
            12.0,
        );
        let c = Collidable::build(CollidableHandle(0), &desc, &manager).unwrap();
        let props = compound_mass_properties(&c.rigid().unwrap().parts, 12.0);
        // 2 m x 1 m x 1 m box of 12 kg.
        let inertia = props.principal_inertia();
        assert_relative_eq!(inertia.x, 2.0, max_relative = 1e-4);
        assert_relative_eq!(inertia.y, 5.0, max_relative = 1e-4);
    }
}
