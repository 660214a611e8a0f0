//! The physics service: registry of worlds, collidables and constraints.
//!
//! [`PhysicsSystem`] owns every object and hands out handles. Worlds only
//! record membership, so adding, removing and destroying objects all go
//! through the system, which keeps the backend, the membership sets and
//! the objects' own back-references consistent.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Affine3A, Vec3};
use impulse_core::config::PhysicsConfig;
use impulse_core::error::ConfigError;
use impulse_core::mesh::{DeformableMesh, MeshProvider};
use impulse_core::time::StepBudget;
use rapier3d::prelude::{Isometry, Real, RigidBodyHandle};

use crate::collidable::{
    sensor, Collidable, CollidableDesc, CollidableKind, CollidableMut, CollidableRef,
};
use crate::collider::ColliderManager;
use crate::constraint::{BodyInfo, Constraint, ConstraintDesc, ConstraintMut, ConstraintRef};
use crate::filter::MAX_FILTER_LAYERS;
use crate::handles::{CollidableHandle, ConstraintHandle, WorldHandle};
use crate::listener::Contact;
use crate::world::PhysicsWorld;

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Every live collidable and constraint, keyed by handle.
#[derive(Default)]
pub(crate) struct ObjectStore {
    pub(crate) collidables: BTreeMap<CollidableHandle, Collidable>,
    pub(crate) constraints: BTreeMap<ConstraintHandle, Constraint>,
}

impl ObjectStore {
    /// Constraints that reference `body` on either side.
    fn constraints_of(&self, body: CollidableHandle) -> Vec<ConstraintHandle> {
        self.constraints
            .iter()
            .filter(|(_, c)| c.body_a == Some(body) || c.body_b == Some(body))
            .map(|(h, _)| *h)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PhysicsSystem
// ---------------------------------------------------------------------------

pub struct PhysicsSystem {
    config: PhysicsConfig,
    colliders: ColliderManager,
    worlds: BTreeMap<WorldHandle, PhysicsWorld>,
    store: ObjectStore,
    next_world: u32,
    next_collidable: u32,
    next_constraint: u32,
}

impl std::fmt::Debug for PhysicsSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsSystem")
            .field("worlds", &self.worlds.len())
            .field("collidables", &self.store.collidables.len())
            .field("constraints", &self.store.constraints.len())
            .field("colliders", &self.colliders)
            .finish_non_exhaustive()
    }
}

impl PhysicsSystem {
    /// Create the service. Fails if `config` does not validate.
    pub fn new(config: PhysicsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            colliders: ColliderManager::new(),
            worlds: BTreeMap::new(),
            store: ObjectStore::default(),
            next_world: 0,
            next_collidable: 0,
            next_constraint: 0,
        })
    }

    /// Attach the mesh source used to load named colliders.
    pub fn init(&mut self, provider: Arc<dyn MeshProvider>) {
        self.colliders.init(provider);
        tracing::debug!("physics system initialized");
    }

    /// Destroy every object and world and empty the collider cache.
    pub fn shutdown(&mut self) {
        let constraints: Vec<_> = self.store.constraints.keys().copied().collect();
        for handle in constraints {
            self.destroy_constraint(handle);
        }
        let collidables: Vec<_> = self.store.collidables.keys().copied().collect();
        for handle in collidables {
            self.destroy_collidable(handle);
        }
        self.worlds.clear();
        self.colliders.shutdown();
        tracing::debug!("physics system shut down");
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Push changed toggles (enable flag, debug draw, deactivation, CCD)
    /// into every world. Returns whether anything changed.
    pub fn check_modified_config(&mut self, config: &PhysicsConfig) -> bool {
        if *config == self.config {
            return false;
        }
        let old = std::mem::replace(&mut self.config, config.clone());
        let body_flags_changed =
            old.no_deactivation != config.no_deactivation || old.enable_ccd != config.enable_ccd;
        for world in self.worlds.values_mut() {
            world.set_enabled(config.enabled);
            world.set_debug_draw_mode(config.debug_draw_mode());
            if body_flags_changed {
                world.set_body_flags(&self.store, config.no_deactivation, config.enable_ccd);
            }
        }
        tracing::debug!(enabled = config.enabled, "physics config changed");
        true
    }

    pub fn colliders(&self) -> &ColliderManager {
        &self.colliders
    }

    pub fn colliders_mut(&mut self) -> &mut ColliderManager {
        &mut self.colliders
    }

    // ---- Worlds ----

    pub fn create_world(&mut self) -> WorldHandle {
        let handle = WorldHandle(self.next_world);
        self.next_world += 1;
        self.worlds
            .insert(handle, PhysicsWorld::new(handle, &self.config));
        tracing::debug!(world = %handle, "world created");
        handle
    }

    /// Detach every member and drop the world. Members survive.
    pub fn destroy_world(&mut self, handle: WorldHandle) -> bool {
        let Some(world) = self.worlds.get(&handle) else {
            tracing::warn!(world = %handle, "destroying unknown world");
            return false;
        };
        let constraints: Vec<_> = world.constraints().collect();
        let members: Vec<_> = world.members().collect();
        for c in constraints {
            self.remove_constraint_from_world(c);
        }
        for c in members {
            self.remove_from_world(c);
        }
        self.worlds.remove(&handle);
        tracing::debug!(world = %handle, "world destroyed");
        true
    }

    pub fn world(&self, handle: WorldHandle) -> Option<&PhysicsWorld> {
        self.worlds.get(&handle)
    }

    pub fn world_mut(&mut self, handle: WorldHandle) -> Option<&mut PhysicsWorld> {
        self.worlds.get_mut(&handle)
    }

    pub fn worlds(&self) -> impl Iterator<Item = WorldHandle> + '_ {
        self.worlds.keys().copied()
    }

    // ---- Collidables ----

    /// Build a detached collidable. It takes over one reference to each
    /// collider named by `desc.shapes`, released again on destruction.
    pub fn create_collidable(&mut self, desc: &CollidableDesc) -> Option<CollidableHandle> {
        let handle = CollidableHandle(self.next_collidable);
        if desc.collision_filter_bit as usize >= MAX_FILTER_LAYERS {
            tracing::warn!(
                bit = desc.collision_filter_bit,
                "collision filter bit out of range"
            );
            return None;
        }
        if desc.kind != CollidableKind::SoftBody && desc.shapes.is_empty() {
            tracing::warn!("collidable without shapes");
            return None;
        }
        let collidable = Collidable::build(handle, desc, &self.colliders)?;
        self.next_collidable += 1;
        self.store.collidables.insert(handle, collidable);
        tracing::trace!(collidable = %handle, kind = ?desc.kind, "collidable created");
        Some(handle)
    }

    /// Remove from its world, destroy every constraint on it, then release
    /// its colliders.
    pub fn destroy_collidable(&mut self, handle: CollidableHandle) -> bool {
        if !self.store.collidables.contains_key(&handle) {
            tracing::warn!(collidable = %handle, "destroying unknown collidable");
            return false;
        }
        if self.store.collidables[&handle].world.is_some() {
            self.remove_from_world(handle);
        }
        for constraint in self.store.constraints_of(handle) {
            self.destroy_constraint(constraint);
        }
        let Some(collidable) = self.store.collidables.remove(&handle) else {
            return false;
        };
        if let Some(state) = collidable.rigid() {
            for part in &state.parts {
                self.colliders.release_collider(part.collider, false);
            }
        }
        tracing::trace!(collidable = %handle, "collidable destroyed");
        true
    }

    pub fn collidable(&self, handle: CollidableHandle) -> Option<CollidableRef<'_>> {
        let inner = self.store.collidables.get(&handle)?;
        let backend = inner
            .world
            .and_then(|w| self.worlds.get(&w))
            .map(|w| &w.backend);
        Some(CollidableRef {
            handle,
            inner,
            backend,
        })
    }

    pub fn collidable_mut(&mut self, handle: CollidableHandle) -> Option<CollidableMut<'_>> {
        let inner = self.store.collidables.get_mut(&handle)?;
        let backend = inner
            .world
            .and_then(|w| self.worlds.get_mut(&w))
            .map(|w| &mut w.backend);
        Some(CollidableMut {
            handle,
            inner,
            backend,
        })
    }

    pub fn collidables(&self) -> impl Iterator<Item = CollidableHandle> + '_ {
        self.store.collidables.keys().copied()
    }

    pub fn add_to_world(&mut self, handle: CollidableHandle, world: WorldHandle) -> bool {
        let (Some(c), Some(w)) = (
            self.store.collidables.get_mut(&handle),
            self.worlds.get_mut(&world),
        ) else {
            tracing::warn!(collidable = %handle, %world, "unknown collidable or world");
            return false;
        };
        w.insert_collidable(handle, c)
    }

    /// Constraints attached to the collidable leave the world first.
    pub fn remove_from_world(&mut self, handle: CollidableHandle) -> bool {
        let Some(world) = self.store.collidables.get(&handle).map(|c| c.world) else {
            tracing::warn!(collidable = %handle, "removing unknown collidable");
            return false;
        };
        let Some(world) = world else {
            tracing::warn!(collidable = %handle, "collidable is not in a world");
            return false;
        };
        for constraint in self.store.constraints_of(handle) {
            if self.store.constraints[&constraint].world.is_some() {
                self.remove_constraint_from_world(constraint);
            }
        }
        let (Some(c), Some(w)) = (
            self.store.collidables.get_mut(&handle),
            self.worlds.get_mut(&world),
        ) else {
            return false;
        };
        w.remove_collidable(handle, c)
    }

    // ---- Constraints ----

    fn body_info(&self, handle: CollidableHandle) -> Option<BodyInfo> {
        let Some(view) = self.collidable(handle) else {
            tracing::warn!(collidable = %handle, "constraint body does not exist");
            return None;
        };
        let Some(rb) = view.inner.rigid_body(view.backend) else {
            tracing::warn!(collidable = %handle, "constraint body is not a rigid body");
            return None;
        };
        Some(BodyInfo {
            centroid: view.inner.centroid,
            mass: view.inner.rigid().map_or(0.0, |r| r.mass),
            pose: *rb.position(),
        })
    }

    fn body_pose(&self, handle: Option<CollidableHandle>) -> Option<Isometry<Real>> {
        let view = self.collidable(handle?)?;
        view.inner.rigid_body(view.backend).map(|rb| *rb.position())
    }

    /// Build a detached joint between two rigid bodies, or between one body
    /// and the world when the other side is `None`.
    pub fn create_constraint(&mut self, desc: &ConstraintDesc) -> Option<ConstraintHandle> {
        debug_assert!(
            desc.body_a.is_some() || desc.body_b.is_some(),
            "constraint without bodies"
        );
        if desc.body_a.is_none() && desc.body_b.is_none() {
            tracing::warn!(kind = ?desc.kind, "constraint needs at least one body");
            return None;
        }
        let a = match desc.body_a {
            Some(h) => Some(self.body_info(h)?),
            None => None,
        };
        let b = match desc.body_b {
            Some(h) => Some(self.body_info(h)?),
            None => None,
        };
        let dt = [desc.body_a, desc.body_b]
            .into_iter()
            .flatten()
            .find_map(|h| self.store.collidables.get(&h)?.world)
            .and_then(|w| self.worlds.get(&w))
            .map_or_else(|| self.config.fixed_time_step(), PhysicsWorld::frame_time_delta);

        let constraint = Constraint::new(desc, a, b, dt)?;
        let handle = ConstraintHandle(self.next_constraint);
        self.next_constraint += 1;
        self.store.constraints.insert(handle, constraint);
        tracing::trace!(constraint = %handle, kind = ?desc.kind, "constraint created");
        Some(handle)
    }

    pub fn destroy_constraint(&mut self, handle: ConstraintHandle) -> bool {
        let Some(constraint) = self.store.constraints.get(&handle) else {
            tracing::warn!(constraint = %handle, "destroying unknown constraint");
            return false;
        };
        if constraint.world.is_some() {
            self.remove_constraint_from_world(handle);
        }
        self.store.constraints.remove(&handle).is_some()
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<ConstraintRef<'_>> {
        let inner = self.store.constraints.get(&handle)?;
        let poses = [self.body_pose(inner.body_a), self.body_pose(inner.body_b)];
        Some(ConstraintRef {
            handle,
            inner,
            poses,
        })
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<ConstraintMut<'_>> {
        let (body_a, body_b) = self
            .store
            .constraints
            .get(&handle)
            .map(|c| (c.body_a, c.body_b))?;
        let poses = [self.body_pose(body_a), self.body_pose(body_b)];
        let inner = self.store.constraints.get_mut(&handle)?;
        let backend = inner
            .world
            .and_then(|w| self.worlds.get_mut(&w))
            .map(|w| &mut w.backend);
        Some(ConstraintMut {
            handle,
            inner,
            backend,
            poses,
        })
    }

    pub fn constraints(&self) -> impl Iterator<Item = ConstraintHandle> + '_ {
        self.store.constraints.keys().copied()
    }

    /// Every body the constraint names must already be in `world`.
    pub fn add_constraint_to_world(&mut self, handle: ConstraintHandle, world: WorldHandle) -> bool {
        let Some(constraint) = self.store.constraints.get(&handle) else {
            tracing::warn!(constraint = %handle, "adding unknown constraint");
            return false;
        };
        let mut bodies: [Option<RigidBodyHandle>; 2] = [None, None];
        for (slot, body) in bodies.iter_mut().zip([constraint.body_a, constraint.body_b]) {
            let Some(body) = body else {
                continue;
            };
            let Some(c) = self.store.collidables.get(&body) else {
                tracing::warn!(constraint = %handle, collidable = %body, "constraint body was destroyed");
                return false;
            };
            if c.world != Some(world) {
                tracing::warn!(
                    constraint = %handle,
                    collidable = %body,
                    %world,
                    "constraint body is not in the target world"
                );
                return false;
            }
            *slot = c.body_handle();
        }
        let (Some(c), Some(w)) = (
            self.store.constraints.get_mut(&handle),
            self.worlds.get_mut(&world),
        ) else {
            tracing::warn!(%world, "adding constraint to unknown world");
            return false;
        };
        w.insert_constraint(handle, c, bodies)
    }

    pub fn remove_constraint_from_world(&mut self, handle: ConstraintHandle) -> bool {
        let Some(constraint) = self.store.constraints.get_mut(&handle) else {
            tracing::warn!(constraint = %handle, "removing unknown constraint");
            return false;
        };
        let Some(world) = constraint.world.and_then(|w| self.worlds.get_mut(&w)) else {
            tracing::warn!(constraint = %handle, "constraint is not in a world");
            return false;
        };
        world.remove_constraint(handle, constraint)
    }

    // ---- Stepping ----

    /// Advance `world` by `frame_time` seconds.
    pub fn step_simulation(&mut self, world: WorldHandle, frame_time: f32) -> StepBudget {
        match self.worlds.get_mut(&world) {
            Some(w) => w.step_simulation(&mut self.store, frame_time),
            None => {
                tracing::warn!(%world, "stepping unknown world");
                StepBudget::default()
            }
        }
    }

    /// Destroy every constraint and collidable in `world` and reset its
    /// clock.
    pub fn clear_scene(&mut self, world: WorldHandle) -> bool {
        let Some(w) = self.worlds.get(&world) else {
            tracing::warn!(%world, "clearing unknown world");
            return false;
        };
        let constraints: Vec<_> = w.constraints().collect();
        let members: Vec<_> = w.members().collect();
        for c in constraints {
            self.destroy_constraint(c);
        }
        for c in members {
            self.destroy_collidable(c);
        }
        if let Some(w) = self.worlds.get_mut(&world) {
            w.reset();
        }
        true
    }

    // ---- Sensors ----

    fn attached_sensor(&self, handle: CollidableHandle) -> Option<(&Collidable, &PhysicsWorld)> {
        let c = self.store.collidables.get(&handle)?;
        if c.kind != CollidableKind::Sensor {
            tracing::warn!(collidable = %handle, "not a sensor");
            return None;
        }
        let world = self.worlds.get(&c.world?)?;
        Some((c, world))
    }

    /// Objects currently overlapping the sensor, in handle order.
    pub fn sensor_overlaps(&self, handle: CollidableHandle) -> Vec<CollidableHandle> {
        let Some((c, world)) = self.attached_sensor(handle) else {
            return Vec::new();
        };
        let (Some(body), Some(state)) = (c.body_handle(), c.rigid()) else {
            return Vec::new();
        };
        let groups = world.object_groups(c.filter_bit, c.filter_class());
        sensor::overlaps(&world.backend, body, &state.parts, groups)
    }

    /// Penetrating contact points between the sensor and its overlaps.
    pub fn sensor_contacts(&self, handle: CollidableHandle) -> Vec<Contact> {
        let Some((c, world)) = self.attached_sensor(handle) else {
            return Vec::new();
        };
        let (Some(body), Some(state)) = (c.body_handle(), c.rigid()) else {
            return Vec::new();
        };
        let groups = world.object_groups(c.filter_bit, c.filter_class());
        sensor::contacts(&world.backend, handle, body, &state.parts, groups)
    }

    // ---- Characters ----

    /// Sweep a character by `displacement` (system units) and queue the
    /// resulting pose for the next step. Returns the distance actually
    /// moved.
    pub fn move_character(&mut self, handle: CollidableHandle, displacement: Vec3) -> Option<Vec3> {
        let c = self.store.collidables.get_mut(&handle)?;
        if c.kind != CollidableKind::Character {
            tracing::warn!(collidable = %handle, "not a character");
            return None;
        }
        let Some(world) = c.world.and_then(|w| self.worlds.get_mut(&w)) else {
            tracing::warn!(collidable = %handle, "character is not in a world");
            return None;
        };
        let groups = world.object_groups(c.filter_bit, c.filter_class());
        let dt = world.frame_time_delta();
        let body = c.body_handle()?;
        let state = c.rigid_mut()?;
        let part = state.parts.first()?.clone();
        state
            .character
            .as_mut()?
            .move_shape(&mut world.backend, body, &part, groups, displacement, dt)
    }

    // ---- Soft bodies ----

    /// Copy a soft body's nodes into `mesh`, placed by `world_to_local`.
    pub fn write_soft_body_mesh(
        &self,
        handle: CollidableHandle,
        world_to_local: Affine3A,
        mesh: &mut dyn DeformableMesh,
    ) -> bool {
        match self.store.collidables.get(&handle).and_then(Collidable::soft) {
            Some(body) => body.write_to_mesh(world_to_local, mesh),
            None => {
                tracing::warn!(collidable = %handle, "not a soft body");
                false
            }
        }
    }
}
