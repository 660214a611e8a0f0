//! Simulation worlds.
//!
//! A [`PhysicsWorld`] owns one rapier pipeline plus the bookkeeping around
//! it: filter table, fixed-step accumulator, simulated time, solver preset
//! and step signals. Collidables and constraints stay owned by the
//! [`PhysicsSystem`](crate::PhysicsSystem); the world only records which
//! ones are members and holds their backend bodies and joints.
//!
//! Each substep runs, in order: `pre_step` signal, soft-body integration,
//! rolling resistance and per-body gravity, the rapier step, constraint
//! breaking, time advance, contact dispatch and the `post_step` signal.

pub mod backend;
pub mod debug;
mod dispatch;
pub mod query;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use glam::Vec3;
use impulse_core::config::{ConstraintSolver, DebugDrawMode, PhysicsConfig};
use impulse_core::time::{Accumulator, SimTime, StepBudget};
use rapier3d::parry::bounding_volume::Aabb;
use rapier3d::prelude::{
    ColliderHandle, InteractionGroups, Real, RigidBody, RigidBodyActivation, RigidBodyHandle,
};

use crate::collidable::rigid_body::apply_custom_gravity;
use crate::collidable::soft_body::NodeCollision;
use crate::collidable::{Body, BodySlot, Collidable, RigidState};
use crate::constraint::Constraint;
use crate::filter::{self, FilterClass, ALL_LAYERS, MAX_FILTER_LAYERS};
use crate::handles::{CollidableHandle, ConstraintHandle, WorldHandle};
use crate::signal::StepSignal;
use crate::system::ObjectStore;
use crate::units::{from_na, to_na, vector_to_physics, vector_to_system};

use backend::WorldBackend;

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

pub struct PhysicsWorld {
    handle: WorldHandle,
    pub(crate) backend: WorldBackend,

    filter_masks: [u32; MAX_FILTER_LAYERS],
    accumulator: Accumulator,
    frame_rate: u32,
    max_allowed_time_step: f32,
    time: SimTime,

    solver: ConstraintSolver,
    solver_iterations: u32,
    deterministic: bool,

    enabled: bool,
    no_deactivation: bool,
    ccd_enabled: bool,
    debug_mode: DebugDrawMode,

    pub(crate) members: BTreeSet<CollidableHandle>,
    /// Filter layer each member was inserted with.
    member_layers: HashMap<CollidableHandle, u32>,
    pub(crate) constraints: BTreeSet<ConstraintHandle>,
    /// Triangle material tables of attached multi-material colliders.
    surface_materials: HashMap<ColliderHandle, Arc<[u32]>>,

    pre_step: StepSignal,
    post_step: StepSignal,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("handle", &self.handle)
            .field("time", &self.time)
            .field("members", &self.members.len())
            .field("constraints", &self.constraints.len())
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    pub(crate) fn new(handle: WorldHandle, config: &PhysicsConfig) -> Self {
        let dt = config.fixed_time_step();
        let gravity = vector_to_physics(Vec3::from_array(config.gravity));
        let mut world = Self {
            handle,
            backend: WorldBackend::new(gravity, dt),
            filter_masks: [ALL_LAYERS; MAX_FILTER_LAYERS],
            accumulator: Accumulator::new(f64::from(dt)).with_max_steps(config.max_substeps()),
            frame_rate: config.frame_rate,
            max_allowed_time_step: config.max_allowed_time_step,
            time: SimTime::new(),
            solver: config.solver,
            solver_iterations: config.solver_iterations,
            deterministic: config.deterministic,
            enabled: config.enabled,
            no_deactivation: config.no_deactivation,
            ccd_enabled: config.enable_ccd,
            debug_mode: config.debug_draw_mode(),
            members: BTreeSet::new(),
            member_layers: HashMap::new(),
            constraints: BTreeSet::new(),
            surface_materials: HashMap::new(),
            pre_step: StepSignal::new(),
            post_step: StepSignal::new(),
        };
        world.apply_solver_params();
        world
    }

    pub fn handle(&self) -> WorldHandle {
        self.handle
    }

    // ---- Gravity ----

    /// Gravity in system units per second squared.
    pub fn gravity(&self) -> Vec3 {
        vector_to_system(&self.backend.gravity)
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.backend.gravity = vector_to_physics(gravity);
    }

    // ---- Filter table ----

    /// Mask of layers that `layer` collides with. Out-of-range layers
    /// collide with nothing.
    pub fn collision_filter_mask(&self, layer: u32) -> u32 {
        self.filter_masks.get(layer as usize).copied().unwrap_or(0)
    }

    /// Applies to collidables added afterwards.
    pub fn set_collision_filter_mask(&mut self, layer: u32, mask: u32) {
        match self.filter_masks.get_mut(layer as usize) {
            Some(slot) => *slot = mask,
            None => tracing::warn!(world = %self.handle, layer, "collision filter layer out of range"),
        }
    }

    /// Filter layer a member presents to queries it issues. Zero for
    /// non-members.
    pub(crate) fn member_layer(&self, handle: CollidableHandle) -> u32 {
        self.member_layers.get(&handle).copied().unwrap_or(0)
    }

    pub(crate) fn object_groups(&self, layer: u32, class: FilterClass) -> InteractionGroups {
        filter::object_groups(layer, class, self.collision_filter_mask(layer))
    }

    // ---- Frame rate / time step ----

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Change the substep rate. Pending sub-step residue is discarded.
    pub fn set_frame_rate(&mut self, frame_rate: u32) {
        if frame_rate == 0 {
            tracing::warn!(world = %self.handle, "frame rate must be positive");
            return;
        }
        self.frame_rate = frame_rate;
        let dt = self.frame_time_delta();
        self.accumulator.set_timestep(f64::from(dt));
        self.accumulator.set_max_steps(self.max_substeps());
        self.backend.params.dt = dt;
    }

    /// Fixed substep length in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_time_delta(&self) -> f32 {
        1.0 / self.frame_rate as f32
    }

    pub fn max_allowed_time_step(&self) -> f32 {
        self.max_allowed_time_step
    }

    pub fn set_max_allowed_time_step(&mut self, seconds: f32) {
        if !seconds.is_finite() || seconds <= 0.0 {
            tracing::warn!(world = %self.handle, seconds, "max allowed time step must be positive");
            return;
        }
        self.max_allowed_time_step = seconds;
        self.accumulator.set_max_steps(self.max_substeps());
    }

    /// Substep cap of a single `step_simulation` call.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn max_substeps(&self) -> u32 {
        ((self.frame_rate as f32 * self.max_allowed_time_step).ceil() as u32).max(1)
    }

    /// Simulated elapsed time.
    pub fn time(&self) -> SimTime {
        self.time
    }

    // ---- Solver ----

    pub fn constraint_solver(&self) -> ConstraintSolver {
        self.solver
    }

    pub fn set_constraint_solver(&mut self, solver: ConstraintSolver) {
        self.solver = solver;
        self.apply_solver_params();
    }

    pub fn solver_iterations(&self) -> u32 {
        self.solver_iterations
    }

    pub fn set_solver_iterations(&mut self, iterations: u32) {
        self.solver_iterations = iterations.max(1);
        self.apply_solver_params();
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn set_deterministic(&mut self, deterministic: bool) {
        self.deterministic = deterministic;
        self.apply_solver_params();
    }

    fn apply_solver_params(&mut self) {
        let iterations = self.solver_iterations.max(1) as usize;
        let params = &mut self.backend.params;
        let (iterations, friction, warmstart) = match self.solver {
            ConstraintSolver::SequentialImpulse => (iterations, 0, 1.0),
            ConstraintSolver::NonsmoothConjugateGradient => (iterations, 4, 1.0),
            ConstraintSolver::ProjectedGaussSeidel => (iterations, 0, 0.0),
            ConstraintSolver::Dantzig => (iterations * 2, 0, 1.0),
        };
        params.num_solver_iterations = NonZeroUsize::new(iterations).unwrap_or(NonZeroUsize::MIN);
        params.num_additional_friction_iterations = friction;
        params.warmstart_coefficient = warmstart;
        params.min_island_size = if self.deterministic { usize::MAX } else { 128 };
    }

    // ---- Global toggles ----

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn debug_draw_mode(&self) -> DebugDrawMode {
        self.debug_mode
    }

    pub fn set_debug_draw_mode(&mut self, mode: DebugDrawMode) {
        self.debug_mode = mode;
    }

    /// Push the no-deactivation and CCD flags to every attached body.
    pub(crate) fn set_body_flags(&mut self, store: &ObjectStore, no_deactivation: bool, ccd: bool) {
        self.no_deactivation = no_deactivation;
        self.ccd_enabled = ccd;
        for handle in &self.members {
            let Some(collidable) = store.collidables.get(handle) else {
                continue;
            };
            let ccd = collidable.ccd_parameters().filter(|_| ccd);
            let never_sleeps = no_deactivation || collidable.kind == crate::CollidableKind::Character;
            if let Some(rb) = collidable
                .body_handle()
                .and_then(|h| self.backend.bodies.get_mut(h))
            {
                configure_body(rb, ccd, never_sleeps);
            }
        }
    }

    // ---- Signals ----

    /// Fired at the start of every substep.
    pub fn pre_step(&mut self) -> &mut StepSignal {
        &mut self.pre_step
    }

    /// Fired at the end of every substep, after time has advanced.
    pub fn post_step(&mut self) -> &mut StepSignal {
        &mut self.post_step
    }

    // ---- Membership ----

    pub fn members(&self) -> impl Iterator<Item = CollidableHandle> + '_ {
        self.members.iter().copied()
    }

    pub fn constraints(&self) -> impl Iterator<Item = ConstraintHandle> + '_ {
        self.constraints.iter().copied()
    }

    pub fn contains(&self, handle: CollidableHandle) -> bool {
        self.members.contains(&handle)
    }

    /// Move a detached collidable's body into this world.
    pub(crate) fn insert_collidable(&mut self, handle: CollidableHandle, c: &mut Collidable) -> bool {
        if let Some(world) = c.world {
            tracing::warn!(collidable = %handle, %world, "collidable is already in a world");
            return false;
        }
        let groups = self.object_groups(c.filter_bit, c.filter_class());
        let colliders = c.build_colliders(handle, groups);
        let ccd = c.ccd_parameters().filter(|_| self.ccd_enabled);
        let never_sleeps = self.no_deactivation || c.kind == crate::CollidableKind::Character;

        if let Some(state) = c.rigid_mut() {
            let placeholder = BodySlot::Attached {
                handle: RigidBodyHandle::invalid(),
                colliders: Vec::new(),
            };
            let mut rb = match std::mem::replace(&mut state.slot, placeholder) {
                BodySlot::Detached(rb) => *rb,
                attached => {
                    state.slot = attached;
                    return false;
                }
            };
            configure_body(&mut rb, ccd, never_sleeps);
            if state.gravity.is_some() {
                rb.set_gravity_scale(0.0, false);
            }
            let body = self.backend.bodies.insert(rb);
            let mut handles = Vec::with_capacity(colliders.len());
            for (collider, part) in colliders.into_iter().zip(&state.parts) {
                let ch = self
                    .backend
                    .colliders
                    .insert_with_parent(collider, body, &mut self.backend.bodies);
                if let Some(materials) = &part.materials {
                    self.surface_materials.insert(ch, Arc::clone(materials));
                }
                handles.push(ch);
            }
            state.slot = BodySlot::Attached {
                handle: body,
                colliders: handles,
            };
            self.backend.refresh_queries();
        }

        c.world = Some(self.handle);
        self.members.insert(handle);
        self.member_layers.insert(handle, c.filter_bit);
        tracing::trace!(world = %self.handle, collidable = %handle, "added collidable");
        true
    }

    /// Take a member's body back out of the backend. Joints attached to it
    /// must already be removed.
    pub(crate) fn remove_collidable(&mut self, handle: CollidableHandle, c: &mut Collidable) -> bool {
        if c.world != Some(self.handle) || !self.members.remove(&handle) {
            tracing::warn!(world = %self.handle, collidable = %handle, "collidable is not in this world");
            return false;
        }
        c.world = None;
        self.member_layers.remove(&handle);
        if let Some(state) = c.rigid_mut() {
            if let BodySlot::Attached { handle: body, colliders } = &state.slot {
                for collider in colliders {
                    self.surface_materials.remove(collider);
                }
                match self.backend.take_body(*body, colliders) {
                    Some(rb) => state.slot = BodySlot::Detached(Box::new(rb)),
                    None => tracing::error!(collidable = %handle, "backend body vanished"),
                }
            }
        }
        tracing::trace!(world = %self.handle, collidable = %handle, "removed collidable");
        true
    }

    /// Insert a constraint whose bodies are already members.
    pub(crate) fn insert_constraint(
        &mut self,
        handle: ConstraintHandle,
        c: &mut Constraint,
        bodies: [Option<RigidBodyHandle>; 2],
    ) -> bool {
        if let Some(world) = c.world {
            tracing::warn!(constraint = %handle, %world, "constraint is already in a world");
            return false;
        }
        c.dt = self.frame_time_delta();
        let body1 = bodies[0].unwrap_or(self.backend.ground);
        let body2 = bodies[1].unwrap_or(self.backend.ground);
        let joint = self
            .backend
            .impulse_joints
            .insert(body1, body2, c.build_joint(), true);
        c.joint = Some(joint);
        c.world = Some(self.handle);
        self.constraints.insert(handle);
        true
    }

    pub(crate) fn remove_constraint(&mut self, handle: ConstraintHandle, c: &mut Constraint) -> bool {
        if c.world != Some(self.handle) || !self.constraints.remove(&handle) {
            tracing::warn!(world = %self.handle, constraint = %handle, "constraint is not in this world");
            return false;
        }
        if let Some(joint) = c.joint.take() {
            self.backend.impulse_joints.remove(joint, true);
        }
        c.world = None;
        true
    }

    /// Zero the accumulator and simulated time and drop cached contacts.
    pub fn reset(&mut self) {
        self.accumulator.reset();
        self.time.reset();
        self.backend.islands = rapier3d::prelude::IslandManager::new();
        self.backend.ccd_solver = rapier3d::prelude::CCDSolver::new();
    }

    // ---- Stepping ----

    /// Advance by `frame_time` seconds in fixed substeps. Returns the
    /// substeps run and any dropped for exceeding the cap.
    pub(crate) fn step_simulation(&mut self, store: &mut ObjectStore, frame_time: f32) -> StepBudget {
        if !self.enabled {
            return StepBudget::default();
        }
        self.accumulator.accumulate(f64::from(frame_time));
        let budget = self.accumulator.drain();
        if budget.dropped > 0 {
            tracing::debug!(world = %self.handle, dropped = budget.dropped, "substep cap reached");
        }
        let dt = self.frame_time_delta();
        let step_nanos = self.accumulator.timestep_nanos();
        for _ in 0..budget.steps {
            self.substep(store, dt, step_nanos);
        }
        if budget.steps > 0 {
            self.clear_user_forces(store);
        }
        budget
    }

    fn substep(&mut self, store: &mut ObjectStore, dt: f32, step_nanos: u64) {
        self.pre_step.emit(dt);
        self.step_soft_bodies(store, dt);
        self.apply_rolling_resistance(store, dt);
        for handle in &self.members {
            if let Some(state) = store.collidables.get(handle).and_then(Collidable::rigid) {
                apply_custom_gravity(state, &mut self.backend, dt);
            }
        }
        self.backend.step();
        for handle in &self.constraints {
            if let Some(c) = store.constraints.get_mut(handle) {
                c.check_break(*handle, &mut self.backend);
            }
        }
        self.time.advance(step_nanos);
        dispatch::dispatch_contacts(&self.backend, store);
        self.post_step.emit(dt);
    }

    fn step_soft_bodies(&mut self, store: &mut ObjectStore, dt: f32) {
        let gravity = from_na(&self.backend.gravity);
        for handle in &self.members {
            let Some(collidable) = store.collidables.get_mut(handle) else {
                continue;
            };
            let groups = filter::object_groups(
                collidable.filter_bit,
                FilterClass::SoftBody,
                self.collision_filter_mask(collidable.filter_bit),
            );
            if let Body::Soft(body) = &mut collidable.body {
                let backend = &self.backend;
                body.step(dt, gravity, &mut |p, thickness| {
                    collide_node(backend, groups, p, thickness)
                });
            }
        }
    }

    /// Angular-velocity decay standing in for rolling and spinning friction.
    fn apply_rolling_resistance(&mut self, store: &ObjectStore, dt: f32) {
        let g = self.backend.gravity.norm();
        let mut normals: BTreeMap<CollidableHandle, Vec3> = BTreeMap::new();
        for pair in self.backend.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let Some(manifold) = pair.manifolds.iter().find(|m| !m.points.is_empty()) else {
                continue;
            };
            let normal = from_na(&manifold.data.normal);
            for collider in [pair.collider1, pair.collider2] {
                if let Some(owner) = self.backend.owner_of(collider) {
                    normals.entry(owner).or_insert(normal);
                }
            }
        }
        for (handle, normal) in normals {
            let Some(c) = store.collidables.get(&handle) else {
                continue;
            };
            let (rolling, spinning) = (c.material.rolling_friction, c.material.spinning_friction);
            if rolling <= 0.0 && spinning <= 0.0 {
                continue;
            }
            let (Some(state), Some(body)) = (c.rigid(), c.body_handle()) else {
                continue;
            };
            if let Some(rb) = self.backend.bodies.get_mut(body) {
                decay_spin(rb, state, normal, rolling, spinning, g * dt);
            }
        }
    }

    fn clear_user_forces(&mut self, store: &ObjectStore) {
        for handle in &self.members {
            if let Some(rb) = store
                .collidables
                .get(handle)
                .and_then(Collidable::body_handle)
                .and_then(|h| self.backend.bodies.get_mut(h))
            {
                rb.reset_forces(false);
                rb.reset_torques(false);
            }
        }
    }
}

/// Wake a body and set its CCD and sleep behaviour.
fn configure_body(rb: &mut RigidBody, ccd: Option<(Real, Real)>, never_sleeps: bool) {
    rb.enable_ccd(ccd.is_some());
    rb.set_soft_ccd_prediction(ccd.map_or(0.0, |(_, swept)| swept));
    let activation = rb.activation_mut();
    if never_sleeps {
        activation.normalized_linear_threshold = -1.0;
        activation.angular_threshold = -1.0;
    } else {
        activation.normalized_linear_threshold =
            RigidBodyActivation::default_normalized_linear_threshold();
        activation.angular_threshold = RigidBodyActivation::default_angular_threshold();
    }
    if rb.is_dynamic() {
        rb.wake_up(true);
    }
}

/// Reduce angular speed about the contact normal (spinning) and across it
/// (rolling) by `coef·|g|·dt / r`.
fn decay_spin(
    rb: &mut RigidBody,
    state: &RigidState,
    normal: Vec3,
    rolling: f32,
    spinning: f32,
    g_dt: f32,
) {
    if !rb.is_dynamic() || state.radius <= 0.0 {
        return;
    }
    let w = from_na(rb.angvel());
    let spin = normal * w.dot(normal);
    let roll = w - spin;
    let shrink = |v: Vec3, coef: f32| {
        let len = v.length();
        let step = coef * g_dt / state.radius;
        if len <= step {
            Vec3::ZERO
        } else {
            v * ((len - step) / len)
        }
    };
    let w = shrink(spin, spinning) + shrink(roll, rolling);
    rb.set_angvel(to_na(w), false);
}

/// Push a soft-body node out of the nearest world collider it is within
/// `thickness` of. Positions in physics units.
fn collide_node(
    backend: &WorldBackend,
    groups: InteractionGroups,
    p: Vec3,
    thickness: f32,
) -> NodeCollision {
    let point = rapier3d::prelude::Point::from(to_na(p));
    let margin = to_na(Vec3::splat(thickness));
    let aabb = Aabb::new(point - margin, point + margin);
    let mut best: NodeCollision = None;
    let mut best_depth = 0.0;
    backend
        .query_pipeline
        .colliders_with_aabb_intersecting_aabb(&aabb, |&handle| {
            let Some(collider) = backend.colliders.get(handle) else {
                return true;
            };
            if collider.is_sensor() || !groups.test(collider.collision_groups()) {
                return true;
            }
            let proj = collider
                .shape()
                .project_point(collider.position(), &point, false);
            let offset = from_na(&(point - proj.point));
            let dist = offset.length();
            let (normal, depth) = if proj.is_inside {
                (-offset.normalize_or_zero(), thickness + dist)
            } else if dist < thickness {
                (offset.normalize_or_zero(), thickness - dist)
            } else {
                return true;
            };
            if normal != Vec3::ZERO && depth > best_depth {
                best_depth = depth;
                best = Some((from_na(&proj.point.coords) + normal * thickness, normal));
            }
            true
        });
    best
}
