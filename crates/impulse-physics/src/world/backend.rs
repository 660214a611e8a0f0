//! All rapier pipeline state of one world.

use rapier3d::prelude::{
    CCDSolver, ColliderHandle, ColliderSet, DefaultBroadPhase, ImpulseJointSet,
    IntegrationParameters, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline,
    QueryPipeline, Real, RigidBody, RigidBodyBuilder, RigidBodyHandle, RigidBodySet, Vector,
};

use crate::handles::CollidableHandle;

// ---------------------------------------------------------------------------
// WorldBackend
// ---------------------------------------------------------------------------

/// Rapier sets and pipeline objects, in physics units.
///
/// `PhysicsPipeline::step()` requires mutable access to every set at once,
/// so they all live together.
pub struct WorldBackend {
    // -- Rapier sets --
    pub(crate) bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    pub(crate) impulse_joints: ImpulseJointSet,
    pub(crate) multibody_joints: MultibodyJointSet,

    // -- Pipeline objects --
    pub(crate) pipeline: PhysicsPipeline,
    pub(crate) islands: IslandManager,
    pub(crate) broad_phase: DefaultBroadPhase,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) ccd_solver: CCDSolver,
    pub(crate) query_pipeline: QueryPipeline,

    // -- Parameters --
    pub(crate) params: IntegrationParameters,
    pub(crate) gravity: Vector<Real>,

    /// Fixed body standing in for "the world" in single-body joints.
    pub(crate) ground: RigidBodyHandle,
}

impl WorldBackend {
    pub(crate) fn new(gravity: Vector<Real>, dt: Real) -> Self {
        let mut params = IntegrationParameters::default();
        params.dt = dt;

        let mut bodies = RigidBodySet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build());

        Self {
            bodies,
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            params,
            gravity,
            ground,
        }
    }

    /// Run one pipeline substep and refresh the query pipeline.
    pub(crate) fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    /// Make membership changes visible to queries before the next step.
    pub(crate) fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    /// Detach and return a body together with its colliders and joints.
    pub(crate) fn take_body(
        &mut self,
        body: RigidBodyHandle,
        colliders: &[ColliderHandle],
    ) -> Option<RigidBody> {
        for &collider in colliders {
            self.colliders
                .remove(collider, &mut self.islands, &mut self.bodies, false);
        }
        let removed = self.bodies.remove(
            body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.refresh_queries();
        removed
    }

    /// Owning collidable of a backend collider.
    pub(crate) fn owner_of(&self, collider: ColliderHandle) -> Option<CollidableHandle> {
        self.colliders
            .get(collider)
            .and_then(|c| CollidableHandle::from_user_data(c.user_data))
    }

    /// Drop every body, collider and joint except the ground body.
    pub(crate) fn clear(&mut self) {
        let gravity = self.gravity;
        let params = self.params;
        *self = Self::new(gravity, params.dt);
        self.params = params;
    }
}

impl std::fmt::Debug for WorldBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldBackend")
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("impulse_joints", &self.impulse_joints.len())
            .field("gravity", &self.gravity)
            .finish_non_exhaustive()
    }
}
