// impulse-physics: Rigid-body, soft-body and constraint simulation on top of
// rapier3d.
//
// A `PhysicsSystem` owns worlds, collidables, constraints and the shared
// collider cache and hands out small `Copy` handles to each. Worlds step in
// fixed substeps, answer ray, sweep and overlap queries, and deliver contact
// points to collision listeners. Every value crossing the public API is in
// system units (centimetres); the backend works in metres.

pub mod collidable;
pub mod collider;
pub mod constraint;
pub mod filter;
pub mod handles;
pub mod listener;
pub mod signal;
pub mod system;
pub mod units;
pub mod world;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        collidable::{
            CharacterDesc, CollidableDesc, CollidableKind, CollidableMut, CollidableRef,
            ShapeDesc, SoftBody, SoftBodyDesc,
        },
        collider::{Collider, ColliderManager, ColliderType},
        constraint::{ConstraintDesc, ConstraintKind, ConstraintMut, ConstraintRef},
        filter::MAX_FILTER_LAYERS,
        handles::{CollidableHandle, ColliderId, ConstraintHandle, WorldHandle},
        listener::{CollisionListener, Contact},
        signal::{SlotId, StepSignal},
        system::PhysicsSystem,
        world::{debug::DebugLineSink, query::CastResult, PhysicsWorld},
    };
    pub use impulse_core::prelude::*;
}

pub use collidable::{CollidableDesc, CollidableKind, ShapeDesc};
pub use collider::{Collider, ColliderManager};
pub use constraint::{ConstraintDesc, ConstraintKind};
pub use handles::{CollidableHandle, ColliderId, ConstraintHandle, WorldHandle};
pub use system::PhysicsSystem;
pub use world::PhysicsWorld;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the prelude re-exports compile.
    #[test]
    fn prelude_exports() {
        use prelude::*;

        fn _accepts_listener(_: &dyn CollisionListener) {}
        fn _accepts_sink(_: &mut dyn DebugLineSink) {}

        let system = PhysicsSystem::new(PhysicsConfig::default()).unwrap();
        assert_eq!(system.worlds().count(), 0);
        let _desc = ConstraintDesc::new(ConstraintKind::Hinge, None, Some(CollidableHandle(0)));
    }
}
