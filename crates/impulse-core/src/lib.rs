// impulse-core: Configuration, errors, time accounting, unit scale and the
// external mesh/transform interfaces shared by the impulse physics layer.
//
// Nothing in this crate depends on the solver backend.

pub mod config;
pub mod error;
pub mod mesh;
pub mod time;
pub mod transform;
pub mod units;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        config::{ConstraintSolver, DebugDrawConfig, DebugDrawMode, PhysicsConfig},
        error::{ColliderError, ConfigError, ImpulseError, MeshError},
        mesh::{
            Bounds, CollisionMeshSource, DeformableMesh, MeshLibrary, MeshProvider, SubMesh,
            TriMesh,
        },
        time::{Accumulator, SimTime, StepBudget},
        transform::{EntityTransform, Placement},
        units::{to_physics, to_system, SYSTEM_UNIT_TO_PHYSICS_UNIT},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    /// Verify the prelude re-exports compile.
    #[test]
    fn prelude_exports() {
        use super::prelude::*;

        let cfg = PhysicsConfig::default();
        assert!(cfg.validate().is_ok());
        let _mesh = TriMesh::cuboid("unit", glam::Vec3::ONE);
        let _time = SimTime::new();
        fn _accepts_provider(_: &dyn MeshProvider) {}
    }
}
