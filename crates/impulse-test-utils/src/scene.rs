//! System and world builders plus stepping helpers.

use std::sync::Arc;

use glam::Vec3;
use impulse_core::config::PhysicsConfig;
use impulse_core::mesh::{MeshLibrary, TriMesh};
use impulse_core::time::StepBudget;
use impulse_physics::{PhysicsSystem, WorldHandle};

/// Frame time used by the stepping helpers: one substep at the default
/// 50 Hz rate.
pub const FRAME: f32 = 0.02;

/// Mesh names registered by [`test_system`].
pub const CRATE_MESH: &str = "crate";
pub const FLOOR_MESH: &str = "floor";

/// A system with default config whose mesh library holds a 50 cm crate
/// (`"crate"`) and a 10 m × 10 m floor grid (`"floor"`).
pub fn test_system() -> PhysicsSystem {
    test_system_with(PhysicsConfig::default())
}

/// Like [`test_system`] with a custom configuration.
///
/// # Panics
///
/// Panics if `config` does not validate.
pub fn test_system_with(config: PhysicsConfig) -> PhysicsSystem {
    let mut system = PhysicsSystem::new(config).expect("test config must validate");
    let mut library = MeshLibrary::new();
    library.insert(TriMesh::cuboid(CRATE_MESH, Vec3::splat(25.0)));
    library.insert(TriMesh::grid(FLOOR_MESH, 1000.0, 1000.0, 4, 4));
    system.init(Arc::new(library));
    system
}

/// Create a world in `system`.
pub fn test_world(system: &mut PhysicsSystem) -> WorldHandle {
    system.create_world()
}

/// Step `frames` frames of [`FRAME`] seconds. Returns the substeps run.
pub fn step_frames(system: &mut PhysicsSystem, world: WorldHandle, frames: usize) -> u32 {
    (0..frames)
        .map(|_| system.step_simulation(world, FRAME).steps)
        .sum()
}

/// Step whole frames covering `seconds`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn step_seconds(system: &mut PhysicsSystem, world: WorldHandle, seconds: f32) -> StepBudget {
    let frames = (seconds / FRAME).round() as usize;
    let mut total = StepBudget::default();
    for _ in 0..frames {
        let budget = system.step_simulation(world, FRAME);
        total.steps += budget.steps;
        total.dropped += budget.dropped;
    }
    total
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
