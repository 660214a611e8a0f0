//! Shared test fixtures and utilities for impulse crates.
//!
//! Provides reusable helpers for building a physics system with a stocked
//! mesh library, spawning primitive bodies, stepping worlds, recording
//! contacts, and deterministic RNG setup.

pub mod listener;
pub mod rng;
pub mod scene;
pub mod spawn;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use listener::{recording_listener, ContactLog};
pub use rng::{scatter_points, seeded_rng};
pub use scene::{step_frames, step_seconds, test_system, test_world, FRAME};
pub use spawn::{spawn_box, spawn_ground, spawn_sphere};
