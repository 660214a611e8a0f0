//! Deterministic RNG utilities for reproducible tests.

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `n` points drawn uniformly from the box `center ± half_extents`.
///
/// Useful for dropping a reproducible pile of bodies.
pub fn scatter_points(n: usize, center: Vec3, half_extents: Vec3, seed: u64) -> Vec<Vec3> {
    use rand::Rng;
    let mut rng = seeded_rng(seed);
    (0..n)
        .map(|_| {
            let unit = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
            );
            center + unit * half_extents
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
