//! Primitive body spawn helpers for tests.
//!
//! Every helper allocates its own unnamed collider, creates the collidable
//! and adds it to the world. Dimensions are in system units.

use glam::Vec3;
use impulse_physics::{
    CollidableDesc, CollidableHandle, Collider, PhysicsSystem, ShapeDesc, WorldHandle,
};

/// Spawn a box body with the given half extents. Zero mass makes it static.
///
/// # Panics
///
/// Panics if the dimensions are invalid or the world does not exist.
pub fn spawn_box(
    system: &mut PhysicsSystem,
    world: WorldHandle,
    origin: Vec3,
    half_extents: Vec3,
    mass: f32,
) -> CollidableHandle {
    let collider = Collider::create_box(Vec3::ZERO, half_extents, 0.0).expect("valid box");
    spawn_desc(
        system,
        world,
        collider,
        |shape| CollidableDesc::rigid_body(vec![shape], mass).with_origin(origin),
    )
}

/// Spawn a sphere body.
///
/// # Panics
///
/// Panics if the radius is invalid or the world does not exist.
pub fn spawn_sphere(
    system: &mut PhysicsSystem,
    world: WorldHandle,
    origin: Vec3,
    radius: f32,
    mass: f32,
) -> CollidableHandle {
    let collider = Collider::create_sphere(Vec3::ZERO, radius).expect("valid sphere");
    spawn_desc(
        system,
        world,
        collider,
        |shape| CollidableDesc::rigid_body(vec![shape], mass).with_origin(origin),
    )
}

/// Spawn a static 20 m × 20 m slab whose top face sits at `z`.
///
/// # Panics
///
/// Panics if the world does not exist.
pub fn spawn_ground(system: &mut PhysicsSystem, world: WorldHandle, z: f32) -> CollidableHandle {
    let half = Vec3::new(1000.0, 1000.0, 50.0);
    spawn_box(system, world, Vec3::new(0.0, 0.0, z - half.z), half, 0.0)
}

fn spawn_desc(
    system: &mut PhysicsSystem,
    world: WorldHandle,
    collider: Collider,
    desc: impl FnOnce(ShapeDesc) -> CollidableDesc,
) -> CollidableHandle {
    let id = system.colliders_mut().alloc_unnamed_collider(collider);
    let handle = system
        .create_collidable(&desc(ShapeDesc::new(id)))
        .expect("collidable builds");
    assert!(system.add_to_world(handle, world), "world exists");
    handle
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{test_system, test_world};

    #[test]
    fn spawned_bodies_join_the_world() {
        let mut system = test_system();
        let world = test_world(&mut system);
        let ground = spawn_ground(&mut system, world, 0.0);
        let ball = spawn_sphere(&mut system, world, Vec3::Z * 100.0, 10.0, 1.0);

        let ground = system.collidable(ground).unwrap();
        assert!(ground.is_static());
        assert!((ground.aabb().max.z).abs() < 1e-3);
        let ball = system.collidable(ball).unwrap();
        assert_eq!(ball.world(), Some(world));
        assert!((ball.origin().z - 100.0).abs() < 1e-3);
    }
}
