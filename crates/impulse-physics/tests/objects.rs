//! Integration test: colliders, collidables and their variants.
//!
//! Exercises the object lifecycle through a `PhysicsSystem` and checks that:
//! 1. Named colliders are cached per (name, scale, hull) and ref-counted
//! 2. A collidable's nominal origin survives its off-centre centroid
//! 3. Characters slide along the ground and report being grounded
//! 4. Pinned cloth hangs from its pins and writes back into a render mesh
//! 5. Destroying a world detaches its members instead of destroying them

use approx::assert_relative_eq;
use glam::{Affine3A, Mat3, Vec3, Vec4};
use impulse_core::mesh::{Bounds, DeformableMesh, TriMesh};
use impulse_core::transform::Placement;
use impulse_physics::collidable::{CharacterDesc, SoftBodyDesc};
use impulse_physics::{CollidableDesc, CollidableKind, Collider, ShapeDesc};
use impulse_test_utils::scene::{CRATE_MESH, FLOOR_MESH};
use impulse_test_utils::{
    spawn_ground, spawn_sphere, step_frames, step_seconds, test_system, test_world,
};

#[test]
fn named_colliders_are_shared_per_key() {
    let mut system = test_system();
    let colliders = system.colliders_mut();

    let a = colliders.get_collider(CRATE_MESH, Vec3::ONE, true).unwrap();
    let b = colliders.get_collider(CRATE_MESH, Vec3::ONE, true).unwrap();
    let scaled = colliders.get_collider(CRATE_MESH, Vec3::splat(2.0), true).unwrap();
    let exact = colliders.get_collider(CRATE_MESH, Vec3::ONE, false).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, scaled);
    assert_ne!(a, exact);
    assert_eq!(colliders.refcount(a), Some(2));
    assert_eq!(colliders.find_collider(CRATE_MESH, Vec3::ONE, true), Some(a));

    let hull = colliders.collider(a).unwrap();
    assert!(hull.is_convex());
    assert_eq!(colliders.collider(scaled).unwrap().model_scale(), Vec3::splat(2.0));
    assert!(colliders.get_collider("missing", Vec3::ONE, true).is_err());

    // Deferred release keeps the entry until unused colliders are swept.
    assert!(colliders.release_collider(a, false));
    assert!(colliders.release_collider(a, false));
    assert_eq!(colliders.refcount(a), Some(0));
    assert!(colliders.collider(a).is_some());
    assert!(colliders.destroy_unused_colliders() >= 1);
    assert!(colliders.collider(a).is_none());
    assert!(colliders.find_collider(CRATE_MESH, Vec3::ONE, true).is_none());
}

#[test]
fn floor_mesh_loads_as_static_triangle_mesh() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let floor = system
        .colliders_mut()
        .get_collider(FLOOR_MESH, Vec3::ONE, false)
        .unwrap();
    assert!(!system.colliders().collider(floor).unwrap().is_convex());

    let handle = system
        .create_collidable(&CollidableDesc::rigid_body(vec![ShapeDesc::new(floor)], 0.0))
        .unwrap();
    assert!(system.add_to_world(handle, world));
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 50.0, 10.0, 1.0);
    step_seconds(&mut system, world, 2.0);
    assert_relative_eq!(system.collidable(ball).unwrap().origin().z, 10.0, epsilon = 1.5);
}

#[test]
fn origin_round_trips_through_centroid() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let offset = Collider::create_box(Vec3::Z * 10.0, Vec3::splat(5.0), 0.0).unwrap();
    assert_eq!(offset.centroid(), Vec3::Z * 10.0);
    let id = system.colliders_mut().alloc_unnamed_collider(offset);

    let axis = Mat3::from_rotation_x(std::f32::consts::FRAC_PI_2);
    let desc =
        CollidableDesc::rigid_body(vec![ShapeDesc::new(id)], 1.0).at(Vec3::Z * 100.0, axis);
    let handle = system.create_collidable(&desc).unwrap();

    // Detached and attached bodies report the same nominal pose.
    for attach in [false, true] {
        if attach {
            assert!(system.add_to_world(handle, world));
        }
        let view = system.collidable(handle).unwrap();
        assert!(view.origin().abs_diff_eq(Vec3::Z * 100.0, 1e-3));
        assert!(view.center_of_mass().abs_diff_eq(Vec3::new(0.0, -10.0, 100.0), 1e-3));
    }

    let target = Vec3::new(30.0, -20.0, 250.0);
    system.collidable_mut(handle).unwrap().set_origin(target);
    assert!(system.collidable(handle).unwrap().origin().abs_diff_eq(target, 1e-3));

    // Entity transforms see the nominal origin, not the centre of mass.
    let mut entity = Placement::default();
    system.collidable(handle).unwrap().sync_to_transform(&mut entity);
    assert!(entity.origin.abs_diff_eq(target, 1e-3));
    assert!(entity.axis.abs_diff_eq(axis, 1e-4));

    let moved = Placement::new(Vec3::Z * 40.0, Mat3::IDENTITY);
    system
        .collidable_mut(handle)
        .unwrap()
        .sync_from_transform(&moved);
    let view = system.collidable(handle).unwrap();
    assert!(view.origin().abs_diff_eq(Vec3::Z * 40.0, 1e-3));
    assert!(view.center_of_mass().abs_diff_eq(Vec3::Z * 50.0, 1e-3));
}

#[test]
fn character_walks_and_stays_grounded() {
    let mut system = test_system();
    let world = test_world(&mut system);
    spawn_ground(&mut system, world, 0.0);

    let capsule = Collider::create_capsule(Vec3::ZERO, 20.0, 100.0).unwrap();
    let capsule = system.colliders_mut().alloc_unnamed_collider(capsule);
    let desc = CollidableDesc::character(ShapeDesc::new(capsule), CharacterDesc::default())
        .with_origin(Vec3::Z * 71.0);
    let hero = system.create_collidable(&desc).unwrap();
    assert!(system.add_to_world(hero, world));
    step_frames(&mut system, world, 1);

    assert!(system.collidable(hero).unwrap().is_kinematic());
    let mut walked = Vec3::ZERO;
    for _ in 0..10 {
        walked += system.move_character(hero, Vec3::new(5.0, 0.0, -2.0)).unwrap();
        step_frames(&mut system, world, 1);
    }
    // Horizontal motion goes through; the floor stops the downward part.
    assert_relative_eq!(walked.x, 50.0, epsilon = 1.0);
    let view = system.collidable(hero).unwrap();
    assert!(view.is_grounded());
    assert!(view.origin().z > 69.0);
    assert_relative_eq!(view.origin().x, 50.0, epsilon = 1.0);

    // Only characters move this way.
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 300.0, 10.0, 1.0);
    assert!(system.move_character(ball, Vec3::X).is_none());
    assert!(!system.collidable(ball).unwrap().is_grounded());
}

struct RenderGrid {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    bounds: Bounds,
}

impl DeformableMesh for RenderGrid {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn write_vertices(&mut self, positions: &[Vec3], normals: &[Vec3], _tangents: &[Vec4]) {
        self.positions.copy_from_slice(positions);
        self.normals.copy_from_slice(normals);
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }
}

#[test]
fn pinned_cloth_hangs_and_writes_back() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let grid = TriMesh::grid("cloth", 100.0, 100.0, 4, 4);
    let positions = grid.positions();
    let vertex_count = positions.len();
    // Pin the two corners of the first row.
    let mut desc = SoftBodyDesc::from_mesh(positions, grid.indices());
    desc.pinned = vec![0, 4];
    let cloth = system
        .create_collidable(&CollidableDesc::soft_body(desc, 1.0).with_origin(Vec3::Z * 500.0))
        .unwrap();
    assert_eq!(system.collidable(cloth).unwrap().kind(), CollidableKind::SoftBody);
    assert!(system.add_to_world(cloth, world));

    step_seconds(&mut system, world, 1.0);
    let view = system.collidable(cloth).unwrap();
    let body = view.soft_body().unwrap();
    assert_eq!(body.vertex_count(), vertex_count);
    let pin = body.node_of_vertex(0).unwrap();
    let pinned_at = body.node_position(pin).unwrap();
    assert!(pinned_at.abs_diff_eq(Vec3::new(-50.0, -50.0, 500.0), 1e-3));
    let far = body.node_of_vertex(vertex_count - 1).unwrap();
    assert!(body.node_position(far).unwrap().z < 450.0);

    let mut mesh = RenderGrid {
        positions: vec![Vec3::ZERO; vertex_count],
        normals: vec![Vec3::ZERO; vertex_count],
        bounds: Bounds::EMPTY,
    };
    let world_to_local = Affine3A::from_translation(Vec3::Z * -500.0);
    assert!(system.write_soft_body_mesh(cloth, world_to_local, &mut mesh));
    assert!(mesh.positions[0].abs_diff_eq(Vec3::new(-50.0, -50.0, 0.0), 1e-3));
    assert!(mesh.normals.iter().all(|n| (n.length() - 1.0).abs() < 1e-3));
    assert!(!mesh.bounds.is_empty());

    let mut short = RenderGrid {
        positions: vec![Vec3::ZERO; 3],
        normals: vec![Vec3::ZERO; 3],
        bounds: Bounds::EMPTY,
    };
    assert!(!system.write_soft_body_mesh(cloth, world_to_local, &mut short));
}

#[test]
fn destroying_a_world_detaches_members() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 100.0, 10.0, 1.0);
    step_frames(&mut system, world, 5);
    let before = system.collidable(ball).unwrap().origin();

    assert!(system.destroy_world(world));
    assert!(system.world(world).is_none());
    let view = system.collidable(ball).unwrap();
    assert!(view.world().is_none());
    assert!(view.origin().abs_diff_eq(before, 1e-3));

    let fresh = test_world(&mut system);
    assert!(system.add_to_world(ball, fresh));
    assert!(system.destroy_collidable(ball));
    assert!(system.collidable(ball).is_none());
    assert_eq!(system.world(fresh).unwrap().members().count(), 0);
}
