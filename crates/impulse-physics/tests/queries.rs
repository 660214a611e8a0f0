//! Integration test: world queries and collision filtering.
//!
//! Builds a floor with a few bodies on it and checks that:
//! 1. Ray casts report the nearest hit, in system units, skipping `me`
//! 2. Sweeps stop at the first surface and report its normal
//! 3. Overlap and check queries agree with each other
//! 4. Filter-table masks remove hits and contacts on both sides
//! 5. Queries present the caller's own filter layer
//! 6. Sensors see overlapping bodies but never block queries

use approx::assert_relative_eq;
use glam::{Mat3, Vec3};
use impulse_physics::filter::ALL_LAYERS;
use impulse_physics::{CollidableDesc, Collider, ShapeDesc};
use impulse_test_utils::{
    recording_listener, spawn_box, spawn_ground, spawn_sphere, step_frames, test_system, test_world,
};

#[test]
fn ray_cast_hits_ground_in_system_units() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let ground = spawn_ground(&mut system, world, 0.0);
    step_frames(&mut system, world, 1);

    let w = system.world(world).unwrap();
    let hit = w
        .ray_cast(None, Vec3::Z * 100.0, Vec3::Z * -100.0, ALL_LAYERS)
        .expect("ray hits the floor");
    assert_eq!(hit.hit, ground);
    assert_relative_eq!(hit.end_pos.z, 0.0, epsilon = 1e-3);
    assert_relative_eq!(hit.fraction, 0.5, epsilon = 1e-4);
    assert_relative_eq!(hit.normal.z, 1.0, epsilon = 1e-4);

    // Degenerate and masked rays hit nothing.
    assert!(w
        .ray_cast(None, Vec3::Z * 100.0, Vec3::Z * 100.0, ALL_LAYERS)
        .is_none());
    assert!(w
        .ray_cast(None, Vec3::Z * 100.0, Vec3::Z * -100.0, 0)
        .is_none());
}

#[test]
fn ray_cast_skips_caller_and_orders_hits() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let ground = spawn_ground(&mut system, world, 0.0);
    let upper = spawn_box(&mut system, world, Vec3::Z * 200.0, Vec3::splat(20.0), 0.0);
    let lower = spawn_box(&mut system, world, Vec3::Z * 100.0, Vec3::splat(20.0), 0.0);
    step_frames(&mut system, world, 1);

    let w = system.world(world).unwrap();
    let start = Vec3::Z * 400.0;
    let end = Vec3::Z * -50.0;
    assert_eq!(w.ray_cast(None, start, end, ALL_LAYERS).unwrap().hit, upper);
    assert_eq!(w.ray_cast(Some(upper), start, end, ALL_LAYERS).unwrap().hit, lower);

    let all: Vec<_> = w
        .ray_cast_all(None, start, end, ALL_LAYERS)
        .into_iter()
        .map(|h| h.hit)
        .collect();
    assert_eq!(all, vec![upper, lower, ground]);
}

#[test]
fn sweeps_stop_at_first_surface() {
    let mut system = test_system();
    let world = test_world(&mut system);
    spawn_ground(&mut system, world, 0.0);
    let wall = spawn_box(
        &mut system,
        world,
        Vec3::new(200.0, 0.0, 100.0),
        Vec3::new(10.0, 100.0, 100.0),
        0.0,
    );
    step_frames(&mut system, world, 1);
    let w = system.world(world).unwrap();

    let start = Vec3::new(0.0, 0.0, 50.0);
    let end = Vec3::new(400.0, 0.0, 50.0);
    let hit = w.sphere_cast(None, 20.0, start, end, ALL_LAYERS).unwrap();
    assert_eq!(hit.hit, wall);
    // The sphere centre stops one radius short of the wall face at x = 190.
    assert_relative_eq!(hit.fraction, 170.0 / 400.0, epsilon = 1e-3);
    assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-3);

    let boxed = w
        .box_cast(None, Vec3::splat(10.0), Mat3::IDENTITY, start, end, ALL_LAYERS)
        .unwrap();
    assert_eq!(boxed.hit, wall);
    assert_relative_eq!(boxed.fraction, 180.0 / 400.0, epsilon = 1e-3);

    let capsule = Collider::create_capsule(Vec3::ZERO, 10.0, 20.0).unwrap();
    let swept = w
        .convex_cast(None, &capsule, Mat3::IDENTITY, start, end, ALL_LAYERS)
        .unwrap();
    assert_eq!(swept.hit, wall);

    let all = w.convex_cast_all(
        None,
        &capsule,
        Mat3::IDENTITY,
        Vec3::new(0.0, 0.0, 300.0),
        Vec3::new(400.0, 0.0, -300.0),
        ALL_LAYERS,
    );
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].hit, wall);
    assert!(all[0].fraction <= all[1].fraction);
}

#[test]
fn overlap_and_check_agree() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let a = spawn_box(&mut system, world, Vec3::new(0.0, 0.0, 500.0), Vec3::splat(20.0), 0.0);
    let b = spawn_sphere(&mut system, world, Vec3::new(60.0, 0.0, 500.0), 20.0, 0.0);
    step_frames(&mut system, world, 1);
    let w = system.world(world).unwrap();

    let mut near = w.overlap_sphere(Vec3::new(30.0, 0.0, 500.0), 15.0, ALL_LAYERS);
    near.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(near, expected);
    assert!(w.check_sphere(Vec3::new(30.0, 0.0, 500.0), 15.0, ALL_LAYERS));

    let half = Vec3::splat(15.0);
    let only_box = w.overlap_box(Vec3::new(-30.0, 0.0, 500.0), half, Mat3::IDENTITY, ALL_LAYERS);
    assert_eq!(only_box, vec![a]);
    assert!(!w.check_box(Vec3::new(0.0, 300.0, 500.0), half, Mat3::IDENTITY, ALL_LAYERS));
}

#[test]
fn one_sided_mask_separates_both_ways() {
    let mut system = test_system();
    let world = test_world(&mut system);
    {
        let w = system.world_mut(world).unwrap();
        // Layer 1 ignores layer 2 while layer 2 still lists layer 1.
        w.set_collision_filter_mask(1, ALL_LAYERS & !(1 << 2));
        w.set_collision_filter_mask(2, ALL_LAYERS);
    }

    let floor = Collider::create_box(Vec3::ZERO, Vec3::new(500.0, 500.0, 10.0), 0.0).unwrap();
    let floor = system.colliders_mut().alloc_unnamed_collider(floor);
    let mut desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(floor)], 0.0);
    desc.collision_filter_bit = 1;
    let floor = system.create_collidable(&desc).unwrap();
    assert!(system.add_to_world(floor, world));

    let ball = Collider::create_sphere(Vec3::ZERO, 10.0).unwrap();
    let ball = system.colliders_mut().alloc_unnamed_collider(ball);
    let mut desc =
        CollidableDesc::rigid_body(vec![ShapeDesc::new(ball)], 1.0).with_origin(Vec3::Z * 30.0);
    desc.collision_filter_bit = 2;
    let ball = system.create_collidable(&desc).unwrap();
    assert!(system.add_to_world(ball, world));

    let (listener, log) = recording_listener();
    system
        .collidable_mut(ball)
        .unwrap()
        .set_collision_listener(Some(listener));
    step_frames(&mut system, world, 50);

    assert!(log.is_empty());
    assert!(system.collidable(ball).unwrap().origin().z < -100.0);

    // A query that includes layer 1 still sees the floor.
    let w = system.world(world).unwrap();
    let hit = w.ray_cast(None, Vec3::Z * 100.0, Vec3::Z * -100.0, 1 << 1).unwrap();
    assert_eq!(hit.hit, floor);
    assert!(w.ray_cast(None, Vec3::Z * 100.0, Vec3::Z * -100.0, 1 << 3).is_none());
}

#[test]
fn queries_use_the_callers_layer() {
    let mut system = test_system();
    let world = test_world(&mut system);
    // Layer 2 only lists layer 1, not the default layer.
    system
        .world_mut(world)
        .unwrap()
        .set_collision_filter_mask(2, 1 << 1);

    let slab = Collider::create_box(Vec3::ZERO, Vec3::new(200.0, 200.0, 10.0), 0.0).unwrap();
    let slab = system.colliders_mut().alloc_unnamed_collider(slab);
    let mut desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(slab)], 0.0);
    desc.collision_filter_bit = 2;
    let slab = system.create_collidable(&desc).unwrap();
    assert!(system.add_to_world(slab, world));

    let marker = Collider::create_sphere(Vec3::ZERO, 5.0).unwrap();
    let marker = system.colliders_mut().alloc_unnamed_collider(marker);
    let mut desc = CollidableDesc::rigid_body(vec![ShapeDesc::new(marker)], 0.0)
        .with_origin(Vec3::new(1000.0, 0.0, 0.0));
    desc.collision_filter_bit = 1;
    let caster = system.create_collidable(&desc).unwrap();
    assert!(system.add_to_world(caster, world));
    step_frames(&mut system, world, 1);

    let w = system.world(world).unwrap();
    let mask = w.collision_filter_mask(1);
    let (from, to) = (Vec3::Z * 100.0, Vec3::Z * -100.0);

    let hit = w.ray_cast(Some(caster), from, to, mask).unwrap();
    assert_eq!(hit.hit, slab);
    assert_relative_eq!(hit.end_pos.z, 10.0, epsilon = 1e-2);
    let swept = w.sphere_cast(Some(caster), 5.0, from, to, mask).unwrap();
    assert_eq!(swept.hit, slab);

    // The same ray from the default layer is refused by the slab.
    assert!(w.ray_cast(None, from, to, mask).is_none());
}

#[test]
fn sensors_report_overlaps_but_do_not_block() {
    let mut system = test_system();
    let world = test_world(&mut system);
    spawn_ground(&mut system, world, 0.0);
    let resting = spawn_box(&mut system, world, Vec3::Z * 25.0, Vec3::splat(25.0), 5.0);

    let zone = Collider::create_box(Vec3::ZERO, Vec3::splat(100.0), 0.0).unwrap();
    let zone = system.colliders_mut().alloc_unnamed_collider(zone);
    let desc = CollidableDesc::sensor(vec![ShapeDesc::new(zone)]).with_origin(Vec3::Z * 50.0);
    let sensor = system.create_collidable(&desc).unwrap();
    assert!(system.add_to_world(sensor, world));
    step_frames(&mut system, world, 5);

    assert!(system.sensor_overlaps(sensor).contains(&resting));
    assert!(!system.sensor_overlaps(sensor).contains(&sensor));

    let w = system.world(world).unwrap();
    let hit = w
        .ray_cast(None, Vec3::Z * 140.0, Vec3::Z * -10.0, ALL_LAYERS)
        .unwrap();
    assert_eq!(hit.hit, resting);

    // Sensor queries on non-sensors are refused.
    assert!(system.sensor_overlaps(resting).is_empty());
}
