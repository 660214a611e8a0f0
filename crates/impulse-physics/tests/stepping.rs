//! Integration test: fixed-substep world stepping.
//!
//! Drives full `PhysicsSystem`s through frames and checks that:
//! 1. A frame shorter than one substep runs nothing and leaves bodies alone
//! 2. A zero-length frame moves nothing and reports no contacts
//! 3. Frame spikes are clamped to the substep cap and the excess is dropped
//! 4. Below the cap, simulated time tracks the summed frame times
//! 5. A dropped body falls at the configured gravity (cm/s²)
//! 6. A body dropped onto the ground comes to rest on it
//! 7. Two identical deterministic scenes produce identical trajectories

use std::cell::Cell;
use std::rc::Rc;

use approx::assert_relative_eq;
use glam::Vec3;
use impulse_core::config::PhysicsConfig;
use impulse_physics::{CollidableHandle, PhysicsSystem, WorldHandle};
use impulse_test_utils::scene::test_system_with;
use impulse_test_utils::{
    recording_listener, scatter_points, spawn_box, spawn_ground, spawn_sphere, step_frames,
    step_seconds, test_system, test_world, FRAME,
};

#[test]
fn sub_step_frame_is_a_no_op() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 500.0, 10.0, 1.0);

    let budget = system.step_simulation(world, 0.005);
    assert_eq!(budget.steps, 0);
    assert_eq!(system.world(world).unwrap().time().nanos(), 0);
    let view = system.collidable(ball).unwrap();
    assert_eq!(view.origin(), Vec3::Z * 500.0);
    assert_eq!(view.linear_velocity(), Vec3::ZERO);

    // The residue carries over: 4 × 5 ms completes one 20 ms substep.
    let steps: u32 = (0..3)
        .map(|_| system.step_simulation(world, 0.005).steps)
        .sum();
    assert_eq!(steps, 1);
}

#[test]
fn zero_frame_emits_nothing() {
    let mut system = test_system();
    let world = test_world(&mut system);
    spawn_ground(&mut system, world, 0.0);
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 30.0, 10.0, 1.0);
    let (listener, log) = recording_listener();
    system
        .collidable_mut(ball)
        .unwrap()
        .set_collision_listener(Some(listener));
    step_frames(&mut system, world, 25);
    assert!(!log.is_empty(), "ball never touched the ground");

    log.clear();
    let (origin, velocity) = {
        let view = system.collidable(ball).unwrap();
        (view.origin(), view.linear_velocity())
    };
    let time = system.world(world).unwrap().time();

    let budget = system.step_simulation(world, 0.0);
    assert_eq!(budget.steps, 0);
    assert_eq!(budget.dropped, 0);
    assert!(log.is_empty());
    assert_eq!(system.world(world).unwrap().time(), time);
    let view = system.collidable(ball).unwrap();
    assert_eq!(view.origin(), origin);
    assert_eq!(view.linear_velocity(), velocity);
}

#[test]
fn simulated_time_tracks_frame_sum() {
    let mut system = test_system();
    let world = test_world(&mut system);
    spawn_sphere(&mut system, world, Vec3::Z * 500.0, 10.0, 1.0);

    let frames = [0.007_f32, 0.031, 0.025, 0.043, 0.013, 0.011];
    let mut steps = 0;
    for dt in frames {
        let budget = system.step_simulation(world, dt);
        assert_eq!(budget.dropped, 0);
        steps += budget.steps;
    }
    let total: f32 = frames.iter().sum();
    let simulated = system.world(world).unwrap().time().secs_f32();
    let carried = total - simulated;

    // 130 ms of frames: six 20 ms substeps with 10 ms carried over.
    assert_eq!(steps, 6);
    assert_relative_eq!(simulated, 0.12, epsilon = 1e-5);
    assert!((0.0..FRAME).contains(&carried), "carried {carried} s");
    assert_relative_eq!(carried, 0.01, epsilon = 1e-5);

    // The carried residue completes the next substep early.
    assert_eq!(system.step_simulation(world, 0.010_5).steps, 1);
}

#[test]
fn frame_spike_is_clamped() {
    let mut system = test_system();
    let world = test_world(&mut system);
    assert_eq!(system.world(world).unwrap().max_substeps(), 10);

    let budget = system.step_simulation(world, 1.0);
    assert_eq!(budget.steps, 10);
    assert_eq!(budget.dropped, 40);
    // Simulated time only advances by the substeps that ran.
    assert_relative_eq!(
        system.world(world).unwrap().time().secs_f32(),
        0.2,
        epsilon = 1e-5
    );
}

#[test]
fn substep_signals_fire_once_per_substep() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let pre = Rc::new(Cell::new(0u32));
    let post = Rc::new(Cell::new(0u32));
    {
        let w = system.world_mut(world).unwrap();
        let counter = Rc::clone(&pre);
        w.pre_step().connect(move |dt| {
            assert_relative_eq!(dt, FRAME, epsilon = 1e-6);
            counter.set(counter.get() + 1);
        });
        let counter = Rc::clone(&post);
        w.post_step().connect(move |_| counter.set(counter.get() + 1));
    }
    let budget = system.step_simulation(world, FRAME * 3.0);
    assert_eq!(budget.steps, 3);
    assert_eq!(pre.get(), 3);
    assert_eq!(post.get(), 3);
}

#[test]
fn free_fall_matches_gravity() {
    let mut system = test_system();
    let world = test_world(&mut system);
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 10_000.0, 10.0, 1.0);

    step_seconds(&mut system, world, 0.5);
    let view = system.collidable(ball).unwrap();
    // v = g·t, semi-implicit Euler.
    assert_relative_eq!(view.linear_velocity().z, -490.0, epsilon = 1.0);
    assert_relative_eq!(view.linear_velocity().x, 0.0, epsilon = 1e-3);
    let drop = 10_000.0 - view.origin().z;
    assert!((115.0..135.0).contains(&drop), "fell {drop} cm");
}

#[test]
fn body_settles_on_ground() {
    let mut system = test_system();
    let world = test_world(&mut system);
    spawn_ground(&mut system, world, 0.0);
    let crate_ = spawn_box(&mut system, world, Vec3::Z * 100.0, Vec3::splat(25.0), 10.0);

    step_seconds(&mut system, world, 3.0);
    let view = system.collidable(crate_).unwrap();
    assert_relative_eq!(view.origin().z, 25.0, epsilon = 1.5);
    assert!(view.linear_velocity().length() < 1.0);
}

#[test]
fn disabled_world_does_not_step() {
    let config = PhysicsConfig {
        enabled: false,
        ..PhysicsConfig::default()
    };
    let mut system = test_system_with(config);
    let world = test_world(&mut system);
    let ball = spawn_sphere(&mut system, world, Vec3::Z * 100.0, 10.0, 1.0);
    assert_eq!(step_frames(&mut system, world, 10), 0);
    assert_eq!(system.collidable(ball).unwrap().origin(), Vec3::Z * 100.0);
}

fn pile(system: &mut PhysicsSystem, world: WorldHandle) -> Vec<CollidableHandle> {
    spawn_ground(system, world, 0.0);
    scatter_points(12, Vec3::Z * 300.0, Vec3::new(60.0, 60.0, 200.0), 42)
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            if i % 2 == 0 {
                spawn_box(system, world, p, Vec3::splat(10.0), 2.0)
            } else {
                spawn_sphere(system, world, p, 12.0, 1.5)
            }
        })
        .collect()
}

#[test]
fn deterministic_worlds_replay_identically() {
    let config = PhysicsConfig {
        deterministic: true,
        ..PhysicsConfig::default()
    };
    let mut first = test_system_with(config.clone());
    let mut second = test_system_with(config);
    let w1 = test_world(&mut first);
    let w2 = test_world(&mut second);
    let bodies1 = pile(&mut first, w1);
    let bodies2 = pile(&mut second, w2);

    for _ in 0..120 {
        first.step_simulation(w1, FRAME);
        second.step_simulation(w2, FRAME);
    }
    for (a, b) in bodies1.iter().zip(&bodies2) {
        let a = first.collidable(*a).unwrap();
        let b = second.collidable(*b).unwrap();
        assert_eq!(a.origin(), b.origin());
        assert_eq!(a.axis(), b.axis());
        assert_eq!(a.linear_velocity(), b.linear_velocity());
    }
}
