use cgmath::prelude::*;
use hand_particles::{
    CameraSnapshot, GestureRouter, HandObservation, Handedness, Simulation, SimulationConfig,
    config::FieldParams,
    hand::{closed_hand, open_hand},
};

fn setup() -> (Simulation, GestureRouter, CameraSnapshot) {
    let (simulation, router) =
        Simulation::with_router(SimulationConfig::with_particle_count(10_000)).unwrap();
    let camera = CameraSnapshot::default_view(16.0 / 9.0).unwrap();
    (simulation, router, camera)
}

/// Check the horizontal velocity every particle picked up from a single field
/// impulse on an otherwise resting population. Returns the number of particles
/// inside and outside the radius.
fn check_single_impulse(
    simulation: &Simulation,
    center: cgmath::Vector3<f32>,
    field: &FieldParams,
    outward: bool,
) -> (usize, usize) {
    let (mut inside, mut outside) = (0, 0);
    for particle in &simulation.particles().particles {
        let offset = particle.position - center;
        let distance = offset.magnitude();
        let horizontal = cgmath::vec2(offset.x, offset.z);
        let push = cgmath::vec2(particle.velocity.x, particle.velocity.z);

        if distance >= field.radius {
            assert_eq!(push, cgmath::Vector2::zero());
            outside += 1;
            continue;
        }
        inside += 1;
        if horizontal.magnitude() <= 0.01 {
            continue;
        }

        if outward {
            assert!(horizontal.dot(push) > 0.0);
        } else {
            assert!(horizontal.dot(push) < 0.0);
        }

        // |impulse| = (radius - distance) * strength * factor, with the factor
        // jittered in [0.5, 0.5 + jitter).
        let falloff = (field.radius - distance) * field.strength;
        if falloff > 1e-4 {
            let factor = push.magnitude() * distance / (horizontal.magnitude() * falloff);
            assert!(
                (0.5 - 1e-3..=0.5 + field.jitter + 1e-3).contains(&factor),
                "jitter factor {factor} at distance {distance}"
            );
        }
    }
    (inside, outside)
}

fn left_open() -> HandObservation {
    HandObservation::new(open_hand(0.3, 0.4), Handedness::Left)
}

#[test]
fn idle_population_rests_on_the_ground() {
    let (mut simulation, mut router, camera) = setup();
    let gravity = simulation.config().integration.gravity;

    for _ in 0..200 {
        router.on_tracking_update(&[], &camera);
        let report = simulation.step();
        assert!(!report.attract_dispatched);
        assert!(!report.repel_dispatched);
    }

    for particle in &simulation.particles().particles {
        assert_eq!(particle.position.y, 0.0);
        assert_eq!(particle.velocity.x, 0.0);
        assert_eq!(particle.velocity.z, 0.0);
        assert!(particle.velocity.y.abs() <= -gravity);
    }
}

#[test]
fn opening_the_repel_hand_fires_one_local_impulse() {
    let (mut simulation, mut router, camera) = setup();
    for _ in 0..10 {
        simulation.step();
    }

    let state = router.on_tracking_update(&[left_open()], &camera);
    assert!(state.repel.visible);
    assert_eq!(state.repel.position.y, simulation.config().gesture.field_height);

    let report = simulation.step();
    assert!(report.repel_dispatched);
    assert!(!report.attract_dispatched);

    let center = simulation.control().repel.position;
    let (pushed, untouched) = check_single_impulse(&simulation, center, &simulation.config().repel, true);
    assert!(pushed > 0, "no particle inside the repel radius");
    assert!(untouched > 0, "every particle inside the repel radius");

    // Holding the hand open does not fire again.
    for _ in 0..5 {
        router.on_tracking_update(&[left_open()], &camera);
        assert!(!simulation.step().repel_dispatched);
    }

    // Closing and reopening does.
    router.on_tracking_update(
        &[HandObservation::new(closed_hand(0.3, 0.4), Handedness::Left)],
        &camera,
    );
    assert!(!simulation.step().repel_dispatched);
    router.on_tracking_update(&[left_open()], &camera);
    assert!(simulation.step().repel_dispatched);
}

#[test]
fn held_attract_hand_pulls_every_frame_until_it_leaves() {
    let (mut simulation, mut router, camera) = setup();
    let right_open = HandObservation::new(open_hand(0.5, 0.6), Handedness::Right);
    let field = simulation.config().attract;

    let state = router.on_tracking_update(std::slice::from_ref(&right_open), &camera);
    assert!(state.attract.active);
    let report = simulation.step();
    assert!(report.attract_dispatched);
    assert!(!report.repel_dispatched);

    let center = simulation.control().attract.position;
    let (pulled, untouched) = check_single_impulse(&simulation, center, &field, false);
    assert!(pulled > 0, "no particle inside the attract radius");
    assert!(untouched > 0, "every particle inside the attract radius");

    for _ in 0..4 {
        router.on_tracking_update(std::slice::from_ref(&right_open), &camera);
        assert!(simulation.step().attract_dispatched);
        assert_pulled_inward(&simulation, center, &field);
    }

    // Frames between tracking updates keep pulling.
    for _ in 0..2 {
        assert!(simulation.step().attract_dispatched);
        assert_pulled_inward(&simulation, center, &field);
    }

    let state = router.on_tracking_update(&[], &camera);
    assert!(!state.attract.active);
    assert!(!state.attract.visible);
    assert!(!simulation.step().attract_dispatched);
}

/// After several pull frames, particles well inside the radius move towards
/// the centre and particles beyond it are still at rest horizontally.
fn assert_pulled_inward(simulation: &Simulation, center: cgmath::Vector3<f32>, field: &FieldParams) {
    for particle in &simulation.particles().particles {
        let offset = particle.position - center;
        let horizontal = cgmath::vec2(offset.x, offset.z);
        let push = cgmath::vec2(particle.velocity.x, particle.velocity.z);

        if offset.magnitude() >= field.radius {
            assert_eq!(push, cgmath::Vector2::zero());
        } else if horizontal.magnitude() > 2.0 {
            assert!(horizontal.dot(push) < 0.0);
        }
    }
}

#[test]
fn navigation_freezes_open_hands() {
    let (mut simulation, mut router, camera) = setup();
    let navigating = camera.with_navigating(true);

    let state = router.on_tracking_update(&[left_open()], &navigating);
    assert!(!state.repel.visible);
    assert!(!simulation.step().repel_dispatched);

    router.on_tracking_update(&[left_open()], &camera);
    assert!(simulation.step().repel_dispatched);
}
