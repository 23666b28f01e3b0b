//! End-to-end contact scenarios through [`World`].
//!
//! These drive the same path a broad/narrow phase and an external solver
//! would: attach, feed points, build rows, hand forces back.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_constraint::{ForceBound, RowSource};
use sim_contact::{ContactMaterial, ContactPoint, FrictionAxis};
use sim_core::{
    BodyId, ConstraintOwner, PairKey, ParallelConfig, Pose, ShapeClass, SimError,
    SimulationConfig, Twist, World,
};

const BOX_INERTIA: f64 = 1.0 / 6.0;

fn sphere(world: &mut World, y: f64, vy: f64) -> BodyId {
    let id = world.add_dynamic_body(
        Pose::from_position(Point3::new(0.0, y, 0.0)),
        1.0,
        Vector3::new(0.4, 0.4, 0.4),
    );
    world
        .body_mut(id)
        .unwrap()
        .set_twist(Twist::linear(Vector3::new(0.0, vy, 0.0)));
    id
}

fn unit_box(world: &mut World, x: f64, y: f64) -> BodyId {
    world.add_dynamic_body(
        Pose::from_position(Point3::new(x, y, 0.0)),
        1.0,
        Vector3::repeat(BOX_INERTIA),
    )
}

/// Four corners of a unit face at height `y`, all with the same penetration.
fn face(x: f64, y: f64, penetration: f64) -> Vec<ContactPoint> {
    [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)]
        .iter()
        .map(|&(dx, dz)| ContactPoint::new(Point3::new(x + dx, y, dz), Vector3::y(), penetration))
        .collect()
}

/// A static ground with `height` boxes stacked on it at `x`.
fn stack(world: &mut World, ground: BodyId, x: f64, height: usize) -> Vec<BodyId> {
    let mut below = ground;
    let mut ids = Vec::with_capacity(height);
    for level in 0..height {
        let id = unit_box(world, x, level as f64 + 0.5);
        world.attach_contact(id, below).unwrap();
        world.update_contact(id, below, face(x, level as f64, 0.01)).unwrap();
        ids.push(id);
        below = id;
    }
    ids
}

#[test]
fn closing_spheres_get_restitution_bias() {
    let mut world = World::default();
    let upper = sphere(&mut world, 1.0, -1.0);
    let lower = sphere(&mut world, -1.0, 1.0);

    let material = ContactMaterial::frictionless().with_restitution(0.5);
    world.attach_contact(upper, lower).unwrap();
    world
        .update_contact(
            upper,
            lower,
            vec![ContactPoint::new(Point3::origin(), Vector3::y(), 0.0).with_material(material)],
        )
        .unwrap();

    let rows = world.build_rows().unwrap();
    assert_eq!(rows.row_count(), 1, "frictionless contact emits only the normal row");

    let row = &rows.blocks()[0].descriptor.rows()[0];
    assert_relative_eq!(row.bias_velocity, 1.0, epsilon = 1e-12);
    assert_eq!(row.source, RowSource::ContactNormal { point: 0 });
    assert_eq!(row.bound, ForceBound::unilateral());

    // closing speed 2 plus bias 1, scaled by the default 240 Hz rate
    assert_relative_eq!(row.acceleration, 3.0 * 240.0, epsilon = 1e-9);
}

#[test]
fn registry_key_is_symmetric() {
    let mut world = World::default();
    let a = sphere(&mut world, 1.0, 0.0);
    let b = sphere(&mut world, 0.0, 0.0);

    assert_eq!(PairKey::new(a, b), PairKey::new(b, a));

    let attached = world.attach_contact(b, a).unwrap();
    let forward = world.find_contact(a, b).unwrap();
    let backward = world.find_contact(b, a).unwrap();
    assert!(Arc::ptr_eq(&attached, &forward));
    assert!(Arc::ptr_eq(&forward, &backward));

    for id in [a, b] {
        let registry = world.body(id).unwrap().contacts();
        assert!(registry.contains(a, b));
        assert!(registry.contains(b, a));
    }
}

#[test]
fn duplicate_attach_fails_until_detached() {
    let mut world = World::default();
    let a = sphere(&mut world, 1.0, 0.0);
    let b = sphere(&mut world, 0.0, 0.0);

    world.attach_contact(a, b).unwrap();
    let err = world.attach_contact(b, a).unwrap_err();
    assert!(err.is_registry_error(), "second attach must fail: {err}");
    assert_eq!(world.contact_count(), 1);

    world.detach_contact(a, b).unwrap();
    assert!(world.find_contact(a, b).is_none());
    assert!(world.body(a).unwrap().contacts().is_empty());
    assert!(world.body(b).unwrap().contacts().is_empty());
    assert!(world.detach_contact(a, b).unwrap_err().is_registry_error());

    world.attach_contact(a, b).unwrap();
    assert!(world.find_contact(b, a).is_some());
}

#[test]
fn static_and_self_pairs_are_rejected() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let wall = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let a = sphere(&mut world, 1.0, 0.0);

    assert!(matches!(
        world.attach_contact(ground, wall).unwrap_err(),
        SimError::StaticPair { .. }
    ));
    assert!(matches!(world.attach_contact(a, a).unwrap_err(), SimError::SelfContact(_)));
    assert_eq!(
        world.attach_contact(a, BodyId::new(99)).unwrap_err(),
        SimError::InvalidBodyId(99)
    );
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn concurrent_lookups_see_the_same_contact() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let boxes = stack(&mut world, ground, 0.0, 6);
    let world = &world;

    std::thread::scope(|scope| {
        for pair in boxes.windows(2) {
            let (upper, lower) = (pair[1], pair[0]);
            scope.spawn(move || {
                for _ in 0..100 {
                    let contact = world.find_contact(lower, upper).unwrap();
                    assert_eq!(contact.read().key(), PairKey::new(upper, lower));
                }
            });
        }
    });
}

#[test]
fn narrow_phase_threads_attach_and_update_through_the_world() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let boxes: Vec<BodyId> = (0..8_i32)
        .map(|i| unit_box(&mut world, f64::from(i) * 3.0, 0.5))
        .collect();
    let world = &world;

    std::thread::scope(|scope| {
        for (i, &id) in boxes.iter().enumerate() {
            scope.spawn(move || {
                world.attach_contact(id, ground).unwrap();
                let x = i as f64 * 3.0;
                for _ in 0..50 {
                    assert_eq!(world.update_contact(ground, id, face(x, 0.0, 0.01)).unwrap(), 4);
                }
                if i % 2 == 1 {
                    world.update_contact(id, ground, std::iter::empty()).unwrap();
                }
            });
        }
    });

    assert_eq!(world.contact_count(), boxes.len());
    assert_eq!(world.body(ground).unwrap().contacts().len(), boxes.len());
    for (i, &id) in boxes.iter().enumerate() {
        let contact = world.find_contact(id, ground).unwrap();
        assert_eq!(contact.read().is_active(), i % 2 == 0);
        assert!(world.body(id).unwrap().contacts().contains(id, ground));
    }
}

#[test]
fn concurrent_attach_of_one_pair_registers_it_once() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let id = unit_box(&mut world, 0.0, 0.5);
    let world = &world;

    let attached: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(move || world.attach_contact(id, ground).is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum()
    });

    assert_eq!(attached, 1);
    assert_eq!(world.contact_count(), 1);
    assert_eq!(world.body(id).unwrap().contacts().len(), 1);
    world.detach_contact(ground, id).unwrap();
    assert_eq!(world.contact_count(), 0);
    assert!(world.body(ground).unwrap().contacts().is_empty());
}

#[test]
fn stacked_boxes_form_one_island() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let boxes = stack(&mut world, ground, 0.0, 3);

    let rows = world.build_rows().unwrap();
    assert_eq!(rows.island_count(), 1);
    assert_eq!(rows.len(), 3);
    // four points, each one normal and two friction rows
    assert_eq!(rows.row_count(), 3 * 12);

    let keys: Vec<ConstraintOwner> = rows.blocks().iter().map(|b| b.owner).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "blocks within an island are ordered by pair key");

    let block = rows
        .block(ConstraintOwner::Contact(PairKey::new(boxes[0], ground)))
        .unwrap();
    let resting = (0.01 - 1.0 / 512.0) * 50.0 * 0.1;
    for row in &block.descriptor.rows()[..4] {
        assert_relative_eq!(row.bias_velocity, resting, epsilon = 1e-12);
    }
}

#[test]
fn separate_stacks_form_separate_islands() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    stack(&mut world, ground, 0.0, 2);
    stack(&mut world, ground, 5.0, 2);

    let rows = world.build_rows().unwrap();
    assert_eq!(rows.island_count(), 2, "a static ground must not merge islands");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.blocks()[0].island, rows.blocks()[1].island);
    assert_ne!(rows.blocks()[1].island, rows.blocks()[2].island);
}

#[test]
fn friction_bounds_follow_normal_force() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let crate_id = unit_box(&mut world, 0.0, 0.5);
    world.attach_contact(crate_id, ground).unwrap();
    world.update_contact(crate_id, ground, face(0.0, 0.0, 0.0)).unwrap();

    let rows = world.build_rows().unwrap();
    let desc = &rows.blocks()[0].descriptor;
    assert_eq!(desc.len(), 12);

    for (i, row) in desc.rows()[4..].iter().enumerate() {
        let point = i / 2;
        assert_eq!(row.bound.dependency(), Some(point));
        assert_eq!(
            row.source,
            RowSource::ContactFriction {
                point,
                axis: i % 2
            }
        );
    }

    let mut forces = vec![0.0; 12];
    forces[0] = 10.0;
    let bounds = desc.resolve_bounds(&forces).unwrap();
    assert_eq!(bounds[4], (-8.0, 8.0));
    assert_eq!(bounds[6], (0.0, 0.0), "other points' friction stays locked at zero");

    forces[0] = 20.0;
    let bounds = desc.resolve_bounds(&forces).unwrap();
    assert_eq!(bounds[4], (-16.0, 16.0));
    assert_eq!(bounds[5], (-16.0, 16.0));
}

#[test]
fn sliding_contact_uses_dynamic_friction() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let crate_id = unit_box(&mut world, 0.0, 0.5);
    world
        .body_mut(crate_id)
        .unwrap()
        .set_twist(Twist::linear(Vector3::new(2.0, 0.0, 0.0)));

    let material = ContactMaterial::default()
        .with_friction_axis(0, FrictionAxis::coulomb(0.9, 0.3))
        .with_friction_axis(1, FrictionAxis::disabled());
    let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0)
        .with_tangent(Vector3::x())
        .with_material(material);
    world.attach_contact(crate_id, ground).unwrap();
    world.update_contact(crate_id, ground, vec![point]).unwrap();

    let rows = world.build_rows().unwrap();
    let desc = &rows.blocks()[0].descriptor;
    assert_eq!(desc.len(), 2);
    assert_eq!(desc.rows()[1].bound, ForceBound::coupled(0, 0.3));
}

#[test]
fn separated_contact_stops_contributing_rows() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let crate_id = unit_box(&mut world, 0.0, 0.5);
    world.attach_contact(crate_id, ground).unwrap();
    world.update_contact(crate_id, ground, face(0.0, 0.0, 0.0)).unwrap();
    assert_eq!(world.build_rows().unwrap().row_count(), 12);

    let kept = world.update_contact(crate_id, ground, Vec::new()).unwrap();
    assert_eq!(kept, 0);
    let rows = world.build_rows().unwrap();
    assert!(rows.is_empty());
    assert!(
        world.find_contact(crate_id, ground).is_some(),
        "separation deactivates, it does not detach"
    );

    world.update_contact(crate_id, ground, face(0.0, 0.0, 0.0)).unwrap();
    assert_eq!(world.build_rows().unwrap().row_count(), 12);
}

#[test]
fn resolved_forces_warm_start_persisting_points() {
    let mut world = World::default();
    let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
    let crate_id = unit_box(&mut world, 0.0, 0.5);
    world.attach_contact(crate_id, ground).unwrap();
    world.update_contact(crate_id, ground, face(0.0, 0.0, 0.0)).unwrap();

    let rows = world.build_rows().unwrap();
    let forces: Vec<f64> = (1..=12_i32).map(f64::from).collect();
    world.apply_resolved_forces(&rows, &[forces]).unwrap();

    // three corners barely moved, the fourth jumped past the prune tolerance
    let mut points = face(0.01, 0.0, 0.0);
    points[3] = ContactPoint::new(Point3::new(-2.0, 0.0, 2.0), Vector3::y(), 0.0);
    world.update_contact(crate_id, ground, points).unwrap();

    let rows = world.build_rows().unwrap();
    let warm = rows.blocks()[0].descriptor.initial_forces();
    assert_eq!(&warm[..4], &[1.0, 2.0, 3.0, 0.0]);
    assert_eq!(&warm[4..10], &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    assert_eq!(&warm[10..], &[0.0, 0.0]);
}

#[test]
fn parallel_build_matches_sequential() {
    let build = |parallel: ParallelConfig| {
        let mut world = World::new(SimulationConfig::default().parallel(parallel));
        let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
        for s in 0..8_i32 {
            stack(&mut world, ground, f64::from(s) * 3.0, 4);
        }
        world
    };

    let mut sequential = build(ParallelConfig::sequential());
    let mut parallel = build(ParallelConfig::many_islands());

    let a = sequential.build_rows().unwrap();
    let b = parallel.build_rows().unwrap();
    assert!(!a.was_parallel());
    assert!(b.was_parallel());
    assert_eq!(a.island_count(), 8);
    assert_eq!(a.blocks(), b.blocks());

    // a second pass over unchanged state is identical too
    assert_eq!(parallel.build_rows().unwrap().blocks(), b.blocks());
}
