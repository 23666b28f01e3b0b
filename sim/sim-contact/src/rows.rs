//! Contact row derivation.
//!
//! Each contact point yields one unilateral normal row. Each enabled
//! tangent direction yields a friction row whose limits are, unless the
//! material says otherwise, a multiple of that point's normal force:
//!
//! ```text
//! normal rows:    n0 n1 ... nk
//! friction rows:  t(0,0) t(0,1) t(1,0) ... t(k,1)
//! ```
//!
//! Normal rows come first so every coupled friction row references an
//! earlier row of the same descriptor.

use sim_constraint::{
    BodyState, ConstraintDescriptor, ConstraintRow, ForceBound, JacobianPair, RowSource,
};
use sim_types::{ConstraintConfig, Result, SimError};

use crate::{Contact, ContactPoint};

/// Append the rows of an active contact to `desc`.
///
/// `state0` and `state1` must be the states of the contact's first and
/// second body. Returns the number of rows appended; an empty manifold
/// appends none.
///
/// # Errors
///
/// Fails if the contact is inactive, if the states do not belong to the
/// contact, or if the descriptor runs out of capacity.
pub fn derive_contact_rows(
    contact: &Contact,
    state0: &BodyState,
    state1: &BodyState,
    desc: &mut ConstraintDescriptor,
    config: &ConstraintConfig,
) -> Result<usize> {
    if !contact.is_active() {
        return Err(SimError::inactive(contact.key().to_string()));
    }
    let (body0, body1) = contact.bodies();
    if state0.id != body0 {
        return Err(SimError::InvalidBodyId(state0.id.raw()));
    }
    if state1.id != body1 {
        return Err(SimError::InvalidBodyId(state1.id.raw()));
    }

    let points = contact.manifold().points();
    if points.is_empty() {
        return Ok(0);
    }

    let start = desc.len();
    let mut normal_rows = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        let row = normal_row(index, point, state0, state1, desc, config);
        normal_rows.push(desc.push_row(row)?);
    }

    for (index, (point, &normal_row)) in points.iter().zip(&normal_rows).enumerate() {
        for axis in 0..2 {
            if !point.material.friction[axis].enabled {
                continue;
            }
            let row = friction_row(index, axis, normal_row, point, state0, state1, desc, config);
            desc.push_row(row)?;
        }
    }

    Ok(desc.len() - start)
}

fn normal_row(
    index: usize,
    point: &ContactPoint,
    state0: &BodyState,
    state1: &BodyState,
    desc: &ConstraintDescriptor,
    config: &ConstraintConfig,
) -> ConstraintRow {
    let material = &point.material;
    let jacobian = JacobianPair::at_point(&point.normal, &point.position, state0, state1);
    let rel_speed = -jacobian.relative_velocity(state0, state1);
    let rel_gyro = jacobian.relative_gyro(state0, state1);

    let penetration =
        (point.penetration - config.resting_penetration).clamp(0.0, config.max_penetration);
    let restitution_velocity = if rel_speed > config.rest_relative_velocity {
        rel_speed * material.restitution
    } else {
        0.0
    };
    let stiffness = config.max_penetration_stiffness * material.softness;
    let bias_velocity = restitution_velocity.max(penetration * stiffness);

    let mut row = ConstraintRow::new(jacobian, RowSource::ContactNormal { point: index });
    row.bound = ForceBound::unilateral();
    row.bias_velocity = bias_velocity;
    row.penetration = penetration;
    row.penetration_stiffness = stiffness;
    row.restitution = material.restitution;
    row.soft = material.soft;
    row.regularizer = if material.soft {
        config.diagonal_regularizer.max(material.skin_thickness)
    } else {
        config.diagonal_regularizer
    };
    row.acceleration = rel_gyro + (rel_speed + bias_velocity) * desc.force_scale();
    if let Some(accel) = material.normal_override_accel {
        row.acceleration += accel;
    }
    row.initial_force = material.forces.normal;
    row
}

#[allow(clippy::too_many_arguments)]
fn friction_row(
    index: usize,
    axis: usize,
    normal_row: usize,
    point: &ContactPoint,
    state0: &BodyState,
    state1: &BodyState,
    desc: &ConstraintDescriptor,
    config: &ConstraintConfig,
) -> ConstraintRow {
    let friction = &point.material.friction[axis];
    let jacobian = JacobianPair::at_point(&point.tangents[axis], &point.position, state0, state1);
    let rel_speed = -jacobian.relative_velocity(state0, state1);
    let rel_gyro = jacobian.relative_gyro(state0, state1);

    let coefficient = friction.coefficient(rel_speed, config.max_dynamic_friction_speed);

    let mut row = ConstraintRow::new(jacobian, RowSource::ContactFriction { point: index, axis });
    row.bound = if friction.independent_bound {
        ForceBound::symmetric(coefficient)
    } else {
        ForceBound::coupled(normal_row, coefficient)
    };
    match friction.override_accel {
        Some(accel) => {
            row.restitution = -1.0;
            row.acceleration = accel;
        }
        None => {
            row.acceleration = rel_gyro + rel_speed * desc.force_scale();
        }
    }
    row.regularizer = config.diagonal_regularizer;
    row.initial_force = point.material.forces.friction[axis];
    row
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{ContactMaterial, FrictionAxis};
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Point3, Vector3};
    use sim_types::{BodyId, Pose};

    fn sphere(id: u64, y: f64, vy: f64) -> BodyState {
        BodyState::dynamic(
            BodyId::new(id),
            Pose::from_position(Point3::new(0.0, y, 0.0)),
            1.0,
            Matrix3::identity(),
        )
        .with_velocity(Vector3::new(0.0, vy, 0.0), Vector3::zeros())
    }

    fn contact_with(
        s0: &BodyState,
        s1: &BodyState,
        points: Vec<ContactPoint>,
    ) -> Contact {
        let mut contact = Contact::between(s0, s1).unwrap();
        contact.update(points);
        contact
    }

    fn derive(contact: &Contact, s0: &BodyState, s1: &BodyState, dt: f64) -> ConstraintDescriptor {
        let mut desc = ConstraintDescriptor::new(dt, contact.row_count());
        derive_contact_rows(contact, s0, s1, &mut desc, &ConstraintConfig::default()).unwrap();
        desc
    }

    #[test]
    fn test_restitution_bias_for_closing_spheres() {
        let upper = sphere(0, 1.0, -1.0);
        let lower = sphere(1, -1.0, 1.0);
        let material = ContactMaterial::frictionless().with_restitution(0.5);
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0).with_material(material);
        let contact = contact_with(&upper, &lower, vec![point]);

        let desc = derive(&contact, &upper, &lower, 0.0);
        assert_eq!(desc.len(), 1);
        let row = &desc.rows()[0];
        assert_relative_eq!(row.bias_velocity, 1.0, epsilon = 1e-12);
        assert_relative_eq!(row.acceleration, 3.0, epsilon = 1e-12);
        assert_eq!(row.bound.resolve(&[]), (0.0, f64::INFINITY));
        assert_eq!(row.source, RowSource::ContactNormal { point: 0 });
    }

    #[test]
    fn test_slow_approach_has_no_restitution() {
        let upper = sphere(0, 1.0, -1.0e-4);
        let lower = sphere(1, -1.0, 0.0);
        let material = ContactMaterial::frictionless().with_restitution(1.0);
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0).with_material(material);
        let contact = contact_with(&upper, &lower, vec![point]);

        let desc = derive(&contact, &upper, &lower, 0.0);
        assert_eq!(desc.rows()[0].bias_velocity, 0.0);
    }

    #[test]
    fn test_penetration_bias_is_clamped() {
        let upper = sphere(0, 1.0, 0.0);
        let lower = sphere(1, -1.0, 0.0);
        let material = ContactMaterial::frictionless().with_softness(0.5);
        let deep = ContactPoint::new(Point3::origin(), Vector3::y(), 3.0).with_material(material);
        let shallow = ContactPoint::new(Point3::new(1.0, 0.0, 0.0), Vector3::y(), 0.001)
            .with_material(material);
        let contact = contact_with(&upper, &lower, vec![deep, shallow]);

        let desc = derive(&contact, &upper, &lower, 1.0 / 60.0);
        let config = ConstraintConfig::default();
        assert_eq!(desc.rows()[0].penetration, config.max_penetration);
        assert_relative_eq!(desc.rows()[0].penetration_stiffness, 25.0, epsilon = 1e-12);
        assert_relative_eq!(desc.rows()[0].bias_velocity, 12.5, epsilon = 1e-12);
        assert_relative_eq!(desc.rows()[0].acceleration, 12.5 * 60.0, epsilon = 1e-9);
        assert_eq!(desc.rows()[1].penetration, 0.0);
        assert_eq!(desc.rows()[1].bias_velocity, 0.0);
    }

    #[test]
    fn test_restitution_and_penetration_do_not_stack() {
        let upper = sphere(0, 1.0, -1.0);
        let lower = sphere(1, -1.0, 0.0);
        let material = ContactMaterial::frictionless()
            .with_restitution(1.0)
            .with_softness(1.0);
        let depth = 0.1 + ConstraintConfig::default().resting_penetration;
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), depth).with_material(material);
        let contact = contact_with(&upper, &lower, vec![point]);

        let desc = derive(&contact, &upper, &lower, 0.0);
        // penetration bias 0.1 * 50 = 5 beats the restitution bias of 1
        assert_relative_eq!(desc.rows()[0].bias_velocity, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_friction_rows_follow_normals_and_couple() {
        let upper = sphere(0, 1.0, 0.0);
        let lower = sphere(1, -1.0, 0.0);
        let points = vec![
            ContactPoint::new(Point3::new(-0.5, 0.0, 0.0), Vector3::y(), 0.0),
            ContactPoint::new(Point3::new(0.5, 0.0, 0.0), Vector3::y(), 0.0),
        ];
        let contact = contact_with(&upper, &lower, points);

        let desc = derive(&contact, &upper, &lower, 1.0 / 60.0);
        assert_eq!(desc.len(), 6);
        let sources: Vec<_> = desc.rows().iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            vec![
                RowSource::ContactNormal { point: 0 },
                RowSource::ContactNormal { point: 1 },
                RowSource::ContactFriction { point: 0, axis: 0 },
                RowSource::ContactFriction { point: 0, axis: 1 },
                RowSource::ContactFriction { point: 1, axis: 0 },
                RowSource::ContactFriction { point: 1, axis: 1 },
            ]
        );
        assert_eq!(desc.rows()[2].bound.dependency(), Some(0));
        assert_eq!(desc.rows()[5].bound.dependency(), Some(1));

        let forces = [10.0, 20.0, 0.0, 0.0, 0.0, 0.0];
        let bounds = desc.resolve_bounds(&forces).unwrap();
        assert_relative_eq!(bounds[2].1, 8.0, epsilon = 1e-12);
        assert_relative_eq!(bounds[4].1, 16.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sliding_uses_dynamic_coefficient() {
        let upper = sphere(0, 1.0, 0.0).with_velocity(Vector3::new(2.0, 0.0, 0.0), Vector3::zeros());
        let lower = sphere(1, -1.0, 0.0);
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0)
            .with_tangent(Vector3::x())
            .with_material(
                ContactMaterial::default()
                    .with_friction(FrictionAxis::coulomb(0.9, 0.5))
                    .with_friction_axis(1, FrictionAxis::disabled()),
            );
        let contact = contact_with(&upper, &lower, vec![point]);

        let desc = derive(&contact, &upper, &lower, 0.0);
        assert_eq!(desc.len(), 2);
        assert_eq!(desc.rows()[1].bound, ForceBound::coupled(0, 0.5));
        assert_relative_eq!(desc.rows()[1].acceleration, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_independent_and_overridden_friction() {
        let upper = sphere(0, 1.0, 0.0);
        let lower = sphere(1, -1.0, 0.0);
        let axis = FrictionAxis {
            independent_bound: true,
            override_accel: Some(4.0),
            ..FrictionAxis::coulomb(0.6, 0.3)
        };
        let material = ContactMaterial::default()
            .with_friction(axis)
            .with_normal_override(2.0);
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0).with_material(material);
        let contact = contact_with(&upper, &lower, vec![point]);

        let desc = derive(&contact, &upper, &lower, 0.0);
        let rows = desc.rows();
        assert_relative_eq!(rows[0].acceleration, 2.0, epsilon = 1e-12);
        assert!(!rows[0].is_acceleration_overridden());
        assert_eq!(rows[1].bound, ForceBound::symmetric(0.6));
        assert!(rows[1].is_acceleration_overridden());
        assert_eq!(rows[1].acceleration, 4.0);
    }

    #[test]
    fn test_soft_contact_regularizer_and_warm_start() {
        let upper = sphere(0, 1.0, 0.0);
        let lower = sphere(1, -1.0, 0.0);
        let mut material = ContactMaterial::frictionless().with_soft_skin(0.01);
        material.forces.normal = 7.5;
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0).with_material(material);
        let mut contact = Contact::between(&upper, &lower).unwrap();
        contact.manifold_mut().update([point], 0.05);
        contact.set_active(true);

        let desc = derive(&contact, &upper, &lower, 0.0);
        assert!(desc.rows()[0].soft);
        assert_eq!(desc.rows()[0].regularizer, 0.01);
        assert_eq!(desc.rows()[0].initial_force, 7.5);
    }

    #[test]
    fn test_empty_and_inactive_contacts() {
        let upper = sphere(0, 1.0, 0.0);
        let lower = sphere(1, -1.0, 0.0);
        let mut contact = Contact::between(&upper, &lower).unwrap();
        let mut desc = ConstraintDescriptor::new(0.01, 4);
        let config = ConstraintConfig::default();

        let err = derive_contact_rows(&contact, &upper, &lower, &mut desc, &config).unwrap_err();
        assert!(matches!(err, SimError::InactiveConstraint { .. }));

        contact.set_active(true);
        assert_eq!(derive_contact_rows(&contact, &upper, &lower, &mut desc, &config).unwrap(), 0);
        assert!(desc.is_empty());
    }

    #[test]
    fn test_wrong_states_and_capacity() {
        let upper = sphere(0, 1.0, 0.0);
        let lower = sphere(1, -1.0, 0.0);
        let point = ContactPoint::new(Point3::origin(), Vector3::y(), 0.0);
        let contact = contact_with(&upper, &lower, vec![point]);
        let config = ConstraintConfig::default();

        let mut desc = ConstraintDescriptor::new(0.01, 8);
        let err = derive_contact_rows(&contact, &lower, &upper, &mut desc, &config).unwrap_err();
        assert_eq!(err, SimError::InvalidBodyId(1));

        let mut small = ConstraintDescriptor::new(0.01, 2);
        let err = derive_contact_rows(&contact, &upper, &lower, &mut small, &config).unwrap_err();
        assert_eq!(err, SimError::RowCapacityExceeded { capacity: 2 });
    }
}
