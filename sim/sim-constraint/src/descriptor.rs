//! Row container handed to the external solver.

use sim_types::{Result, SimError};

use crate::ConstraintRow;

/// Ordered rows for one contact or joint, plus the step's timestep.
///
/// The capacity is fixed when the descriptor is created from the owner's
/// row count. Pushing past it means the owner miscounted its rows, and
/// the push fails instead of growing.
///
/// # Example
///
/// ```
/// use sim_constraint::{ConstraintDescriptor, ConstraintRow, JacobianPair, RowSource};
/// use nalgebra::Vector3;
///
/// let mut desc = ConstraintDescriptor::new(0.01, 1);
/// let row = ConstraintRow::new(JacobianPair::angular(&Vector3::x()), RowSource::JointAxis { axis: 3 });
/// assert_eq!(desc.push_row(row.clone()).ok(), Some(0));
/// assert!(desc.push_row(row).is_err());
/// assert!((desc.force_scale() - 100.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDescriptor {
    timestep: f64,
    inv_timestep: f64,
    capacity: usize,
    rows: Vec<ConstraintRow>,
}

impl ConstraintDescriptor {
    /// Create an empty descriptor able to hold `capacity` rows.
    ///
    /// A zero (or negative) timestep builds rows in impulse mode.
    #[must_use]
    pub fn new(timestep: f64, capacity: usize) -> Self {
        let inv_timestep = if timestep > 0.0 { 1.0 / timestep } else { 0.0 };
        Self {
            timestep,
            inv_timestep,
            capacity,
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Append a row, returning its index.
    pub fn push_row(&mut self, row: ConstraintRow) -> Result<usize> {
        if self.rows.len() >= self.capacity {
            return Err(SimError::RowCapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    /// Step length in seconds.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Reciprocal of the timestep, or zero in impulse mode.
    #[must_use]
    pub fn inv_timestep(&self) -> f64 {
        self.inv_timestep
    }

    /// Factor converting a velocity change into the row right-hand side.
    #[must_use]
    pub fn force_scale(&self) -> f64 {
        if self.timestep > 0.0 {
            self.inv_timestep
        } else {
            1.0
        }
    }

    /// Maximum number of rows.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows that can still be pushed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.rows.len()
    }

    /// Rows pushed so far.
    #[must_use]
    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    /// Mutable access to one row.
    pub fn row_mut(&mut self, index: usize) -> Option<&mut ConstraintRow> {
        self.rows.get_mut(index)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Effective force bounds of every row for the given forces.
    ///
    /// Fails unless `forces` has exactly one entry per row.
    pub fn resolve_bounds(&self, forces: &[f64]) -> Result<Vec<(f64, f64)>> {
        if forces.len() != self.rows.len() {
            return Err(SimError::ForceCountMismatch {
                expected: self.rows.len(),
                actual: forces.len(),
            });
        }
        Ok(self.rows.iter().map(|row| row.bounds(forces)).collect())
    }

    /// Warm-start forces of every row.
    #[must_use]
    pub fn initial_forces(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.initial_force).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{ForceBound, JacobianPair, RowSource};
    use nalgebra::Vector3;

    fn row(source: RowSource) -> ConstraintRow {
        ConstraintRow::new(JacobianPair::angular(&Vector3::y()), source)
    }

    #[test]
    fn test_capacity_is_fatal() {
        let mut desc = ConstraintDescriptor::new(1.0 / 60.0, 2);
        assert_eq!(desc.push_row(row(RowSource::ContactNormal { point: 0 })).unwrap(), 0);
        assert_eq!(desc.push_row(row(RowSource::ContactNormal { point: 1 })).unwrap(), 1);
        assert_eq!(desc.remaining(), 0);

        let err = desc
            .push_row(row(RowSource::ContactNormal { point: 2 }))
            .unwrap_err();
        assert_eq!(err, SimError::RowCapacityExceeded { capacity: 2 });
        assert_eq!(desc.len(), 2);
    }

    #[test]
    fn test_impulse_mode() {
        let desc = ConstraintDescriptor::new(0.0, 0);
        assert_eq!(desc.inv_timestep(), 0.0);
        assert_eq!(desc.force_scale(), 1.0);
        assert!(desc.is_empty());
    }

    #[test]
    fn test_resolve_bounds_follows_normal_force() {
        let mut desc = ConstraintDescriptor::new(0.01, 2);
        let normal = desc.push_row(row(RowSource::ContactNormal { point: 0 })).unwrap();
        let mut friction = row(RowSource::ContactFriction { point: 0, axis: 0 });
        friction.bound = ForceBound::coupled(normal, 0.5);
        desc.push_row(friction).unwrap();

        let bounds = desc.resolve_bounds(&[10.0, 0.0]).unwrap();
        assert_eq!(bounds[1], (-5.0, 5.0));

        let bounds = desc.resolve_bounds(&[2.5, 1.0]).unwrap();
        assert_eq!(bounds[1], (-1.25, 1.25));

        assert!(matches!(
            desc.resolve_bounds(&[1.0]),
            Err(SimError::ForceCountMismatch { expected: 2, actual: 1 })
        ));
    }
}
