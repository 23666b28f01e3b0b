//! Constraint rows: Jacobians, force bounds and the right-hand side.
//!
//! A row constrains one scalar relative velocity between two bodies:
//!
//! ```text
//! J0 · v0 + J1 · v1  (each J is a 6-vector: linear then angular part)
//! ```
//!
//! The external solver picks a force `f` per row with
//! `low <= f <= high` so that the row's relative velocity change matches
//! [`ConstraintRow::acceleration`], softened by the row's regularizer.

use nalgebra::{Point3, Vector3};

use crate::BodyState;

/// Linear and angular sensitivity of a row to one body's velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jacobian {
    /// Sensitivity to linear velocity.
    pub linear: Vector3<f64>,
    /// Sensitivity to angular velocity.
    pub angular: Vector3<f64>,
}

impl Jacobian {
    /// Create a Jacobian block.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// All-zero block.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Project a body velocity through this block.
    #[must_use]
    pub fn dot(&self, linear: &Vector3<f64>, angular: &Vector3<f64>) -> f64 {
        self.linear.dot(linear) + self.angular.dot(angular)
    }
}

/// The two Jacobian blocks of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianPair {
    /// Block for the first body.
    pub body0: Jacobian,
    /// Block for the second body.
    pub body1: Jacobian,
}

impl JacobianPair {
    /// Row pinning a point along `dir`.
    ///
    /// `r0` and `r1` are the offsets of the constrained point from each
    /// body's centre of mass.
    #[must_use]
    pub fn point(dir: &Vector3<f64>, r0: &Vector3<f64>, r1: &Vector3<f64>) -> Self {
        Self {
            body0: Jacobian::new(*dir, r0.cross(dir)),
            body1: Jacobian::new(-dir, dir.cross(r1)),
        }
    }

    /// Point row between two bodies at a shared world point.
    #[must_use]
    pub fn at_point(dir: &Vector3<f64>, point: &Point3<f64>, b0: &BodyState, b1: &BodyState) -> Self {
        Self::point(dir, &b0.lever_arm(point), &b1.lever_arm(point))
    }

    /// Row constraining relative rotation about `dir`.
    #[must_use]
    pub fn angular(dir: &Vector3<f64>) -> Self {
        Self {
            body0: Jacobian::new(Vector3::zeros(), *dir),
            body1: Jacobian::new(Vector3::zeros(), -dir),
        }
    }

    /// Current relative velocity along the row (positive when separating).
    #[must_use]
    pub fn relative_velocity(&self, b0: &BodyState, b1: &BodyState) -> f64 {
        self.body0.dot(&b0.linear_velocity, &b0.angular_velocity)
            + self.body1.dot(&b1.linear_velocity, &b1.angular_velocity)
    }

    /// Relative acceleration induced by both bodies' gyroscopic terms.
    #[must_use]
    pub fn relative_gyro(&self, b0: &BodyState, b1: &BodyState) -> f64 {
        self.body0.angular.dot(&b0.gyro_alpha) + self.body1.angular.dot(&b1.gyro_alpha)
    }
}

/// Lower and upper force limits of a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForceBound {
    /// Constant limits.
    Fixed {
        /// Lower limit.
        low: f64,
        /// Upper limit.
        high: f64,
    },
    /// Limits proportional to another row's resolved force.
    ///
    /// The effective limits are `low * f` and `high * f`, where `f` is the
    /// current force of row `normal_row` in the same descriptor.
    Coupled {
        /// Index of the referenced row within the descriptor.
        normal_row: usize,
        /// Lower coefficient.
        low: f64,
        /// Upper coefficient.
        high: f64,
    },
}

impl ForceBound {
    /// Symmetric constant limits `[-limit, limit]`.
    #[must_use]
    pub fn symmetric(limit: f64) -> Self {
        Self::Fixed {
            low: -limit,
            high: limit,
        }
    }

    /// Non-negative force with no upper limit.
    #[must_use]
    pub fn unilateral() -> Self {
        Self::Fixed {
            low: 0.0,
            high: f64::INFINITY,
        }
    }

    /// Symmetric coefficient `[-coefficient, coefficient]` times row `normal_row`.
    #[must_use]
    pub fn coupled(normal_row: usize, coefficient: f64) -> Self {
        Self::Coupled {
            normal_row,
            low: -coefficient,
            high: coefficient,
        }
    }

    /// Row this bound depends on, if any.
    #[must_use]
    pub fn dependency(&self) -> Option<usize> {
        match self {
            Self::Fixed { .. } => None,
            Self::Coupled { normal_row, .. } => Some(*normal_row),
        }
    }

    /// Effective `(low, high)` given the current row forces.
    ///
    /// A referenced force that is missing or negative counts as zero.
    #[must_use]
    pub fn resolve(&self, forces: &[f64]) -> (f64, f64) {
        match *self {
            Self::Fixed { low, high } => (low, high),
            Self::Coupled {
                normal_row,
                low,
                high,
            } => {
                let normal = forces.get(normal_row).copied().unwrap_or(0.0).max(0.0);
                (low * normal, high * normal)
            }
        }
    }
}

/// What a row was derived from, so solver forces can be written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowSource {
    /// Non-penetration row of a contact point.
    ContactNormal {
        /// Index of the point in the manifold.
        point: usize,
    },
    /// Friction row of a contact point.
    ContactFriction {
        /// Index of the point in the manifold.
        point: usize,
        /// Tangent direction (0 or 1).
        axis: usize,
    },
    /// One locked degree of freedom of a joint.
    JointAxis {
        /// Slot in the joint force array (0-2 linear, 3-5 angular).
        axis: usize,
    },
}

/// One scalar velocity constraint handed to the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    /// Jacobian blocks for both bodies.
    pub jacobian: JacobianPair,
    /// Force limits.
    pub bound: ForceBound,
    /// Right-hand side: desired change of the row velocity, scaled to
    /// acceleration by the descriptor's force scale.
    pub acceleration: f64,
    /// Target separating speed from restitution or position stabilisation.
    pub bias_velocity: f64,
    /// Position error the row corrects (penetration depth or joint error).
    pub penetration: f64,
    /// Gain converting `penetration` into `bias_velocity`.
    pub penetration_stiffness: f64,
    /// Restitution coefficient. Negative marks an overridden friction row.
    pub restitution: f64,
    /// Diagonal regularizer (numerical compliance).
    pub regularizer: f64,
    /// Whether the row models a soft material.
    pub soft: bool,
    /// Previous step's force, for warm starting.
    pub initial_force: f64,
    /// Origin of the row.
    pub source: RowSource,
}

impl ConstraintRow {
    /// Row with the given Jacobian and origin and neutral everything else.
    #[must_use]
    pub fn new(jacobian: JacobianPair, source: RowSource) -> Self {
        Self {
            jacobian,
            bound: ForceBound::unilateral(),
            acceleration: 0.0,
            bias_velocity: 0.0,
            penetration: 0.0,
            penetration_stiffness: 0.0,
            restitution: 0.0,
            regularizer: 0.0,
            soft: false,
            initial_force: 0.0,
            source,
        }
    }

    /// Whether the right-hand side was supplied from outside.
    #[must_use]
    pub fn is_acceleration_overridden(&self) -> bool {
        self.restitution < 0.0
    }

    /// Effective force limits for the current row forces.
    #[must_use]
    pub fn bounds(&self, forces: &[f64]) -> (f64, f64) {
        self.bound.resolve(forces)
    }
}
