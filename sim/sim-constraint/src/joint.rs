//! Bilateral joints and their row derivation.
//!
//! A joint pins an anchor frame on one body to an anchor frame on another.
//! Every locked degree of freedom becomes one row:
//!
//! | Kind | Linear rows | Angular rows |
//! |------|-------------|--------------|
//! | [`JointKind::Weld`] | 3 | 3 |
//! | [`JointKind::Hinge`] | 3 | 2 (front axes aligned, twist free) |
//! | [`JointKind::BallAndSocket`] | 3 | 0 |
//!
//! Angular rows switch between a small-angle approximation and an exact
//! swing/twist decomposition depending on how far the front axes have
//! drifted apart (see [`AngularStrategy`]).
//!
//! # Give-way
//!
//! Joints are not rigid to infinite load. Once the force resolved on any
//! locked axis in the previous step reaches the configured fraction of the
//! joint's limit, [`Joint::update_breakage`] deactivates the joint and it
//! stops contributing rows.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, ConstraintConfig, JointId, Pose, Result, SimError};
use tracing::warn;

use crate::frame::{self, AngularError, AngularStrategy, JointFrames};
use crate::{BodyState, ConstraintDescriptor, ConstraintRow, ForceBound, JacobianPair, RowSource};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default force and torque limit: effectively unbreakable.
pub const UNBOUNDED_JOINT_LIMIT: f64 = 1.0e15;

/// Squared distance the two centres of mass must be apart to define a weld frame.
const MIN_FRAME_DIRECTION_SQ: f64 = 1.0e-3;

/// A pair of bodies a constraint links.
///
/// Contacts and joints both implement this so islands can be built over
/// either.
pub trait ConstraintLink {
    /// First body.
    fn body0(&self) -> BodyId;

    /// Second body.
    fn body1(&self) -> BodyId;
}

/// Which degrees of freedom a joint locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// All six degrees of freedom locked.
    Weld,
    /// Rotation about the front axis free.
    Hinge,
    /// All rotation free.
    BallAndSocket,
}

impl JointKind {
    /// Number of locked angular degrees of freedom.
    #[must_use]
    pub const fn angular_rows(self) -> usize {
        match self {
            Self::Weld => 3,
            Self::Hinge => 2,
            Self::BallAndSocket => 0,
        }
    }

    /// Number of rows the joint contributes per step.
    #[must_use]
    pub const fn row_count(self) -> usize {
        3 + self.angular_rows()
    }
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weld => write!(f, "weld"),
            Self::Hinge => write!(f, "hinge"),
            Self::BallAndSocket => write!(f, "ball-and-socket"),
        }
    }
}

/// A bilateral joint between two bodies.
///
/// # Example
///
/// ```
/// use sim_constraint::{BodyState, ConstraintDescriptor, Joint, JointKind};
/// use sim_types::{BodyId, ConstraintConfig, JointId, Pose};
/// use nalgebra::{Matrix3, Point3};
///
/// let a = BodyState::dynamic(BodyId::new(0), Pose::from_position(Point3::new(0.0, 1.0, 0.0)), 1.0, Matrix3::identity());
/// let b = BodyState::dynamic(BodyId::new(1), Pose::from_position(Point3::new(1.0, 1.0, 0.0)), 1.0, Matrix3::identity());
///
/// let joint = Joint::weld_between(JointId::new(0), &a, &b).unwrap();
/// let mut desc = ConstraintDescriptor::new(1.0 / 240.0, joint.row_count());
/// let rows = joint.derive_rows(&a, &b, &mut desc, &ConstraintConfig::default()).unwrap();
/// assert_eq!(rows, 6);
/// assert_eq!(joint.kind(), JointKind::Weld);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    id: JointId,
    kind: JointKind,
    body0: BodyId,
    body1: BodyId,
    /// Anchor frame in the first body's local space.
    local0: Pose,
    /// Anchor frame in the second body's local space.
    local1: Pose,
    max_force: f64,
    max_torque: f64,
    softness: f64,
    active: bool,
    /// Resolved force per slot from the last solve: 0-2 linear, 3-5 angular.
    forces: [f64; 6],
}

impl Joint {
    /// Create a joint from explicit local anchor frames.
    #[must_use]
    pub fn new(
        id: JointId,
        kind: JointKind,
        body0: BodyId,
        body1: BodyId,
        local0: Pose,
        local1: Pose,
    ) -> Self {
        Self {
            id,
            kind,
            body0,
            body1,
            local0,
            local1,
            max_force: UNBOUNDED_JOINT_LIMIT,
            max_torque: UNBOUNDED_JOINT_LIMIT,
            softness: 0.0,
            active: true,
            forces: [0.0; 6],
        }
    }

    /// Create a joint whose frame sits between the two centres of mass.
    ///
    /// The pivot is the midpoint of the centres of mass and the front axis
    /// points from the first to the second. Both anchors coincide in the
    /// current configuration.
    pub fn between(
        id: JointId,
        kind: JointKind,
        state0: &BodyState,
        state1: &BodyState,
    ) -> Result<Self> {
        let dir = state1.center_of_mass - state0.center_of_mass;
        if dir.norm_squared() <= MIN_FRAME_DIRECTION_SQ {
            return Err(SimError::invalid_config(format!(
                "centres of mass of {} and {} are too close to define a joint frame",
                state0.id, state1.id
            )));
        }
        let rotation = frame::basis_from_front(&dir)
            .ok_or_else(|| SimError::invalid_config("degenerate joint frame direction"))?;
        let pivot = Point3::from(
            (state0.center_of_mass.coords + state1.center_of_mass.coords) * 0.5,
        );
        let world = Pose::from_position_rotation(pivot, rotation);

        Ok(Self::new(
            id,
            kind,
            state0.id,
            state1.id,
            state0.pose.inverse().compose(&world),
            state1.pose.inverse().compose(&world),
        ))
    }

    /// Weld the two bodies in their current relative pose.
    pub fn weld_between(id: JointId, state0: &BodyState, state1: &BodyState) -> Result<Self> {
        Self::between(id, JointKind::Weld, state0, state1)
    }

    /// Set the linear force limit.
    #[must_use]
    pub fn with_max_force(mut self, max_force: f64) -> Self {
        self.max_force = max_force.abs();
        self
    }

    /// Set the torque limit.
    #[must_use]
    pub fn with_max_torque(mut self, max_torque: f64) -> Self {
        self.max_torque = max_torque.abs();
        self
    }

    /// Set the softness, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_softness(mut self, softness: f64) -> Self {
        self.softness = softness.clamp(0.0, 1.0);
        self
    }

    /// Joint id.
    #[must_use]
    pub fn id(&self) -> JointId {
        self.id
    }

    /// Which degrees of freedom are locked.
    #[must_use]
    pub fn kind(&self) -> JointKind {
        self.kind
    }

    /// Local anchor frames on both bodies.
    #[must_use]
    pub fn local_frames(&self) -> (&Pose, &Pose) {
        (&self.local0, &self.local1)
    }

    /// Linear force limit.
    #[must_use]
    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    /// Torque limit.
    #[must_use]
    pub fn max_torque(&self) -> f64 {
        self.max_torque
    }

    /// Softness, used as the row regularizer.
    #[must_use]
    pub fn softness(&self) -> f64 {
        self.softness
    }

    /// Whether the joint contributes rows.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Rows the joint contributes while active.
    #[must_use]
    pub fn row_count(&self) -> usize {
        if self.active {
            self.kind.row_count()
        } else {
            0
        }
    }

    /// Resolved forces from the last solve.
    #[must_use]
    pub fn resolved_forces(&self) -> &[f64; 6] {
        &self.forces
    }

    /// Re-enable a joint whose limits are usable, clearing stale forces.
    ///
    /// The torque limit only matters for kinds that lock angular axes.
    /// Returns whether the joint is active afterwards.
    pub fn activate(&mut self) -> bool {
        let limits_ok = self.max_force > 0.0
            && (self.kind.angular_rows() == 0 || self.max_torque > 0.0);
        if limits_ok {
            self.forces = [0.0; 6];
        }
        self.active = limits_ok;
        self.active
    }

    /// Deactivate the joint.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Store the solver's forces for the rows from the last derivation.
    ///
    /// `forces` must hold one value per row, in derivation order.
    pub fn store_resolved_forces(&mut self, forces: &[f64]) -> Result<()> {
        let expected = self.kind.row_count();
        if forces.len() != expected {
            return Err(SimError::ForceCountMismatch {
                expected,
                actual: forces.len(),
            });
        }
        self.forces = [0.0; 6];
        self.forces[..expected].copy_from_slice(forces);
        Ok(())
    }

    /// Deactivate the joint if any last resolved force reached `ratio` of its limit.
    ///
    /// Returns `true` when this call broke the joint.
    pub fn update_breakage(&mut self, ratio: f64) -> bool {
        if !self.active {
            return false;
        }
        let force_limit = self.max_force * ratio;
        let torque_limit = self.max_torque * ratio;
        let locked = 3 + self.kind.angular_rows();
        for (slot, &value) in self.forces.iter().enumerate().take(locked) {
            let limit = if slot < 3 { force_limit } else { torque_limit };
            if value.abs() >= limit {
                warn!(
                    joint = %self.id,
                    slot,
                    value,
                    max_force = self.max_force,
                    max_torque = self.max_torque,
                    "Joint gave way"
                );
                self.active = false;
                return true;
            }
        }
        false
    }

    /// Append this joint's rows to `desc`.
    ///
    /// `state0` and `state1` must be the snapshots of the joint's first and
    /// second body. Returns the number of rows written.
    pub fn derive_rows(
        &self,
        state0: &BodyState,
        state1: &BodyState,
        desc: &mut ConstraintDescriptor,
        config: &ConstraintConfig,
    ) -> Result<usize> {
        if !self.active {
            return Err(SimError::inactive(self.id.to_string()));
        }
        if state0.id != self.body0 {
            return Err(SimError::InvalidBodyId(state0.id.raw()));
        }
        if state1.id != self.body1 {
            return Err(SimError::InvalidBodyId(state1.id.raw()));
        }

        let frames = JointFrames::global(state0, &self.local0, state1, &self.local1);
        let start = desc.len();
        let pivot0 = frames.frame0.position;
        let pivot1 = frames.frame1.position;

        for (axis, dir) in [
            frames.frame1.front(),
            frames.frame1.up(),
            frames.frame1.right(),
        ]
        .iter()
        .enumerate()
        {
            let jacobian = JacobianPair::point(
                dir,
                &state0.lever_arm(&pivot0),
                &state1.lever_arm(&pivot1),
            );
            let error = dir.dot(&(pivot0 - pivot1));
            let correction = -error.clamp(
                -config.max_position_correction,
                config.max_position_correction,
            );
            let row = self.bilateral_row(
                jacobian,
                axis,
                correction,
                self.max_force,
                state0,
                state1,
                desc,
                config,
            );
            desc.push_row(row)?;
        }

        let angular = self.angular_errors(&frames, config);
        for (slot, error) in angular.iter().take(self.kind.angular_rows()).enumerate() {
            let jacobian = JacobianPair::angular(&error.axis);
            let row = self.bilateral_row(
                jacobian,
                3 + slot,
                error.angle,
                self.max_torque,
                state0,
                state1,
                desc,
                config,
            );
            desc.push_row(row)?;
        }

        Ok(desc.len() - start)
    }

    fn angular_errors(&self, frames: &JointFrames, config: &ConstraintConfig) -> [AngularError; 3] {
        match AngularStrategy::select(frames.front_cosine(), config.small_angle_cosine) {
            AngularStrategy::SmallAngle => frame::small_angle_errors(frames),
            AngularStrategy::SwingTwist => frame::swing_twist_errors(frames),
        }
    }

    /// One bounded row driving `correction` (length or angle) to zero.
    #[allow(clippy::too_many_arguments)]
    fn bilateral_row(
        &self,
        jacobian: JacobianPair,
        axis: usize,
        correction: f64,
        limit: f64,
        state0: &BodyState,
        state1: &BodyState,
        desc: &ConstraintDescriptor,
        config: &ConstraintConfig,
    ) -> ConstraintRow {
        let stiffness = config.baumgarte_factor * desc.inv_timestep();
        let bias_velocity = stiffness * correction;
        let rel_speed = -jacobian.relative_velocity(state0, state1);
        let rel_gyro = jacobian.relative_gyro(state0, state1);

        let mut row = ConstraintRow::new(jacobian, RowSource::JointAxis { axis });
        row.bound = ForceBound::symmetric(limit);
        row.bias_velocity = bias_velocity;
        row.penetration = correction;
        row.penetration_stiffness = stiffness;
        row.acceleration = rel_gyro + (rel_speed + bias_velocity) * desc.force_scale();
        row.regularizer = self.softness;
        row.initial_force = self.forces[axis];
        row
    }
}

impl ConstraintLink for Joint {
    fn body0(&self) -> BodyId {
        self.body0
    }

    fn body1(&self) -> BodyId {
        self.body1
    }
}

/// Offset between the two anchor points in world space.
#[must_use]
pub fn anchor_separation(frames: &JointFrames) -> Vector3<f64> {
    frames.frame0.position - frames.frame1.position
}
