//! Rigid body record.
//!
//! A body stores its mass as a principal-axis diagonal in the body frame and
//! keeps a cached world-frame inverse inertia, refreshed once per step
//! before any rows are derived. Bodies whose mass is negligible, or whose
//! shape cannot carry mass, are immovable: their inverse mass and inverse
//! inertia are exactly zero.

use nalgebra::{Matrix3, Point3, Vector3};
use sim_constraint::BodyState;
use sim_contact::ContactRegistry;
use sim_types::{BodyId, BodySnapshot, Pose, Result, SimError, Twist};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mass assigned to immovable bodies.
pub const INFINITE_MASS: f64 = 1.0e15;

/// Smallest mass treated as movable.
pub const MINIMUM_MASS: f64 = 1.0e-5;

/// Principal inertia is clamped to this range, as a multiple of the mass.
const INERTIA_RANGE: (f64, f64) = (0.001, 1000.0);

/// Mass-bearing classification of a body's collision shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeClass {
    /// No shape at all; such a body never moves.
    #[default]
    Null,
    /// A convex shape that can carry mass.
    Convex,
    /// A mesh or other non-convex shape; always immovable.
    NonConvex,
}

impl ShapeClass {
    /// Whether a body with this shape may have finite mass.
    #[must_use]
    pub fn supports_mass(self) -> bool {
        matches!(self, Self::Convex)
    }
}

/// A rigid body taking part in constraint resolution.
///
/// # Example
///
/// ```
/// use sim_core::{RigidBody, ShapeClass};
/// use sim_types::{BodyId, Pose};
/// use nalgebra::Vector3;
///
/// let mut body = RigidBody::new(BodyId::new(1), Pose::identity(), ShapeClass::Convex);
/// assert!(body.is_static());
///
/// body.set_mass_matrix(2.0, Vector3::new(0.1, 0.1, 0.1));
/// assert!(!body.is_static());
/// assert_eq!(body.inv_mass(), 0.5);
/// ```
#[derive(Debug)]
pub struct RigidBody {
    id: BodyId,
    name: Option<String>,
    pose: Pose,
    twist: Twist,
    shape: ShapeClass,
    local_com: Vector3<f64>,
    mass: f64,
    inv_mass: f64,
    inertia: Vector3<f64>,
    inv_inertia: Vector3<f64>,
    inv_world_inertia: Matrix3<f64>,
    gyroscopic: bool,
    gyro_torque: Vector3<f64>,
    gyro_alpha: Vector3<f64>,
    contacts: ContactRegistry,
}

impl RigidBody {
    /// Create a body. It stays immovable until [`Self::set_mass_matrix`] is called.
    #[must_use]
    pub fn new(id: BodyId, pose: Pose, shape: ShapeClass) -> Self {
        Self {
            id,
            name: None,
            pose,
            twist: Twist::zero(),
            shape,
            local_com: Vector3::zeros(),
            mass: INFINITE_MASS,
            inv_mass: 0.0,
            inertia: Vector3::repeat(INFINITE_MASS),
            inv_inertia: Vector3::zeros(),
            inv_world_inertia: Matrix3::zeros(),
            gyroscopic: false,
            gyro_torque: Vector3::zeros(),
            gyro_alpha: Vector3::zeros(),
            contacts: ContactRegistry::new(),
        }
    }

    /// Set a debug name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the velocity of the centre of mass and the angular velocity.
    #[must_use]
    pub fn with_twist(mut self, twist: Twist) -> Self {
        self.twist = twist;
        self
    }

    /// Set mass and principal inertia in one builder step.
    #[must_use]
    pub fn with_mass(mut self, mass: f64, inertia: Vector3<f64>) -> Self {
        self.set_mass_matrix(mass, inertia);
        self
    }

    /// Assign mass and principal inertia.
    ///
    /// The sign of the mass is ignored. A mass below [`MINIMUM_MASS`], or a
    /// shape that cannot carry mass, makes the body immovable. Otherwise
    /// each inertia component is clamped to `[0.001 m, 1000 m]`.
    pub fn set_mass_matrix(&mut self, mass: f64, inertia: Vector3<f64>) {
        let mass = mass.abs();
        if mass < MINIMUM_MASS || !self.shape.supports_mass() {
            self.mass = INFINITE_MASS;
            self.inv_mass = 0.0;
            self.inertia = Vector3::repeat(INFINITE_MASS);
            self.inv_inertia = Vector3::zeros();
        } else {
            let (low, high) = (INERTIA_RANGE.0 * mass, INERTIA_RANGE.1 * mass);
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
            self.inertia = inertia.map(|i| i.abs().clamp(low, high));
            self.inv_inertia = self.inertia.map(|i| 1.0 / i);
        }
        self.update_inv_inertia_matrix();
    }

    /// Recompute the world inverse inertia from the current orientation,
    /// then the gyroscopic terms if enabled.
    pub fn update_inv_inertia_matrix(&mut self) {
        let rotation = self.pose.rotation.to_rotation_matrix();
        let r = rotation.matrix();
        self.inv_world_inertia = r * Matrix3::from_diagonal(&self.inv_inertia) * r.transpose();

        if self.gyroscopic && !self.is_static() {
            self.gyro_torque = self.twist.angular.cross(&self.angular_momentum());
            self.gyro_alpha = self.inv_world_inertia * self.gyro_torque;
        } else {
            self.gyro_torque = Vector3::zeros();
            self.gyro_alpha = Vector3::zeros();
        }
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Debug name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Shape classification.
    #[must_use]
    pub fn shape(&self) -> ShapeClass {
        self.shape
    }

    /// Pose of the body origin.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Move the body. The world inertia is refreshed on the next update.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Velocities.
    #[must_use]
    pub fn twist(&self) -> &Twist {
        &self.twist
    }

    /// Replace the velocities.
    pub fn set_twist(&mut self, twist: Twist) {
        self.twist = twist;
    }

    /// Mass (`INFINITE_MASS` when immovable).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse mass (0 when immovable).
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Principal inertia in the body frame.
    #[must_use]
    pub fn inertia(&self) -> Vector3<f64> {
        self.inertia
    }

    /// Inverse principal inertia in the body frame.
    #[must_use]
    pub fn inv_inertia(&self) -> Vector3<f64> {
        self.inv_inertia
    }

    /// Cached world-frame inverse inertia.
    #[must_use]
    pub fn inv_world_inertia(&self) -> &Matrix3<f64> {
        &self.inv_world_inertia
    }

    /// Whether constraint forces cannot move the body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Toggle gyroscopic torque. Off by default.
    pub fn set_gyroscopic(&mut self, enabled: bool) {
        self.gyroscopic = enabled;
    }

    /// Whether gyroscopic torque is computed.
    #[must_use]
    pub fn is_gyroscopic(&self) -> bool {
        self.gyroscopic
    }

    /// Gyroscopic torque from the last inertia update.
    #[must_use]
    pub fn gyro_torque(&self) -> Vector3<f64> {
        self.gyro_torque
    }

    /// Angular acceleration caused by the gyroscopic torque.
    #[must_use]
    pub fn gyro_alpha(&self) -> Vector3<f64> {
        self.gyro_alpha
    }

    /// Centre of mass in the body frame.
    #[must_use]
    pub fn centre_of_mass(&self) -> Vector3<f64> {
        self.local_com
    }

    /// Move the centre of mass (body frame).
    pub fn set_centre_of_mass(&mut self, local: Vector3<f64>) {
        self.local_com = local;
    }

    /// Centre of mass in world frame.
    #[must_use]
    pub fn world_centre_of_mass(&self) -> Point3<f64> {
        self.pose.transform_point(&Point3::from(self.local_com))
    }

    /// `m v`
    #[must_use]
    pub fn linear_momentum(&self) -> Vector3<f64> {
        self.twist.linear * self.mass
    }

    /// Angular momentum about the centre of mass, in world frame.
    #[must_use]
    pub fn angular_momentum(&self) -> Vector3<f64> {
        let local_omega = self.pose.rotation.inverse_transform_vector(&self.twist.angular);
        self.pose
            .rotation
            .transform_vector(&self.inertia.component_mul(&local_omega))
    }

    /// Contacts this body takes part in.
    #[must_use]
    pub fn contacts(&self) -> &ContactRegistry {
        &self.contacts
    }

    /// Frozen state for row derivation.
    #[must_use]
    pub fn state(&self) -> BodyState {
        BodyState {
            id: self.id,
            pose: self.pose,
            center_of_mass: self.world_centre_of_mass(),
            linear_velocity: self.twist.linear,
            angular_velocity: self.twist.angular,
            inv_mass: self.inv_mass,
            inv_inertia: self.inv_world_inertia,
            gyro_alpha: self.gyro_alpha,
        }
    }

    /// Capture pose, velocities and centre of mass.
    #[must_use]
    pub fn snapshot(&self) -> BodySnapshot {
        BodySnapshot::capture(&self.pose, &self.twist, &self.local_com)
    }

    /// Restore a snapshot taken with [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Diverged`] if the snapshot holds a non-finite
    /// value; the body is left untouched.
    pub fn restore(&mut self, snapshot: &BodySnapshot) -> Result<()> {
        if !snapshot.is_finite() {
            return Err(SimError::diverged(format!(
                "snapshot of {} has non-finite values",
                self.id
            )));
        }
        self.pose = snapshot.pose();
        self.twist = snapshot.twist();
        self.local_com = snapshot.center_of_mass();
        self.update_inv_inertia_matrix();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn convex(id: u64) -> RigidBody {
        RigidBody::new(BodyId::new(id), Pose::identity(), ShapeClass::Convex)
    }

    #[test]
    fn test_new_body_is_static() {
        let body = convex(1);
        assert!(body.is_static());
        assert_eq!(body.mass(), INFINITE_MASS);
        assert_eq!(body.inv_inertia(), Vector3::zeros());
    }

    #[test]
    fn test_mass_sign_is_ignored() {
        let body = convex(1).with_mass(-4.0, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(body.mass(), 4.0);
        assert_eq!(body.inv_mass(), 0.25);
    }

    #[test]
    fn test_tiny_mass_is_infinite() {
        let body = convex(1).with_mass(1.0e-6, Vector3::new(1.0, 1.0, 1.0));
        assert!(body.is_static());
        assert_eq!(body.mass(), INFINITE_MASS);
    }

    #[test]
    fn test_non_convex_and_null_shapes_are_infinite() {
        for shape in [ShapeClass::Null, ShapeClass::NonConvex] {
            let body = RigidBody::new(BodyId::new(1), Pose::identity(), shape)
                .with_mass(10.0, Vector3::new(1.0, 1.0, 1.0));
            assert!(body.is_static());
            assert_eq!(*body.inv_world_inertia(), Matrix3::zeros());
        }
    }

    #[test]
    fn test_inertia_is_clamped() {
        let body = convex(1).with_mass(2.0, Vector3::new(1.0e-6, -1.0, 1.0e6));
        assert_relative_eq!(body.inertia().x, 0.002, epsilon = 1e-15);
        assert_relative_eq!(body.inertia().y, 1.0, epsilon = 1e-15);
        assert_relative_eq!(body.inertia().z, 2000.0, epsilon = 1e-9);
        assert_relative_eq!(body.inv_inertia().x, 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_inertia_axis_stays_invertible() {
        let mass = 10.0;
        let mut body = convex(1);
        body.set_mass_matrix(mass, Vector3::new(0.0, 5.0, 5.0));

        let (low, high) = (1.0 / (1000.0 * mass), 1.0 / (0.001 * mass));
        for inv in body.inv_inertia().iter() {
            assert!(inv.is_finite());
            assert!((low..=high).contains(inv), "{inv} outside [{low}, {high}]");
        }
        // zero axis lifted to 0.001 * mass, the others untouched
        assert_relative_eq!(body.inv_inertia().x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(body.inv_inertia().y, 0.2, epsilon = 1e-12);
        assert_relative_eq!(body.inv_inertia().z, 0.2, epsilon = 1e-12);
        assert!(!body.is_static());
    }

    #[test]
    fn test_world_inertia_follows_rotation() {
        let mut body = convex(1).with_mass(1.0, Vector3::new(1.0, 2.0, 4.0));
        body.set_pose(Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        ));
        body.update_inv_inertia_matrix();

        // body x now points along world y
        let inv = body.inv_world_inertia();
        assert_relative_eq!(inv[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(inv[(1, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(inv[(2, 2)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(inv[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gyro_terms_are_opt_in() {
        let omega = Vector3::new(1.0, 1.0, 0.0);
        let mut body = convex(1)
            .with_mass(1.0, Vector3::new(1.0, 2.0, 3.0))
            .with_twist(Twist::angular(omega));
        body.update_inv_inertia_matrix();
        assert_eq!(body.gyro_torque(), Vector3::zeros());

        body.set_gyroscopic(true);
        body.update_inv_inertia_matrix();
        let momentum = Vector3::new(1.0, 2.0, 0.0);
        assert_relative_eq!(body.angular_momentum(), momentum, epsilon = 1e-12);
        assert_relative_eq!(body.gyro_torque(), omega.cross(&momentum), epsilon = 1e-12);
        assert_relative_eq!(
            body.gyro_alpha(),
            Vector3::new(0.0, 0.0, 1.0 / 3.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_linear_momentum() {
        let body = convex(1)
            .with_mass(3.0, Vector3::new(1.0, 1.0, 1.0))
            .with_twist(Twist::linear(Vector3::new(1.0, -2.0, 0.0)));
        assert_relative_eq!(body.linear_momentum(), Vector3::new(3.0, -6.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_state_uses_world_centre_of_mass() {
        let mut body = convex(4).with_mass(2.0, Vector3::new(1.0, 1.0, 1.0));
        body.set_pose(Pose::from_position(Point3::new(1.0, 0.0, 0.0)));
        body.set_centre_of_mass(Vector3::new(0.0, 0.5, 0.0));
        body.update_inv_inertia_matrix();

        let state = body.state();
        assert_eq!(state.id, BodyId::new(4));
        assert_eq!(state.center_of_mass, Point3::new(1.0, 0.5, 0.0));
        assert_eq!(state.inv_mass, 0.5);
        assert_relative_eq!(state.inv_inertia, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_snapshot_restore_is_exact() {
        let rotation = UnitQuaternion::from_euler_angles(0.3, -1.2, 2.9);
        let mut body = convex(1).with_mass(1.0, Vector3::new(1.0, 1.0, 1.0));
        body.set_pose(Pose::from_position_rotation(Point3::new(0.1, 0.2, 0.3), rotation));
        body.set_twist(Twist::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(-0.1, 0.0, 0.7)));
        body.set_centre_of_mass(Vector3::new(0.0, 0.01, 0.0));
        let snapshot = body.snapshot();

        let mut other = convex(1).with_mass(1.0, Vector3::new(1.0, 1.0, 1.0));
        other.restore(&snapshot).unwrap();
        assert_eq!(other.pose(), body.pose());
        assert_eq!(other.twist(), body.twist());
        assert_eq!(other.centre_of_mass(), body.centre_of_mass());
        assert_eq!(other.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_rejects_non_finite() {
        let mut body = convex(1);
        let mut snapshot = body.snapshot();
        snapshot.velocity[1] = f64::NAN;
        let err = body.restore(&snapshot).unwrap_err();
        assert!(err.is_diverged());
        assert_eq!(body.twist(), &Twist::zero());
    }
}
