//! Read-only body snapshot consumed by the row builders.

use nalgebra::{Matrix3, Point3, Vector3};
use sim_types::{BodyId, Pose};

/// Kinematic and mass state of one body, frozen for the duration of a step.
///
/// Row builders never touch a live body: the owning world takes one of
/// these per body before derivation starts, so derivation can run on any
/// thread without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    /// Which body this is.
    pub id: BodyId,
    /// Pose of the body origin in world frame.
    pub pose: Pose,
    /// Centre of mass in world frame.
    pub center_of_mass: Point3<f64>,
    /// Linear velocity of the centre of mass.
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity.
    pub angular_velocity: Vector3<f64>,
    /// Inverse mass (0 for static bodies).
    pub inv_mass: f64,
    /// Inverse inertia tensor in world frame.
    pub inv_inertia: Matrix3<f64>,
    /// Angular acceleration produced by the gyroscopic torque.
    pub gyro_alpha: Vector3<f64>,
}

impl BodyState {
    /// Create a static body state at `position`.
    #[must_use]
    pub fn fixed(id: BodyId, position: Point3<f64>) -> Self {
        Self {
            id,
            pose: Pose::from_position(position),
            center_of_mass: position,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            inv_mass: 0.0,
            inv_inertia: Matrix3::zeros(),
            gyro_alpha: Vector3::zeros(),
        }
    }

    /// Create a movable body state with the centre of mass at the pose origin.
    #[must_use]
    pub fn dynamic(id: BodyId, pose: Pose, inv_mass: f64, inv_inertia: Matrix3<f64>) -> Self {
        Self {
            id,
            pose,
            center_of_mass: pose.position,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            inv_mass,
            inv_inertia,
            gyro_alpha: Vector3::zeros(),
        }
    }

    /// Set linear and angular velocity.
    #[must_use]
    pub fn with_velocity(mut self, linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Set the world centre of mass.
    #[must_use]
    pub fn with_center_of_mass(mut self, center_of_mass: Point3<f64>) -> Self {
        self.center_of_mass = center_of_mass;
        self
    }

    /// Set the gyroscopic angular acceleration.
    #[must_use]
    pub fn with_gyro_alpha(mut self, gyro_alpha: Vector3<f64>) -> Self {
        self.gyro_alpha = gyro_alpha;
        self
    }

    /// Whether the body cannot be moved by constraint forces.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Offset of a world point from the centre of mass.
    #[must_use]
    pub fn lever_arm(&self, point: &Point3<f64>) -> Vector3<f64> {
        point - self.center_of_mass
    }

    /// Velocity of a world point rigidly attached to the body.
    #[must_use]
    pub fn velocity_at(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(&self.lever_arm(point))
    }
}
