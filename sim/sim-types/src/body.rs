//! Body identity, pose and persistence types.
//!
//! Poses follow the frame convention of the constraint core: the local X
//! axis is the *front* direction, Y is *up* and Z is *right*. Joint frames,
//! contact tangents and the angular row builders all read axes through
//! [`Pose::front`], [`Pose::up`] and [`Pose::right`].

use nalgebra::{Isometry3, Point3, Quaternion, UnitQuaternion, Vector3, Vector4};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a rigid body in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Unique identifier for a bilateral joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(pub u64);

impl JointId {
    /// Create a new joint ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Canonical key for an unordered pair of bodies.
///
/// The two ids are stored sorted, so `PairKey::new(a, b) == PairKey::new(b, a)`
/// and a lookup never depends on which body initiates it.
///
/// # Example
///
/// ```
/// use sim_types::{BodyId, PairKey};
///
/// let ab = PairKey::new(BodyId::new(7), BodyId::new(3));
/// let ba = PairKey::new(BodyId::new(3), BodyId::new(7));
/// assert_eq!(ab, ba);
/// assert_eq!(ab.low(), BodyId::new(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairKey {
    low: BodyId,
    high: BodyId,
}

impl PairKey {
    /// Build the canonical key for two bodies.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// The smaller body id.
    #[must_use]
    pub const fn low(self) -> BodyId {
        self.low
    }

    /// The larger body id.
    #[must_use]
    pub const fn high(self) -> BodyId {
        self.high
    }

    /// Whether both ids name the same body.
    #[must_use]
    pub fn is_self_pair(self) -> bool {
        self.low == self.high
    }

    /// Whether `body` is one of the two bodies of this pair.
    #[must_use]
    pub fn involves(self, body: BodyId) -> bool {
        self.low == body || self.high == body
    }

    /// Packed 64-bit tag: low id in the lower half, high id in the upper half.
    ///
    /// Only meaningful while both ids fit in 32 bits.
    #[must_use]
    pub fn packed(self) -> u64 {
        (self.low.raw() & 0xffff_ffff) | (self.high.raw() << 32)
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pair({}, {})", self.low.0, self.high.0)
    }
}

/// Position and orientation of a rigid body or of a joint frame.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Pose from an isometry.
    #[must_use]
    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self {
            position: Point3::from(iso.translation.vector),
            rotation: iso.rotation,
        }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Rotate a vector from local to world coordinates.
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Local +X in world coordinates.
    #[must_use]
    pub fn front(&self) -> Vector3<f64> {
        self.rotation * Vector3::x()
    }

    /// Local +Y in world coordinates.
    #[must_use]
    pub fn up(&self) -> Vector3<f64> {
        self.rotation * Vector3::y()
    }

    /// Local +Z in world coordinates.
    #[must_use]
    pub fn right(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }

    /// The inverse pose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: Point3::from(-(inv_rotation * self.position.coords)),
            rotation: inv_rotation,
        }
    }

    /// Compose two poses: `other` expressed in `self`'s frame, returned in world.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body, both in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity of the centre of mass (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Twist with the given linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Body at rest.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Angular velocity only.
    #[must_use]
    pub fn angular(omega: Vector3<f64>) -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: omega,
        }
    }

    /// Velocity of a point at `offset` from the centre of mass: `v + ω × r`.
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Plain numeric record of the body fields that survive save/load.
///
/// Everything is stored as raw `f64` arrays so a persistence layer can
/// write it without knowing about nalgebra. The rotation is stored as
/// quaternion coordinates `[i, j, k, w]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodySnapshot {
    /// World position of the body origin.
    pub position: [f64; 3],
    /// World orientation as `[i, j, k, w]`.
    pub rotation: [f64; 4],
    /// Angular velocity.
    pub omega: [f64; 3],
    /// Linear velocity.
    pub velocity: [f64; 3],
    /// Centre of mass in body-local coordinates.
    pub center_of_mass: [f64; 3],
}

impl BodySnapshot {
    /// Capture the persisted fields of a body.
    #[must_use]
    pub fn capture(pose: &Pose, twist: &Twist, center_of_mass: &Vector3<f64>) -> Self {
        let q = pose.rotation.coords;
        Self {
            position: [pose.position.x, pose.position.y, pose.position.z],
            rotation: [q.x, q.y, q.z, q.w],
            omega: [twist.angular.x, twist.angular.y, twist.angular.z],
            velocity: [twist.linear.x, twist.linear.y, twist.linear.z],
            center_of_mass: [center_of_mass.x, center_of_mass.y, center_of_mass.z],
        }
    }

    /// Rebuild the pose exactly as it was captured.
    ///
    /// The quaternion is not renormalised, so the round trip is bit-identical.
    #[must_use]
    pub fn pose(&self) -> Pose {
        let rotation = UnitQuaternion::new_unchecked(Quaternion::from_vector(Vector4::from(
            self.rotation,
        )));
        Pose::from_position_rotation(Point3::from(self.position), rotation)
    }

    /// Rebuild the twist.
    #[must_use]
    pub fn twist(&self) -> Twist {
        Twist::new(Vector3::from(self.velocity), Vector3::from(self.omega))
    }

    /// The stored centre of mass.
    #[must_use]
    pub fn center_of_mass(&self) -> Vector3<f64> {
        Vector3::from(self.center_of_mass)
    }

    /// Whether every stored value is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(&self.rotation)
            .chain(&self.omega)
            .chain(&self.velocity)
            .chain(&self.center_of_mass)
            .all(|x| x.is_finite())
    }
}
