//! Joint frame helpers: basis construction and relative angle measurement.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use sim_types::Pose;

use crate::BodyState;

/// Squared length below which a cross product is treated as degenerate.
const DEGENERATE_CROSS_SQ: f64 = 1.0e-12;

/// Orientation whose front (X) axis is `front`.
///
/// The up and right axes are chosen orthogonal to it. Returns `None` when
/// `front` has (near) zero length.
#[must_use]
pub fn basis_from_front(front: &Vector3<f64>) -> Option<UnitQuaternion<f64>> {
    let front = front.try_normalize(1.0e-9)?;
    let helper = if front.y.abs() < 0.9 {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let right = front.cross(&helper).normalize();
    let up = right.cross(&front);
    let matrix = Matrix3::from_columns(&[front, up, right]);
    Some(UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(matrix),
    ))
}

/// Some unit vector perpendicular to `v`.
#[must_use]
pub fn perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let candidate = if v.x.abs() < 0.57 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let p = v.cross(&candidate);
    p.try_normalize(1.0e-12).unwrap_or_else(Vector3::z)
}

/// Signed angle that rotates `dir` back onto `cos_dir`, measured about `axis`.
///
/// `dir` is first projected onto the plane normal to `axis`, so only the
/// rotation component about `axis` is reported. The result is in `(-π, π]`.
#[must_use]
pub fn calculate_angle(dir: &Vector3<f64>, cos_dir: &Vector3<f64>, axis: &Vector3<f64>) -> f64 {
    let projected = dir - axis * dir.dot(axis);
    let sin_angle = axis.dot(&projected.cross(cos_dir));
    let cos_angle = projected.dot(cos_dir);
    sin_angle.atan2(cos_angle)
}

/// World frames of a joint anchor on both bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFrames {
    /// Anchor frame attached to the first body.
    pub frame0: Pose,
    /// Anchor frame attached to the second body.
    pub frame1: Pose,
}

impl JointFrames {
    /// Place both local anchor frames in world.
    #[must_use]
    pub fn global(b0: &BodyState, local0: &Pose, b1: &BodyState, local1: &Pose) -> Self {
        Self {
            frame0: b0.pose.compose(local0),
            frame1: b1.pose.compose(local1),
        }
    }

    /// Cosine between the two front axes.
    #[must_use]
    pub fn front_cosine(&self) -> f64 {
        self.frame1.front().dot(&self.frame0.front())
    }
}

/// How angular joint rows are derived for the current misalignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngularStrategy {
    /// Three small-angle rows about the second frame's axes.
    SmallAngle,
    /// Exact swing (cone) plus twist (pitch) decomposition.
    SwingTwist,
}

impl AngularStrategy {
    /// Pick the strategy for a front-axis cosine.
    #[must_use]
    pub fn select(front_cosine: f64, small_angle_cosine: f64) -> Self {
        if front_cosine >= small_angle_cosine {
            Self::SmallAngle
        } else {
            Self::SwingTwist
        }
    }
}

/// One angular row: the world axis and the correcting angle about it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularError {
    /// Unit axis of the row.
    pub axis: Vector3<f64>,
    /// Angle to rotate the first body by to remove the error.
    pub angle: f64,
}

/// Small-angle rows: alignment of the front axes about up and right,
/// then alignment of the up axes about front.
#[must_use]
pub fn small_angle_errors(frames: &JointFrames) -> [AngularError; 3] {
    let m0 = &frames.frame0;
    let m1 = &frames.frame1;
    let (front1, up1, right1) = (m1.front(), m1.up(), m1.right());
    [
        AngularError {
            axis: up1,
            angle: calculate_angle(&m0.front(), &front1, &up1),
        },
        AngularError {
            axis: right1,
            angle: calculate_angle(&m0.front(), &front1, &right1),
        },
        AngularError {
            axis: front1,
            angle: calculate_angle(&m0.up(), &up1, &front1),
        },
    ]
}

/// Exact rows: swing about the lateral axis, a zero-error side row, and the
/// residual twist about the first frame's front axis.
#[must_use]
pub fn swing_twist_errors(frames: &JointFrames) -> [AngularError; 3] {
    let m0 = &frames.frame0;
    let m1 = &frames.frame1;
    let (front0, front1) = (m0.front(), m1.front());

    let cross = front1.cross(&front0);
    let lateral = if cross.norm_squared() > DEGENERATE_CROSS_SQ {
        cross.normalize()
    } else {
        // antiparallel fronts: any axis normal to front1 is a valid swing axis
        let up1 = m1.up();
        if up1.cross(&front1).norm_squared() > DEGENERATE_CROSS_SQ {
            up1
        } else {
            perpendicular(&front1)
        }
    };
    let cone = front1.dot(&front0).clamp(-1.0, 1.0).acos();

    let side = lateral.cross(&front0);

    let swung_up = UnitQuaternion::from_axis_angle(
        &nalgebra::Unit::new_unchecked(lateral),
        cone,
    ) * m1.up();
    let pitch = swung_up.dot(&m0.right()).atan2(swung_up.dot(&m0.up()));

    [
        AngularError {
            axis: lateral,
            angle: -cone,
        },
        AngularError {
            axis: side,
            angle: 0.0,
        },
        AngularError {
            axis: front0,
            angle: pitch,
        },
    ]
}
