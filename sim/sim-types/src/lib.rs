//! Core types for rigid-body constraint building.
//!
//! This crate provides the plain data shared by the constraint crates:
//!
//! - [`BodyId`] / [`JointId`] - Stable identifiers
//! - [`PairKey`] - Order-independent key for a pair of bodies
//! - [`Pose`] / [`Twist`] - Rigid transform and velocity
//! - [`BodySnapshot`] - Fields a persistence layer saves and restores
//! - [`SimulationConfig`] - Timestep, row builder thresholds, parallelism
//! - [`SimError`] - Errors that abort a step
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. Everything here
//! is pure data with no physics attached.
//!
//! # Frame convention
//!
//! - X: front
//! - Y: up
//! - Z: right
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{BodyId, PairKey, Pose, Twist};
//! use nalgebra::{Point3, Vector3};
//!
//! let key = PairKey::new(BodyId::new(2), BodyId::new(1));
//! assert_eq!(key.low(), BodyId::new(1));
//!
//! let pose = Pose::from_position(Point3::new(0.0, 1.0, 0.0));
//! let twist = Twist::linear(Vector3::new(0.0, -1.0, 0.0));
//! assert_eq!(pose.front(), Vector3::x());
//! assert!(twist.is_finite());
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;

pub use body::{BodyId, BodySnapshot, JointId, PairKey, Pose, Twist};
pub use config::{ConstraintConfig, ParallelConfig, SimulationConfig};
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
