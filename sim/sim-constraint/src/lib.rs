//! Constraint rows and bilateral joints for rigid-body simulation.
//!
//! This crate turns "these two bodies are linked" into rows an iterative
//! complementarity solver can consume. It does not solve anything itself.
//!
//! # Building blocks
//!
//! - [`BodyState`]: frozen per-step view of a body (pose, velocities,
//!   inverse mass and world inverse inertia, gyroscopic term)
//! - [`JacobianPair`]: linear + angular sensitivity of one row to each body
//! - [`ForceBound`]: constant limits, or limits proportional to another
//!   row's resolved force (friction coupling)
//! - [`ConstraintRow`] / [`ConstraintDescriptor`]: the rows and their
//!   fixed-capacity container handed to the solver
//! - [`Joint`]: weld, hinge and ball-and-socket joints with give-way
//! - [`ConstraintIslands`]: union-find grouping for parallel derivation
//!
//! # Row formulation
//!
//! ```text
//! J0 · v0 + J1 · v1 = target            (velocity level)
//! rhs = gyro + (target - J·v) / dt       (what the solver drives to)
//! low(f*) <= f <= high(f*)               (f* = forces of other rows)
//! ```
//!
//! # Example
//!
//! ```
//! use sim_constraint::{BodyState, ConstraintDescriptor, Joint, JointKind};
//! use sim_types::{BodyId, ConstraintConfig, JointId, Pose};
//! use nalgebra::{Matrix3, Point3};
//!
//! let base = BodyState::fixed(BodyId::new(0), Point3::origin());
//! let arm = BodyState::dynamic(
//!     BodyId::new(1),
//!     Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
//!     1.0,
//!     Matrix3::identity(),
//! );
//!
//! let hinge = Joint::between(JointId::new(0), JointKind::Hinge, &arm, &base).unwrap();
//! let mut desc = ConstraintDescriptor::new(1.0 / 240.0, hinge.row_count());
//! hinge.derive_rows(&arm, &base, &mut desc, &ConstraintConfig::default()).unwrap();
//! assert_eq!(desc.len(), 5);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod descriptor;
pub mod frame;
mod islands;
mod joint;
mod row;
mod state;

pub use descriptor::ConstraintDescriptor;
pub use frame::{AngularStrategy, JointFrames};
pub use islands::{ConstraintIslands, Island};
pub use joint::{anchor_separation, ConstraintLink, Joint, JointKind, UNBOUNDED_JOINT_LIMIT};
pub use row::{ConstraintRow, ForceBound, Jacobian, JacobianPair, RowSource};
pub use state::BodyState;

// Re-export types needed for constraint computation
pub use sim_types::{BodyId, JointId, Pose, Vector3};
