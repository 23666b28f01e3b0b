//! Rigid-body records and per-step constraint row building.
//!
//! This crate owns the bodies, contacts and joints of a scene and, once per
//! step, turns them into the rows an external iterative solver consumes.
//! It builds on [`sim_types`] for data, [`sim_constraint`] for rows and
//! joints, and [`sim_contact`] for persistent contacts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Owns: bodies, contacts (by body pair), joints, config      │
//! │  Provides: lifecycle, contact attach/detach, persistence    │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │  build_rows()
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Body states + joint give-way + islands              │
//! │  Frozen snapshot per body; static bodies never join islands │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │  rayon, one task per island
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        StepRows                              │
//! │  One descriptor per constraint, ordered island by island    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It can be used in:
//!
//! - Headless training loops
//! - Analysis tools
//! - Other engines that bring their own solver
//!
//! # Quick Start
//!
//! ```
//! use sim_core::{ShapeClass, World};
//! use sim_constraint::JointKind;
//! use sim_types::{Pose, SimulationConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = World::new(SimulationConfig::default());
//! let base = world.add_body(Pose::identity(), ShapeClass::NonConvex);
//! let arm = world.add_dynamic_body(
//!     Pose::from_position(Point3::new(0.0, 1.0, 0.0)),
//!     1.0,
//!     Vector3::new(0.1, 0.1, 0.1),
//! );
//! world.add_joint(JointKind::Hinge, arm, base).unwrap();
//!
//! let rows = world.build_rows().unwrap();
//! assert_eq!(rows.row_count(), 5);
//!
//! // ... solve, then hand the forces back for warm starting
//! let forces: Vec<Vec<f64>> = rows
//!     .blocks()
//!     .iter()
//!     .map(|block| block.descriptor.initial_forces())
//!     .collect();
//! world.apply_resolved_forces(&rows, &forces).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/sim-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod body;
mod parallel;
mod world;

pub use body::{RigidBody, ShapeClass, INFINITE_MASS, MINIMUM_MASS};
pub use world::{ConstraintOwner, RowBlock, StepRows, World};

// Re-export key types from sim-types for convenience
pub use sim_types::{
    BodyId, BodySnapshot, ConstraintConfig, JointId, PairKey, ParallelConfig, Pose, SimError,
    SimulationConfig, Twist,
};
