//! Persistent contacts and contact constraint rows.
//!
//! The narrow phase reports points; this crate keeps them per body pair
//! across steps and turns them into rows for an iterative solver:
//!
//! - **Non-penetration**: one unilateral row per point, with a bias that
//!   is the larger of the restitution target and the penetration recovery
//!   speed (they never add up)
//! - **Friction**: up to two rows per point along the tangent plane,
//!   bounded by a multiple of the point's normal force
//! - **Warm starting**: forces resolved last step are carried over to the
//!   nearest point of the new manifold
//!
//! # Friction cone
//!
//! ```text
//! |f_t| <= mu * f_n      mu = static while sticking, dynamic while sliding
//! ```
//!
//! The cone is linearized into two independent directions. Because the
//! limit depends on `f_n`, a coupled friction row records the index of its
//! normal row instead of a constant (see [`sim_constraint::ForceBound`]).
//!
//! # Example
//!
//! ```
//! use sim_contact::{derive_contact_rows, Contact, ContactPoint};
//! use sim_constraint::{BodyState, ConstraintDescriptor};
//! use sim_types::{BodyId, ConstraintConfig, Pose};
//! use nalgebra::{Matrix3, Point3, Vector3};
//!
//! let ground = BodyState::fixed(BodyId::new(0), Point3::origin());
//! let crate_ = BodyState::dynamic(
//!     BodyId::new(1),
//!     Pose::from_position(Point3::new(0.0, 0.5, 0.0)),
//!     1.0,
//!     Matrix3::identity(),
//! );
//!
//! // The ground is immovable, so it ends up second.
//! let mut contact = Contact::between(&ground, &crate_).unwrap();
//! contact.update([ContactPoint::new(Point3::origin(), Vector3::y(), 0.01)]);
//!
//! let mut desc = ConstraintDescriptor::new(1.0 / 240.0, contact.row_count());
//! let rows = derive_contact_rows(&contact, &crate_, &ground, &mut desc, &ConstraintConfig::default())
//!     .unwrap();
//! assert_eq!(rows, 3); // normal + two friction directions
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.

#![doc(html_root_url = "https://docs.rs/sim-contact/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod contact;
mod material;
mod registry;
mod rows;

pub use contact::{Contact, ContactManifold, ContactPoint, SharedContact, DEFAULT_PRUNE_TOLERANCE};
pub use material::{ContactMaterial, FrictionAxis, PointForces};
pub use registry::ContactRegistry;
pub use rows::derive_contact_rows;

// Re-export types needed to describe contacts
pub use sim_types::{BodyId, PairKey, Vector3};
