//! Error types for constraint building.
//!
//! Mass, shape and alignment degeneracies are handled by fallback formulas
//! and never show up here. Every variant below signals a lifecycle or
//! bookkeeping corruption, and the owning step is aborted when one is hit.

use thiserror::Error;

/// Errors that can occur while maintaining contacts or building rows.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Invalid joint ID referenced.
    #[error("invalid joint ID: {0}")]
    InvalidJointId(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A contact already exists for this pair.
    #[error("contact between bodies {low} and {high} is already attached")]
    DuplicateContact {
        /// Smaller body id of the pair.
        low: u64,
        /// Larger body id of the pair.
        high: u64,
    },

    /// No contact exists for this pair.
    #[error("no contact attached between bodies {low} and {high}")]
    MissingContact {
        /// Smaller body id of the pair.
        low: u64,
        /// Larger body id of the pair.
        high: u64,
    },

    /// A body was paired with itself.
    #[error("body {0} cannot be in contact with itself")]
    SelfContact(u64),

    /// Both bodies of a pair are immovable.
    #[error("bodies {low} and {high} are both immovable")]
    StaticPair {
        /// Smaller body id of the pair.
        low: u64,
        /// Larger body id of the pair.
        high: u64,
    },

    /// An inactive contact or joint was asked to produce rows.
    #[error("inactive constraint asked for rows: {constraint}")]
    InactiveConstraint {
        /// Which constraint.
        constraint: String,
    },

    /// The row buffer was sized too small.
    #[error("constraint row capacity {capacity} exceeded")]
    RowCapacityExceeded {
        /// Capacity the buffer was sized for.
        capacity: usize,
    },

    /// Resolved force slice does not match the row count.
    #[error("expected {expected} resolved forces, got {actual}")]
    ForceCountMismatch {
        /// Number of rows.
        expected: usize,
        /// Number of forces supplied.
        actual: usize,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an inactive constraint error.
    #[must_use]
    pub fn inactive(constraint: impl Into<String>) -> Self {
        Self::InactiveConstraint {
            constraint: constraint.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }

    /// Check if this error reports registry corruption (duplicate or missing pair).
    #[must_use]
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateContact { .. } | Self::MissingContact { .. }
        )
    }
}
