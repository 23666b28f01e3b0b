//! Per-point contact material.
//!
//! A material describes how one contact point turns into rows: how bouncy
//! it is, how soft, how much friction each tangent direction carries, and
//! which rows take a caller-supplied acceleration instead of a derived one.
//! It also carries the forces the solver resolved for the point last step.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction settings along one tangent direction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionAxis {
    /// Whether this direction contributes a row.
    pub enabled: bool,
    /// Coefficient used while sticking.
    pub static_coefficient: f64,
    /// Coefficient used while sliding faster than the dynamic threshold.
    pub dynamic_coefficient: f64,
    /// Bound the row by the coefficient itself instead of coupling it to
    /// the normal force.
    pub independent_bound: bool,
    /// Acceleration supplied by the caller, replacing the derived one.
    pub override_accel: Option<f64>,
}

impl Default for FrictionAxis {
    fn default() -> Self {
        Self {
            enabled: true,
            static_coefficient: 0.8,
            dynamic_coefficient: 0.4,
            independent_bound: false,
            override_accel: None,
        }
    }
}

impl FrictionAxis {
    /// A direction that contributes no row.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Coulomb friction with separate sticking and sliding coefficients.
    #[must_use]
    pub fn coulomb(static_coefficient: f64, dynamic_coefficient: f64) -> Self {
        Self {
            static_coefficient: static_coefficient.max(0.0),
            dynamic_coefficient: dynamic_coefficient.max(0.0),
            ..Default::default()
        }
    }

    /// Coefficient for the given sliding speed.
    #[must_use]
    pub fn coefficient(&self, sliding_speed: f64, dynamic_threshold: f64) -> f64 {
        if sliding_speed.abs() > dynamic_threshold {
            self.dynamic_coefficient
        } else {
            self.static_coefficient
        }
    }
}

/// Forces resolved for one contact point in the previous solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointForces {
    /// Normal row force.
    pub normal: f64,
    /// Friction row force per tangent.
    pub friction: [f64; 2],
}

/// Material of one contact point.
///
/// # Example
///
/// ```
/// use sim_contact::{ContactMaterial, FrictionAxis};
///
/// let ice = ContactMaterial::frictionless().with_restitution(0.1);
/// assert_eq!(ice.enabled_friction_rows(), 0);
///
/// let rubber = ContactMaterial::default()
///     .with_friction(FrictionAxis::coulomb(1.1, 0.9))
///     .with_soft_skin(0.002);
/// assert!(rubber.soft);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactMaterial {
    /// Coefficient of restitution (0 = no bounce, 1 = fully elastic).
    pub restitution: f64,
    /// Fraction of the maximum penetration stiffness applied (0-1).
    pub softness: f64,
    /// Skin thickness, used as the regularizer floor for soft contacts.
    pub skin_thickness: f64,
    /// Whether the normal row is regularized by the skin thickness.
    pub soft: bool,
    /// Acceleration added to the derived normal acceleration.
    pub normal_override_accel: Option<f64>,
    /// Friction along the two tangent directions.
    pub friction: [FrictionAxis; 2],
    /// Last resolved forces, for warm starting and friction coupling.
    pub forces: PointForces,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            restitution: 0.0,
            softness: 0.1,
            skin_thickness: 0.0,
            soft: false,
            normal_override_accel: None,
            friction: [FrictionAxis::default(); 2],
            forces: PointForces::default(),
        }
    }
}

impl ContactMaterial {
    /// Material with both friction directions disabled.
    #[must_use]
    pub fn frictionless() -> Self {
        Self {
            friction: [FrictionAxis::disabled(); 2],
            ..Default::default()
        }
    }

    /// Set the restitution, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Set the softness, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_softness(mut self, softness: f64) -> Self {
        self.softness = softness.clamp(0.0, 1.0);
        self
    }

    /// Mark the contact soft with the given skin thickness.
    #[must_use]
    pub fn with_soft_skin(mut self, skin_thickness: f64) -> Self {
        self.soft = true;
        self.skin_thickness = skin_thickness.max(0.0);
        self
    }

    /// Use the same friction on both tangent directions.
    #[must_use]
    pub fn with_friction(mut self, axis: FrictionAxis) -> Self {
        self.friction = [axis; 2];
        self
    }

    /// Set friction on one tangent direction (0 or 1, other values ignored).
    #[must_use]
    pub fn with_friction_axis(mut self, index: usize, axis: FrictionAxis) -> Self {
        if let Some(slot) = self.friction.get_mut(index) {
            *slot = axis;
        }
        self
    }

    /// Add a caller-supplied acceleration to the normal row.
    #[must_use]
    pub fn with_normal_override(mut self, accel: f64) -> Self {
        self.normal_override_accel = Some(accel);
        self
    }

    /// Number of friction rows this material produces.
    #[must_use]
    pub fn enabled_friction_rows(&self) -> usize {
        self.friction.iter().filter(|axis| axis.enabled).count()
    }

    /// Average two materials, e.g. when the narrow phase reports one per shape.
    ///
    /// Friction and restitution use the geometric mean. Softness, skin and
    /// the soft flag take the softer of the two. A friction direction stays
    /// enabled only if both sides enable it. Overrides and forces are not
    /// combined.
    #[must_use]
    pub fn combine(a: &Self, b: &Self) -> Self {
        let axis = |x: &FrictionAxis, y: &FrictionAxis| FrictionAxis {
            enabled: x.enabled && y.enabled,
            static_coefficient: (x.static_coefficient * y.static_coefficient).sqrt(),
            dynamic_coefficient: (x.dynamic_coefficient * y.dynamic_coefficient).sqrt(),
            independent_bound: x.independent_bound || y.independent_bound,
            override_accel: None,
        };
        Self {
            restitution: (a.restitution * b.restitution).sqrt(),
            softness: a.softness.max(b.softness),
            skin_thickness: a.skin_thickness.max(b.skin_thickness),
            soft: a.soft || b.soft,
            normal_override_accel: None,
            friction: [
                axis(&a.friction[0], &b.friction[0]),
                axis(&a.friction[1], &b.friction[1]),
            ],
            forces: PointForces::default(),
        }
    }
}
