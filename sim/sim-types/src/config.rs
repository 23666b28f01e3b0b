//! Configuration types for constraint building.
//!
//! [`ConstraintConfig`] carries every numeric threshold the contact and
//! joint row builders use. The defaults are tuned for metre/kilogram scenes
//! stepped at a few hundred hertz.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a simulation step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep (seconds). Zero selects impulse mode.
    pub timestep: f64,
    /// Row builder thresholds.
    pub constraint: ConstraintConfig,
    /// Island parallelism.
    pub parallel: ParallelConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 240.0,
            constraint: ConstraintConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Create a new simulation config with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Real-time preset (60 Hz).
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            ..Default::default()
        }
    }

    /// High-fidelity preset (1000 Hz, stiffer joint stabilisation).
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            timestep: 1.0 / 1000.0,
            constraint: ConstraintConfig::default().with_baumgarte(0.1),
            ..Default::default()
        }
    }

    /// Preset for scenes with many independent stacks or mechanisms.
    #[must_use]
    pub fn many_islands() -> Self {
        Self {
            parallel: ParallelConfig::many_islands(),
            ..Default::default()
        }
    }

    /// Set the constraint configuration.
    #[must_use]
    pub fn constraint(mut self, constraint: ConstraintConfig) -> Self {
        self.constraint = constraint;
        self
    }

    /// Set the parallel configuration.
    #[must_use]
    pub fn parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        // Zero is allowed: rows are then built in impulse mode.
        if !self.timestep.is_finite() || self.timestep < 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }

        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }

        self.constraint.validate()?;

        Ok(())
    }

    /// Get the frequency in Hz, or zero in impulse mode.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        if self.timestep > 0.0 {
            1.0 / self.timestep
        } else {
            0.0
        }
    }
}

/// Thresholds and gains used while deriving constraint rows.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintConfig {
    /// Closing speed below which restitution is ignored (m/s).
    pub rest_relative_velocity: f64,
    /// Sliding speed above which dynamic friction applies (m/s).
    pub max_dynamic_friction_speed: f64,
    /// Penetration-to-velocity gain, scaled by material softness.
    pub max_penetration_stiffness: f64,
    /// Regularizer added to every row's diagonal.
    pub diagonal_regularizer: f64,
    /// Penetration tolerated before stabilisation kicks in (m).
    pub resting_penetration: f64,
    /// Largest penetration fed into the stabilisation bias (m).
    pub max_penetration: f64,
    /// Minimum spacing between two points of one manifold (m).
    pub prune_tolerance: f64,
    /// Front-axis cosine above which joints use small-angle rows.
    pub small_angle_cosine: f64,
    /// Fraction of a joint limit at which the joint gives way.
    pub breakage_ratio: f64,
    /// Joint position error correction factor (0-1).
    pub baumgarte_factor: f64,
    /// Largest joint position error corrected per step.
    pub max_position_correction: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            rest_relative_velocity: 1.0e-3,
            max_dynamic_friction_speed: 0.3,
            max_penetration_stiffness: 50.0,
            diagonal_regularizer: 1.0e-3,
            resting_penetration: 1.0 / 512.0,
            max_penetration: 0.5,
            prune_tolerance: 0.05,
            small_angle_cosine: 0.998,
            breakage_ratio: 0.99,
            baumgarte_factor: 0.2,
            max_position_correction: 0.1,
        }
    }
}

impl ConstraintConfig {
    /// Set the Baumgarte factor.
    #[must_use]
    pub fn with_baumgarte(mut self, factor: f64) -> Self {
        self.baumgarte_factor = factor;
        self
    }

    /// Set the manifold pruning tolerance.
    #[must_use]
    pub fn with_prune_tolerance(mut self, tolerance: f64) -> Self {
        self.prune_tolerance = tolerance;
        self
    }

    /// Set the joint give-way ratio.
    #[must_use]
    pub fn with_breakage_ratio(mut self, ratio: f64) -> Self {
        self.breakage_ratio = ratio;
        self
    }

    /// Validate the constraint configuration.
    pub fn validate(&self) -> crate::Result<()> {
        let non_negative = [
            ("rest_relative_velocity", self.rest_relative_velocity),
            ("max_dynamic_friction_speed", self.max_dynamic_friction_speed),
            ("max_penetration_stiffness", self.max_penetration_stiffness),
            ("diagonal_regularizer", self.diagonal_regularizer),
            ("resting_penetration", self.resting_penetration),
            ("max_penetration", self.max_penetration),
            ("prune_tolerance", self.prune_tolerance),
            ("max_position_correction", self.max_position_correction),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(crate::SimError::invalid_config(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        if !(0.0..1.0).contains(&self.small_angle_cosine) {
            return Err(crate::SimError::invalid_config(
                "small_angle_cosine must be in [0, 1)",
            ));
        }

        if !(self.breakage_ratio > 0.0 && self.breakage_ratio <= 1.0) {
            return Err(crate::SimError::invalid_config(
                "breakage_ratio must be in (0, 1]",
            ));
        }

        if !(0.0..=1.0).contains(&self.baumgarte_factor) {
            return Err(crate::SimError::invalid_config(
                "baumgarte_factor must be in [0, 1]",
            ));
        }

        Ok(())
    }
}

/// Configuration for island-parallel row derivation.
///
/// Islands never share a dynamic body, so their rows can be derived
/// concurrently. Small scenes are cheaper to walk sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParallelConfig {
    /// Derive rows for independent islands on the rayon pool.
    pub parallel_rows: bool,

    /// Minimum number of islands before the parallel path is taken.
    pub min_islands_for_parallel: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            parallel_rows: true,
            min_islands_for_parallel: 4,
        }
    }
}

impl ParallelConfig {
    /// Create a configuration with parallelism disabled.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            parallel_rows: false,
            min_islands_for_parallel: 4,
        }
    }

    /// Create a configuration optimized for many islands.
    #[must_use]
    pub const fn many_islands() -> Self {
        Self {
            parallel_rows: true,
            min_islands_for_parallel: 2,
        }
    }

    /// Set the minimum islands threshold.
    #[must_use]
    pub const fn with_min_islands(mut self, min: usize) -> Self {
        self.min_islands_for_parallel = min;
        self
    }

    /// Whether `island_count` islands should be derived in parallel.
    #[must_use]
    pub const fn use_parallel(&self, island_count: usize) -> bool {
        self.parallel_rows && island_count >= self.min_islands_for_parallel
    }
}
