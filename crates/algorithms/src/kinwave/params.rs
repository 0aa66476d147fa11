//! Solver parameters

use runnel_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters for the implicit kinematic-wave solver
///
/// Deserializable from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinwaveParams {
    /// Manning roughness coefficient n (s/m^(1/3)). Default: 0.01
    pub roughness: f64,
    /// Exponent p of depth in the discharge law. Default: 5/3
    pub depth_exponent: f64,
    /// Time weighting w of the outflow term: 1.0 is fully implicit
    /// (backward Euler), smaller values blend in the old depth.
    /// Must lie in (0, 1]. Default: 1.0
    pub weight: f64,
    /// Newton stops once |f(h)| < tolerance · b. Default: 1e-6
    pub tolerance: f64,
    /// Absolute floor on the Newton stopping threshold. Default: 1e-14
    pub abs_tolerance: f64,
    /// Newton iteration budget per node. Default: 20
    pub max_iterations: usize,
    /// Lower bound on the initial Newton guess when the old depth is zero.
    /// Default: 1e-12
    pub min_initial_depth: f64,
}

impl Default for KinwaveParams {
    fn default() -> Self {
        Self {
            roughness: 0.01,
            depth_exponent: 5.0 / 3.0,
            weight: 1.0,
            tolerance: 1e-6,
            abs_tolerance: 1e-14,
            max_iterations: 20,
            min_initial_depth: 1e-12,
        }
    }
}

impl KinwaveParams {
    /// Velocity coefficient α = 1/n
    pub fn alpha(&self) -> f64 {
        1.0 / self.roughness
    }

    /// Check every parameter, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        if !(self.roughness.is_finite() && self.roughness > 0.0) {
            return Err(Error::invalid_parameter("roughness", self.roughness, "must be positive"));
        }
        if !(self.depth_exponent.is_finite() && self.depth_exponent > 0.0) {
            return Err(Error::invalid_parameter(
                "depth_exponent",
                self.depth_exponent,
                "must be positive",
            ));
        }
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(Error::invalid_parameter("weight", self.weight, "must lie in (0, 1]"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::invalid_parameter("tolerance", self.tolerance, "must be positive"));
        }
        if !(self.abs_tolerance.is_finite() && self.abs_tolerance >= 0.0) {
            return Err(Error::invalid_parameter(
                "abs_tolerance",
                self.abs_tolerance,
                "must be non-negative",
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::invalid_parameter("max_iterations", 0, "must be at least 1"));
        }
        if !(self.min_initial_depth.is_finite() && self.min_initial_depth > 0.0) {
            return Err(Error::invalid_parameter(
                "min_initial_depth",
                self.min_initial_depth,
                "must be positive",
            ));
        }
        Ok(())
    }
}
