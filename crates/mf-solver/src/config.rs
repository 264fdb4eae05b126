//! Solver configuration.

use crate::error::{SolverError, SolverResult};
use serde::{Deserialize, Serialize};

/// Root-finding algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootFinder {
    /// Finite-difference Jacobian rebuilt every iteration.
    #[default]
    Newton,
    /// One finite-difference Jacobian, then rank-one secant updates.
    Broyden,
}

/// Finite-difference stencil for Jacobian columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianScheme {
    #[default]
    Forward,
    /// Twice the residual calls, second-order accurate.
    Central,
}

/// Solver settings carried by each segment's numerics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub method: RootFinder,
    /// Maximum iterations
    pub max_iterations: usize,
    /// Absolute tolerance for residual norm
    pub tolerance: f64,
    /// Relative tolerance against the initial residual norm; 0 disables it
    pub rel_tolerance: f64,
    /// Line search backtracking factor
    pub line_search_beta: f64,
    /// Maximum line search iterations
    pub max_line_search_iters: usize,
    pub jacobian: JacobianScheme,
    /// Relative perturbation, scaled by `max(|x_j|, 1)`
    pub fd_step: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: RootFinder::Newton,
            max_iterations: 50,
            tolerance: 1e-8,
            rel_tolerance: 0.0,
            line_search_beta: 0.5,
            max_line_search_iters: 20,
            jacobian: JacobianScheme::Forward,
            fd_step: 1e-7,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> SolverResult<()> {
        let setup = |what: &str| {
            Err(SolverError::ProblemSetup {
                what: what.to_string(),
            })
        };
        if !(self.tolerance >= 0.0) || !(self.rel_tolerance >= 0.0) {
            return setup("tolerances must be non-negative");
        }
        if !(self.line_search_beta > 0.0 && self.line_search_beta < 1.0) {
            return setup("line_search_beta must lie in (0, 1)");
        }
        if !(self.fd_step > 0.0 && self.fd_step.is_finite()) {
            return setup("fd_step must be positive");
        }
        Ok(())
    }

    /// Residual norm below which the iteration stops.
    pub(crate) fn threshold(&self, initial_norm: f64) -> f64 {
        self.tolerance.max(self.rel_tolerance * initial_norm)
    }
}
