//! Error types for root finding.

use thiserror::Error;

/// Errors raised by the solver itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Problem setup error: {what}")]
    ProblemSetup { what: String },

    #[error("Did not converge after {iterations} iterations (residual norm {residual_norm:e})")]
    DidNotConverge { residual_norm: f64, iterations: usize },

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;
