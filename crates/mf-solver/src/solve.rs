//! High-level solver interface.

use crate::broyden::broyden;
use crate::config::{RootFinder, SolverConfig};
use crate::error::SolverError;
use crate::newton::newton;
use nalgebra::DVector;

/// Converged root.
#[derive(Debug, Clone, PartialEq)]
pub struct RootSolution {
    /// Solution vector
    pub x: DVector<f64>,
    /// Final residual norm
    pub residual_norm: f64,
    /// Number of iterations
    pub iterations: usize,
    /// Number of residual evaluations, finite-difference columns included
    pub evaluations: usize,
}

/// Find `x` with `f(x) == 0` for a square system.
///
/// `residual_len` is the length `f` must return. It is checked against `x0`
/// before `f` is ever called, and every returned residual is checked against
/// it. Errors raised by `f` are returned unchanged.
pub fn solve<F, E>(
    x0: DVector<f64>,
    residual_len: usize,
    mut f: F,
    config: &SolverConfig,
) -> Result<RootSolution, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
    E: From<SolverError>,
{
    if x0.len() != residual_len {
        return Err(SolverError::ProblemSetup {
            what: format!(
                "{} unknowns but {} residuals; the system must be square",
                x0.len(),
                residual_len
            ),
        }
        .into());
    }
    config.validate()?;

    let mut evaluations = 0;
    let mut counted = |x: &DVector<f64>| -> Result<DVector<f64>, E> {
        evaluations += 1;
        let r = f(x)?;
        if r.len() != residual_len {
            return Err(SolverError::ProblemSetup {
                what: format!("residual length changed from {residual_len} to {}", r.len()),
            }
            .into());
        }
        Ok(r)
    };

    let mut solution = match config.method {
        RootFinder::Newton => newton(x0, &mut counted, config)?,
        RootFinder::Broyden => broyden(x0, &mut counted, config)?,
    };
    solution.evaluations = evaluations;

    tracing::debug!(
        method = ?config.method,
        iterations = solution.iterations,
        evaluations = solution.evaluations,
        residual_norm = solution.residual_norm,
        "root found"
    );
    Ok(solution)
}
