//! Broyden's method: one finite-difference Jacobian, then secant updates.

use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::jacobian::jacobian;
use crate::newton::{converged, finite_norm, line_search, newton_step};
use crate::solve::RootSolution;
use nalgebra::{DMatrix, DVector};

/// Broyden ("good" update) root finder.
///
/// The approximate Jacobian is rebuilt by finite differences whenever it turns
/// singular.
pub fn broyden<F, E>(x0: DVector<f64>, f: &mut F, config: &SolverConfig) -> Result<RootSolution, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
    E: From<SolverError>,
{
    let mut x = x0;
    let mut r = f(&x)?;
    let mut r_norm = finite_norm::<E>(&r)?;
    let threshold = config.threshold(r_norm);
    let mut approx: Option<DMatrix<f64>> = None;

    for iteration in 0..config.max_iterations {
        if r_norm <= threshold {
            return Ok(converged(x, r_norm, iteration));
        }
        tracing::debug!(iteration, residual_norm = r_norm, "broyden iteration");

        let mut jac = match approx.take() {
            Some(jac) => jac,
            None => jacobian(config.jacobian, &x, &r, f, config.fd_step)?,
        };
        let dx = match newton_step(jac.clone(), &r) {
            Some(dx) => dx,
            None => {
                tracing::debug!(iteration, "refreshing singular Broyden Jacobian");
                jac = jacobian(config.jacobian, &x, &r, f, config.fd_step)?;
                newton_step(jac.clone(), &r).ok_or_else(|| SolverError::Numeric {
                    what: format!("singular Jacobian at iteration {iteration}"),
                })?
            }
        };

        let trial = line_search(&x, &dx, r_norm, f, config)?;
        let s = &trial.x - &x;
        let y = &trial.r - &r;
        let ss = s.dot(&s);
        if ss > 0.0 {
            let correction = (y - &jac * &s) * s.transpose() / ss;
            jac += correction;
        }
        approx = Some(jac);

        x = trial.x;
        r = trial.r;
        r_norm = trial.norm;
    }

    if r_norm <= threshold {
        return Ok(converged(x, r_norm, config.max_iterations));
    }
    Err(SolverError::DidNotConverge {
        residual_norm: r_norm,
        iterations: config.max_iterations,
    }
    .into())
}
