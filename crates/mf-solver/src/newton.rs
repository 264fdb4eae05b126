//! Newton iteration with backtracking line search.

use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::jacobian::jacobian;
use crate::solve::RootSolution;
use nalgebra::{DMatrix, DVector};

/// An accepted trial point.
pub(crate) struct Trial {
    pub x: DVector<f64>,
    pub r: DVector<f64>,
    pub norm: f64,
    pub alpha: f64,
}

pub(crate) fn finite_norm<E: From<SolverError>>(r: &DVector<f64>) -> Result<f64, E> {
    let norm = r.norm();
    if norm.is_finite() {
        Ok(norm)
    } else {
        Err(SolverError::Numeric {
            what: "residual contains non-finite values".to_string(),
        }
        .into())
    }
}

/// Solve `J * dx = -r`.
pub(crate) fn newton_step(jac: DMatrix<f64>, r: &DVector<f64>) -> Option<DVector<f64>> {
    jac.lu().solve(&(-r.clone()))
}

/// Backtrack along `dx` until the residual norm drops below `r_norm`.
///
/// When no trial reduces the norm the last finite one is taken anyway.
pub(crate) fn line_search<F, E>(
    x: &DVector<f64>,
    dx: &DVector<f64>,
    r_norm: f64,
    f: &mut F,
    config: &SolverConfig,
) -> Result<Trial, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
    E: From<SolverError>,
{
    let mut alpha = 1.0;
    let mut accepted: Option<Trial> = None;

    for _ in 0..=config.max_line_search_iters {
        let x_new = x + alpha * dx;
        let r_new = f(&x_new)?;
        let norm = r_new.norm();

        if norm.is_finite() {
            let reduced = norm < r_norm;
            accepted = Some(Trial {
                x: x_new,
                r: r_new,
                norm,
                alpha,
            });
            if reduced {
                break;
            }
        }
        tracing::trace!(alpha, residual_norm = norm, "backtracking");
        alpha *= config.line_search_beta;
    }

    accepted.ok_or_else(|| {
        SolverError::Numeric {
            what: "line search produced only non-finite residuals".to_string(),
        }
        .into()
    })
}

pub(crate) fn converged(x: DVector<f64>, residual_norm: f64, iterations: usize) -> RootSolution {
    RootSolution {
        x,
        residual_norm,
        iterations,
        evaluations: 0,
    }
}

/// Newton solver with a finite-difference Jacobian rebuilt every iteration.
///
/// `iterations` counts Jacobian updates; a starting point that already meets
/// the tolerance returns with zero iterations.
pub fn newton<F, E>(x0: DVector<f64>, f: &mut F, config: &SolverConfig) -> Result<RootSolution, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
    E: From<SolverError>,
{
    let mut x = x0;
    let mut r = f(&x)?;
    let mut r_norm = finite_norm::<E>(&r)?;
    let threshold = config.threshold(r_norm);

    for iteration in 0..config.max_iterations {
        if r_norm <= threshold {
            return Ok(converged(x, r_norm, iteration));
        }
        tracing::debug!(iteration, residual_norm = r_norm, "newton iteration");

        let jac = jacobian(config.jacobian, &x, &r, f, config.fd_step)?;
        let dx = newton_step(jac, &r).ok_or_else(|| SolverError::Numeric {
            what: format!("singular Jacobian at iteration {iteration}"),
        })?;

        let trial = line_search(&x, &dx, r_norm, f, config)?;
        if trial.alpha < 1e-10 {
            return Err(SolverError::DidNotConverge {
                residual_norm: trial.norm,
                iterations: iteration + 1,
            }
            .into());
        }
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
