//! Root finding over a segment's unknowns.

use crate::error::{MissionError, MissionResult};
use crate::segment::Segment;
use mf_solver::{RootSolution, SolverConfig, SolverError, solve};
use nalgebra::DVector;

/// Solve `residuals(unknowns) == 0` for one segment.
///
/// The packed unknowns and residuals must have the same length; a mismatch
/// fails before `iterate` is ever called. Each trial writes the guess back
/// into the named unknowns (shapes preserved), runs `iterate`, and packs the
/// residuals. After convergence the solution is written back and iterated
/// once more so the conditions correspond to it.
pub fn converge_root(seg: &mut Segment) -> MissionResult<()> {
    let x0 = seg.state.unknowns.pack_array();
    let residual_len = seg.state.residuals.packed_len();
    if x0.len() != residual_len {
        return Err(MissionError::mismatch(
            &seg.tag,
            format!(
                "{} unknowns but {} residuals; the system must be square",
                x0.len(),
                residual_len
            ),
        ));
    }

    let config = seg.state.numerics.solver.clone();
    let outcome = solve(
        x0,
        residual_len,
        |x: &DVector<f64>| -> MissionResult<DVector<f64>> {
            seg.state.unknowns.unpack_array(x)?;
            seg.iterate()?;
            Ok(seg.state.residuals.pack_array())
        },
        &config,
    );

    let tag = seg.tag.clone();
    let numerics = &mut seg.state.numerics;
    match outcome {
        Ok(RootSolution {
            x,
            residual_norm,
            iterations,
            evaluations,
        }) => {
            numerics.converged = Some(true);
            numerics.iterations = iterations;
            numerics.residual_norm = Some(residual_norm);
            tracing::debug!(segment = %tag, iterations, evaluations, residual_norm, "root found");

            seg.state.unknowns.unpack_array(&x)?;
            seg.iterate()
        }
        Err(err) => {
            numerics.converged = Some(false);
            let err = classify(&tag, err, &config);
            if let MissionError::NonConvergence {
                residual_norm,
                iterations,
                ..
            } = &err
            {
                numerics.iterations = *iterations;
                numerics.residual_norm = Some(*residual_norm);
            }
            Err(err)
        }
    }
}

/// Map solver failures onto the mission taxonomy.
///
/// Exhausting the iteration budget becomes `NonConvergence`; a residual vector
/// that changes length mid-solve becomes `ConfigurationMismatch`.
pub(crate) fn classify(tag: &str, err: MissionError, config: &SolverConfig) -> MissionError {
    match err {
        MissionError::Solver(SolverError::DidNotConverge {
            residual_norm,
            iterations,
        }) => {
            tracing::warn!(
                segment = %tag,
                iterations,
                residual_norm,
                max_iterations = config.max_iterations,
                "did not converge"
            );
            MissionError::NonConvergence {
                tag: tag.to_string(),
                residual_norm,
                iterations,
            }
        }
        MissionError::Solver(SolverError::ProblemSetup { what }) => {
            MissionError::mismatch(tag, what)
        }
        other => other,
    }
}
