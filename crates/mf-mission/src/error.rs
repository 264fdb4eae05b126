//! Error types for segment and mission evaluation.

use crate::segment::SegmentLifecycle;
use mf_core::MfError;
use mf_numerics::NumericsError;
use mf_process::{AnalysisError, ProcessError};
use mf_solver::SolverError;
use thiserror::Error;

/// Errors raised while evaluating segments and missions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MissionError {
    /// A quantity is unset and no predecessor can supply it.
    #[error("Segment {segment}: missing prerequisite {what}")]
    MissingPrerequisite { segment: String, what: String },

    /// Non-square system or a value of unexpected shape.
    #[error("Segment {segment}: configuration mismatch: {what}")]
    ConfigurationMismatch { segment: String, what: String },

    #[error(
        "Segment {tag} did not converge after {iterations} iterations (residual norm {residual_norm:e})"
    )]
    NonConvergence {
        tag: String,
        residual_norm: f64,
        iterations: usize,
    },

    #[error("Segment {tag}: cannot {action} while {state:?}")]
    Lifecycle {
        tag: String,
        action: &'static str,
        state: SegmentLifecycle,
    },

    #[error("Data error: {0}")]
    Data(#[from] MfError),

    #[error("Numerics error: {0}")]
    Numerics(#[from] NumericsError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

pub type MissionResult<T> = Result<T, MissionError>;

impl MissionError {
    pub(crate) fn missing(segment: &str, what: impl Into<String>) -> Self {
        MissionError::MissingPrerequisite {
            segment: segment.to_string(),
            what: what.into(),
        }
    }

    pub(crate) fn mismatch(segment: &str, what: impl Into<String>) -> Self {
        MissionError::ConfigurationMismatch {
            segment: segment.to_string(),
            what: what.into(),
        }
    }
}
