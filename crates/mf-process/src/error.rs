//! Error types for process assembly and analysis lifecycles.

use mf_core::MfError;
use thiserror::Error;

/// Errors raised while assembling or addressing a process tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("Invalid step path: {path}")]
    InvalidPath { path: String },

    #[error("No nested process at {path}")]
    MissingProcess { path: String },

    #[error("No step named {name}")]
    MissingStep { name: String },
}

pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors raised by physics collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("{phase} is not implemented")]
    NotImplemented { phase: &'static str },

    #[error("Analysis {name} not found")]
    NotFound { name: String },

    #[error("Analysis {name} failed: {source}")]
    Child {
        name: String,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("Analysis failed: {message}")]
    Failed { message: String },

    #[error("Data error: {0}")]
    Data(#[from] MfError),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
