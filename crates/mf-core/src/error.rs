use thiserror::Error;

pub type MfResult<T> = Result<T, MfError>;

/// Errors raised by the shared data layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MfError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Missing key: {path}")]
    MissingKey { path: String },

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
}
