//! Error types for discretization operators.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericsError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Invalid span {span}: must be finite and non-zero")]
    InvalidSpan { span: f64 },

    #[error("Differentiation operator is singular for {points} control points")]
    Singular { points: usize },
}

pub type NumericsResult<T> = Result<T, NumericsError>;
