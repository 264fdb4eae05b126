//! Square nonlinear root finding for mission convergence.
//!
//! The solver sees only a packed unknown vector and a residual closure. The
//! closure may fail with the caller's own error type, which is propagated
//! unchanged; solver failures convert into it through `From<SolverError>`.

pub mod broyden;
pub mod config;
pub mod error;
pub mod jacobian;
pub mod newton;
pub mod solve;

pub use config::{JacobianScheme, RootFinder, SolverConfig};
pub use error::{SolverError, SolverResult};
pub use solve::{RootSolution, solve};
