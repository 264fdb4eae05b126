//! Discretization operators for segment control points.
//!
//! A segment samples every quantity at a fixed set of dimensionless control
//! points on `[0, 1]`. This crate builds the dense differentiation (`D`) and
//! integration (`I`) operators on those points and rescales them to a physical
//! span once it is known.

pub mod discretization;
pub mod error;
pub mod operators;

pub use discretization::{Discretization, chebyshev, linear};
pub use error::{NumericsError, NumericsResult};
pub use operators::Operators;
