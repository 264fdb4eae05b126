//! mf-core: stable foundation for missionflow.
//!
//! Contains:
//! - data (insertion-ordered, dotted-path addressable `Data` map)
//! - error (shared error types)

pub mod data;
pub mod error;

// Re-exports: nice ergonomics for downstream crates
pub use data::{Data, Slot, Value, ones_row, row};
pub use error::{MfError, MfResult};
