//! Ordered step pipelines and analysis lifecycles.
//!
//! Provides:
//! - `Step` / `Process`: an ordered, callable sequence of named steps
//! - `Analysis` / `AnalysisContainer`: four-phase lifecycle collaborators and
//!   a container that fans each phase out over named children

pub mod analysis;
pub mod error;
pub mod process;
pub mod step;

pub use analysis::{Analysis, AnalysisContainer, Phases};
pub use error::{AnalysisError, AnalysisResult, ProcessError, ProcessResult};
pub use process::Process;
pub use step::{Evaluate, Step, StepFn};
