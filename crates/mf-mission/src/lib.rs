//! Mission segment execution and convergence.
//!
//! Provides:
//! - `Conditions` / `State`: discretized per-segment state
//! - `Segment`: lifecycle state machine over a four-part process tree
//! - `segments`: ready-made segment kinds (cruise, climb, descent, hover, altitude climb)
//! - `Mission`: sequential or simultaneous composition of segments
//! - `MissionSet`: independent missions, optionally solved in parallel

pub mod conditions;
pub mod error;
pub mod methods;
pub mod mission;
pub mod mission_set;
pub mod segment;
pub mod segments;
pub mod state;
pub mod sub_segments;

pub use conditions::{Conditions, FIELDS, Field};
pub use error::{MissionError, MissionResult};
pub use mission::{
    Mission, MissionProcess, MissionReport, MissionSettings, MissionStep, SegmentNode,
    SegmentReport, SegmentStatus, Strategy,
};
pub use mission_set::{MissionOutcome, MissionSet};
pub use segment::{Boundary, Segment, SegmentLifecycle, SegmentProcess, SegmentStep};
pub use state::{Numerics, State, StateContainer};
pub use sub_segments::{Block, CombinedSystem, expand_sub_segments, merge_sub_segment_states};
