//! Step functions wired into the segment process tree.
//!
//! Every step has the shape `fn(&mut Segment) -> MissionResult<()>` and may be
//! swapped out per segment through `Segment::process_mut`.

pub mod common;
pub mod converge;
pub mod initials;
pub mod post_process;
pub mod unknowns;
pub mod update;
