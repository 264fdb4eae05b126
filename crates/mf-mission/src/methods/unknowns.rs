//! Unknown unpacking helpers.

use crate::segment::{Segment, SegmentStep};
use mf_process::Step;

/// Copy the unknown `unknown` into the condition at `condition`.
///
/// `condition` is a typed field name (shape must match) or an `extra` path.
pub fn assign(unknown: &str, condition: &str) -> SegmentStep {
    let unknown = unknown.to_string();
    let condition = condition.to_string();
    Step::action(move |seg: &mut Segment| {
        let value = seg.state.unknowns.array(&unknown)?.clone();
        seg.state.conditions.set(&condition, value)?;
        Ok(())
    })
}
