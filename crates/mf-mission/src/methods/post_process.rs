//! Outputs derived once the segment has converged.

use crate::error::MissionResult;
use crate::segment::Segment;

/// Integrate horizontal velocity into position from the first control point.
pub fn ground_track(seg: &mut Segment) -> MissionResult<()> {
    let c = &mut seg.state.conditions;
    if c.rows() == 0 {
        return Ok(());
    }
    let horizontal = c.velocity.columns(0, 2).clone_owned();
    let travelled = seg.state.numerics.time.integral(&horizontal)?;
    for axis in 0..2 {
        let start = c.position[(0, axis)];
        c.position
            .set_column(axis, &travelled.column(axis).add_scalar(start));
    }
    Ok(())
}

pub fn finalize_analyses(seg: &mut Segment) -> MissionResult<()> {
    seg.analyses.finalize_all()?;
    Ok(())
}
