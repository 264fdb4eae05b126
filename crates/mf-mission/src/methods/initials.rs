//! Values only known at the first control point.
//!
//! Each step takes a fixed boundary value first and falls back to the final
//! row of the predecessor segment.

use crate::error::MissionResult;
use crate::methods::common::{inherited, required, start_time};
use crate::segment::Segment;

/// Shift the time column so it starts at the segment start time.
pub fn time(seg: &mut Segment) -> MissionResult<()> {
    let t0 = start_time(seg);
    let t = &mut seg.state.conditions.time;
    if t.nrows() > 0 {
        let first = t[(0, 0)];
        t.add_scalar_mut(t0 - first);
    }
    Ok(())
}

pub fn mass(seg: &mut Segment) -> MissionResult<()> {
    let m0 = required(seg, seg.boundary.mass_start, "mass")?;
    seg.state.conditions.mass.fill(m0);
    Ok(())
}

/// Energy is optional; vehicles without an energy store leave it untouched.
pub fn energy(seg: &mut Segment) -> MissionResult<()> {
    if let Some(e0) = inherited(seg, seg.boundary.energy_start, "energy") {
        seg.state.conditions.energy.fill(e0);
    }
    Ok(())
}

/// Translate the trajectory so it starts where the predecessor ended.
pub fn position(seg: &mut Segment) -> MissionResult<()> {
    let Some(initials) = seg.state.initials.as_ref() else {
        return Ok(());
    };
    let end = &initials.position;
    if end.nrows() == 0 {
        return Ok(());
    }
    let last = end.nrows() - 1;
    let r0 = [end[(last, 0)], end[(last, 1)], end[(last, 2)]];

    let position = &mut seg.state.conditions.position;
    if position.nrows() == 0 {
        return Ok(());
    }
    for (c, start) in r0.into_iter().enumerate() {
        let shift = start - position[(0, c)];
        position.column_mut(c).add_scalar_mut(shift);
    }
    Ok(())
}
