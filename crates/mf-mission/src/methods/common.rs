//! Initialize-phase steps and boundary lookups.

use crate::error::{MissionError, MissionResult};
use crate::segment::Segment;
use nalgebra::DMatrix;

/// Resize every state array to the configured number of control points.
pub fn expand_state(seg: &mut Segment) -> MissionResult<()> {
    let points = seg.state.numerics.number_of_control_points;
    if points == 0 {
        return Err(MissionError::mismatch(
            &seg.tag,
            "number_of_control_points must be positive",
        ));
    }
    seg.state.expand_rows(points)?;
    Ok(())
}

/// Build the dimensionless operators; the time operators start as a copy.
pub fn dimensionless_operators(seg: &mut Segment) -> MissionResult<()> {
    let numerics = &mut seg.state.numerics;
    numerics.dimensionless = numerics
        .discretization
        .operators(numerics.number_of_control_points)?;
    numerics.time = numerics.dimensionless.clone();
    Ok(())
}

/// Lay out the time column from the start time and `boundary.duration`.
///
/// Without a duration the span stays zero and a kind-specific step must set it.
pub fn initialize_time(seg: &mut Segment) -> MissionResult<()> {
    let t0 = start_time(seg);
    let span = seg.boundary.duration.unwrap_or(0.0);
    set_time_span(seg, t0, span);
    Ok(())
}

/// `boundary.time_start`, else the predecessor's final time, else zero.
pub fn start_time(seg: &Segment) -> f64 {
    inherited(seg, seg.boundary.time_start, "time").unwrap_or(0.0)
}

/// A fixed boundary value, or the first column of `field` in the initials.
pub fn inherited(seg: &Segment, fixed: Option<f64>, field: &str) -> Option<f64> {
    fixed.or_else(|| {
        let initials = seg.state.initials.as_ref()?;
        let a = initials.field(field)?;
        (a.nrows() > 0).then(|| a[(a.nrows() - 1, 0)])
    })
}

/// Like [`inherited`], failing with `MissingPrerequisite` when nothing supplies it.
pub fn required(seg: &Segment, fixed: Option<f64>, field: &str) -> MissionResult<f64> {
    inherited(seg, fixed, field).ok_or_else(|| MissionError::missing(&seg.tag, field))
}

/// A boundary value with no predecessor fallback.
pub fn fixed(seg: &Segment, value: Option<f64>, what: &str) -> MissionResult<f64> {
    value.ok_or_else(|| MissionError::missing(&seg.tag, what))
}

/// `time = t0 + x * span` over the dimensionless control points.
pub fn set_time_span(seg: &mut Segment, t0: f64, span: f64) {
    let x = &seg.state.numerics.dimensionless.control_points;
    seg.state.conditions.time = DMatrix::from_fn(x.len(), 1, |i, _| t0 + x[i] * span);
}

/// Fill a single-column array with a linear ramp over the control points.
pub fn ramp(seg: &Segment, start: f64, end: f64) -> DMatrix<f64> {
    let x = &seg.state.numerics.dimensionless.control_points;
    DMatrix::from_fn(x.len(), 1, |i, _| start + x[i] * (end - start))
}
