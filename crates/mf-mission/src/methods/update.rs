//! Iterate-phase condition updates.

use crate::error::{MissionError, MissionResult};
use crate::methods::common::fixed;
use crate::segment::{Segment, SegmentStep};
use mf_process::Step;
use nalgebra::DMatrix;

/// Rescale the operators to the current time span.
///
/// The span is read from the first and last entries of the time column, which
/// may depend on the unknowns, so this runs on every iteration.
pub fn differentials_time(seg: &mut Segment) -> MissionResult<()> {
    let time = &seg.state.conditions.time;
    let rows = time.nrows();
    check_points(seg, rows)?;
    if rows < 2 {
        seg.state.numerics.time = seg.state.numerics.dimensionless.clone();
        return Ok(());
    }

    let t0 = time[(0, 0)];
    let span = time[(rows - 1, 0)] - t0;
    if span == 0.0 {
        return Err(MissionError::missing(&seg.tag, "time span"));
    }

    let ops = seg.state.numerics.dimensionless.rescale(span, t0)?;
    seg.state.conditions.time = DMatrix::from_column_slice(rows, 1, ops.control_points.as_slice());
    seg.state.numerics.time = ops;
    Ok(())
}

/// Derive the time span from the altitude change and the vertical speed.
///
/// `dt = (h_end - h_0) / (I @ v_up)[-1]`, then the operators are rescaled by
/// `dt` and the altitude profile is integrated from the vertical speed.
pub fn differentials_altitude(seg: &mut Segment) -> MissionResult<()> {
    let rows = seg.state.conditions.rows();
    check_points(seg, rows)?;
    let alt_end = fixed(seg, seg.boundary.altitude_end, "altitude_end")?;

    let c = &seg.state.conditions;
    let alt0 = c.altitude[(0, 0)];
    let t0 = c.time[(0, 0)];
    let climb_rate = -c.velocity.column(2).clone_owned();

    let dims = &seg.state.numerics.dimensionless;
    let climbed = &dims.integrate * &climb_rate;
    let net = climbed[rows - 1];
    if net == 0.0 || !net.is_finite() {
        return Err(MissionError::mismatch(
            &seg.tag,
            "no net vertical speed to reach altitude_end",
        ));
    }
    let dt = (alt_end - alt0) / net;

    let ops = dims.rescale(dt, t0)?;
    let altitude = (&ops.integrate * &climb_rate).add_scalar(alt0);

    let c = &mut seg.state.conditions;
    c.time = DMatrix::from_column_slice(rows, 1, ops.control_points.as_slice());
    c.altitude = DMatrix::from_column_slice(rows, 1, altitude.as_slice());
    seg.state.numerics.time = ops;
    Ok(())
}

fn check_points(seg: &Segment, rows: usize) -> MissionResult<()> {
    let points = seg.state.numerics.dimensionless.len();
    if points != rows {
        return Err(MissionError::mismatch(
            &seg.tag,
            format!("{rows} condition rows but {points} control points"),
        ));
    }
    Ok(())
}

/// Acceleration from the velocity history; the down axis mirrors altitude.
pub fn kinematics(seg: &mut Segment) -> MissionResult<()> {
    let c = &mut seg.state.conditions;
    c.acceleration = seg.state.numerics.time.derivative(&c.velocity)?;
    let down = -&c.altitude;
    c.position.set_column(2, &down.column(0));
    Ok(())
}

/// Evaluate the analysis registered under `name`, if any, and store its
/// output under `conditions.extra.<name>`. Analyses that do not declare
/// `evaluate` are skipped.
pub fn collaborator(name: &'static str) -> SegmentStep {
    Step::action(move |seg: &mut Segment| evaluate_collaborator(seg, name))
}

pub(crate) fn evaluate_collaborator(seg: &mut Segment, name: &str) -> MissionResult<()> {
    if !seg.analyses.contains(name) {
        return Ok(());
    }
    if let Some(out) = seg
        .analyses
        .evaluate_one(name, &mut seg.state, &seg.settings)?
    {
        seg.state.conditions.extra.set(name, out)?;
    }
    Ok(())
}

/// Energy collaborator, then `energy = e0 - I @ power`.
pub fn energy(seg: &mut Segment) -> MissionResult<()> {
    evaluate_collaborator(seg, "energy")?;
    let c = &mut seg.state.conditions;
    let drawn = seg.state.numerics.time.integral(&c.power)?;
    c.energy = (-drawn).add_scalar(first(&c.energy));
    Ok(())
}

/// Weights collaborator, then `mass = m0 + I @ mass_rate`.
pub fn weights(seg: &mut Segment) -> MissionResult<()> {
    evaluate_collaborator(seg, "weights")?;
    let c = &mut seg.state.conditions;
    let change = seg.state.numerics.time.integral(&c.mass_rate)?;
    c.mass = change.add_scalar(first(&c.mass));
    Ok(())
}

fn first(a: &DMatrix<f64>) -> f64 {
    if a.is_empty() { 0.0 } else { a[(0, 0)] }
}
