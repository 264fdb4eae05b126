//! Ready-made segment kinds.
//!
//! Each kind is the default process tree with its own `initialize.conditions`
//! step (and, for the altitude climb, its own unknown and time differential).
//! Force and energy balance residuals are left to the vehicle's collaborators.

use crate::error::{MissionError, MissionResult};
use crate::methods::common::{fixed, ramp, required, set_time_span, start_time};
use crate::methods::update::differentials_altitude;
use crate::segment::{Boundary, Segment, SegmentProcess, SegmentStep};
use mf_core::row;
use mf_process::Step;
use nalgebra::DMatrix;

fn with_conditions(tag: impl Into<String>, boundary: Boundary, step: SegmentStep) -> Segment {
    let mut seg = Segment::new(tag).with_boundary(boundary);
    if let Some(slot) = seg.process_mut().step_mut("initialize.conditions") {
        *slot = step;
    }
    seg
}

/// Constant air speed at constant altitude over `boundary.distance`.
pub fn cruise(tag: impl Into<String>, boundary: Boundary) -> Segment {
    with_conditions(tag, boundary, Step::action(cruise_conditions))
}

fn cruise_conditions(seg: &mut Segment) -> MissionResult<()> {
    let speed = fixed(seg, seg.boundary.air_speed, "air_speed")?;
    let distance = fixed(seg, seg.boundary.distance, "distance")?;
    let altitude = required(seg, seg.boundary.altitude_start, "altitude")?;
    if speed <= 0.0 {
        return Err(MissionError::mismatch(&seg.tag, "cruise air_speed must be positive"));
    }

    let t0 = start_time(seg);
    set_time_span(seg, t0, distance / speed);
    let rows = seg.state.rows();
    let c = &mut seg.state.conditions;
    c.velocity = tile_row(rows, &[speed, 0.0, 0.0]);
    c.altitude.fill(altitude);
    c.position.column_mut(2).fill(-altitude);
    Ok(())
}

/// Constant air speed and constant climb rate up to `boundary.altitude_end`.
pub fn climb(tag: impl Into<String>, boundary: Boundary) -> Segment {
    with_conditions(tag, boundary, Step::action(|seg: &mut Segment| constant_rate(seg, 1.0)))
}

/// Constant air speed and constant descent rate down to `boundary.altitude_end`.
///
/// `boundary.climb_rate` is the (positive) sink rate.
pub fn descent(tag: impl Into<String>, boundary: Boundary) -> Segment {
    with_conditions(tag, boundary, Step::action(|seg: &mut Segment| constant_rate(seg, -1.0)))
}

fn constant_rate(seg: &mut Segment, direction: f64) -> MissionResult<()> {
    let speed = fixed(seg, seg.boundary.air_speed, "air_speed")?;
    let rate = fixed(seg, seg.boundary.climb_rate, "climb_rate")?;
    let alt_end = fixed(seg, seg.boundary.altitude_end, "altitude_end")?;
    let alt0 = required(seg, seg.boundary.altitude_start, "altitude")?;

    if rate <= 0.0 || rate >= speed {
        return Err(MissionError::mismatch(
            &seg.tag,
            "climb_rate must be positive and below air_speed",
        ));
    }
    let change = direction * (alt_end - alt0);
    if change <= 0.0 {
        return Err(MissionError::mismatch(
            &seg.tag,
            "altitude_end is on the wrong side of the start altitude",
        ));
    }

    let t0 = start_time(seg);
    set_time_span(seg, t0, change / rate);
    let altitude = ramp(seg, alt0, alt_end);
    let rows = seg.state.rows();
    let horizontal = (speed * speed - rate * rate).sqrt();

    let c = &mut seg.state.conditions;
    c.velocity = tile_row(rows, &[horizontal, 0.0, -direction * rate]);
    c.position.set_column(2, &(-&altitude).column(0));
    c.altitude = altitude;
    Ok(())
}

/// Zero velocity at constant altitude for `boundary.duration`.
pub fn hover(tag: impl Into<String>, boundary: Boundary) -> Segment {
    with_conditions(tag, boundary, Step::action(hover_conditions))
}

fn hover_conditions(seg: &mut Segment) -> MissionResult<()> {
    let duration = fixed(seg, seg.boundary.duration, "duration")?;
    let altitude = required(seg, seg.boundary.altitude_start, "altitude")?;

    let t0 = start_time(seg);
    set_time_span(seg, t0, duration);
    let c = &mut seg.state.conditions;
    c.velocity.fill(0.0);
    c.altitude.fill(altitude);
    c.position.column_mut(2).fill(-altitude);
    Ok(())
}

/// Climb at constant air speed to `boundary.altitude_end` with the flight
/// path angle left to the solver.
///
/// The unknown `climb_angle` (radians, one per control point) sets the
/// velocity. The time span is derived from the altitude change and the
/// resulting vertical speed on every iteration. The caller supplies the
/// residual that pins the angle down, typically a force balance.
pub fn altitude_climb(tag: impl Into<String>, boundary: Boundary) -> Segment {
    let guess = match (boundary.climb_rate, boundary.air_speed) {
        (Some(rate), Some(speed)) if speed > 0.0 && rate.abs() < speed => (rate / speed).asin(),
        _ => 0.1,
    };
    let mut seg = with_conditions(tag, boundary, Step::action(altitude_climb_conditions));
    seg.state.unknowns.insert("climb_angle", row(&[guess]));

    let process = seg.process_mut();
    if let Some(slot) = process.step_mut("iterate.unknowns") {
        *slot = SegmentProcess::new()
            .with("climb_angle", Step::action(climb_angle))
            .into();
    }
    if let Some(slot) = process.step_mut("iterate.conditions.differentials") {
        *slot = Step::action(differentials_altitude);
    }
    seg
}

fn altitude_climb_conditions(seg: &mut Segment) -> MissionResult<()> {
    fixed(seg, seg.boundary.air_speed, "air_speed")?;
    fixed(seg, seg.boundary.altitude_end, "altitude_end")?;
    let alt0 = required(seg, seg.boundary.altitude_start, "altitude")?;

    let t0 = start_time(seg);
    set_time_span(seg, t0, 0.0);
    seg.state.conditions.altitude.fill(alt0);
    Ok(())
}

fn climb_angle(seg: &mut Segment) -> MissionResult<()> {
    let speed = fixed(seg, seg.boundary.air_speed, "air_speed")?;
    let angle = seg.state.unknowns.array("climb_angle")?;
    let velocity = DMatrix::from_fn(angle.nrows(), 3, |i, axis| match axis {
        0 => speed * angle[(i, 0)].cos(),
        2 => -speed * angle[(i, 0)].sin(),
        _ => 0.0,
    });
    seg.state.conditions.set("velocity", velocity)?;
    Ok(())
}

fn tile_row(rows: usize, values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(rows, values.len(), |_, c| values[c])
}
