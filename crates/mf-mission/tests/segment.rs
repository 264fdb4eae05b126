use mf_core::row;
use mf_mission::methods::unknowns::assign;
use mf_mission::segments::{altitude_climb, climb};
use mf_mission::{Boundary, MissionError, Segment, SegmentLifecycle, SegmentStep};
use nalgebra::DMatrix;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Two-point segment whose single unknown `throttle` must satisfy
/// `throttle * 100 - 50 == 0` at every control point.
fn throttle_segment() -> Segment {
    let mut seg = Segment::new("throttle")
        .with_control_points(2)
        .with_boundary(Boundary {
            duration: Some(10.0),
            mass_start: Some(1000.0),
            ..Boundary::default()
        });
    seg.add_unknown("throttle", row(&[0.1])).unwrap();
    seg.add_residual("balance", 1).unwrap();

    let process = seg.process_mut();
    process
        .process_mut("iterate.unknowns")
        .unwrap()
        .push("throttle", assign("throttle", "propulsion.throttle")).unwrap();
    process.process_mut("iterate.residuals").unwrap().push(
        "balance",
        SegmentStep::action(|seg: &mut Segment| {
            let throttle = seg.state.conditions.extra.array("propulsion.throttle")?;
            let balance = throttle.map(|t| t * 100.0 - 50.0);
            seg.state.residuals.set("balance", balance)?;
            Ok(())
        }),
    ).unwrap();
    seg
}

#[test]
fn throttle_converges_and_post_processes_once() {
    let mut seg = throttle_segment();
    let iterations = counter();
    let post = counter();
    let iterations_at_post = counter();

    let seen = Arc::clone(&iterations);
    seg.process_mut()
        .process_mut("iterate.residuals")
        .unwrap()
        .push(
            "count",
            SegmentStep::action(move |_: &mut Segment| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ).unwrap();
    let (calls, seen, snapshot) = (Arc::clone(&post), Arc::clone(&iterations), Arc::clone(&iterations_at_post));
    seg.process_mut().process_mut("post_process").unwrap().push(
        "count",
        SegmentStep::action(move |seg: &mut Segment| {
            assert_eq!(seg.lifecycle(), SegmentLifecycle::Converged);
            assert_eq!(seg.state.numerics.converged, Some(true));
            calls.fetch_add(1, Ordering::SeqCst);
            snapshot.store(seen.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        }),
    ).unwrap();

    seg.evaluate().unwrap();

    let throttle = seg.state.unknowns.array("throttle").unwrap();
    assert_eq!(throttle.shape(), (2, 1));
    assert!(throttle.iter().all(|t| (t - 0.5).abs() < 1e-6));
    assert_eq!(seg.state.conditions.get("propulsion.throttle").unwrap(), throttle);

    assert_eq!(seg.lifecycle(), SegmentLifecycle::PostProcessed);
    assert!(seg.is_converged());
    assert_eq!(post.load(Ordering::SeqCst), 1);
    assert!(iterations.load(Ordering::SeqCst) > 0);
    assert_eq!(
        iterations_at_post.load(Ordering::SeqCst),
        iterations.load(Ordering::SeqCst)
    );
    assert!(seg.state.numerics.residual_norm.unwrap() < 1e-6);
    assert_eq!(seg.state.conditions.time.as_slice(), &[0.0, 10.0]);
    assert!(seg.state.conditions.mass.iter().all(|&m| m == 1000.0));
}

#[test]
fn non_square_system_fails_before_iterating() {
    let mut seg = throttle_segment();
    seg.add_residual("extra", 2).unwrap();
    let iterations = counter();
    let seen = Arc::clone(&iterations);
    seg.process_mut()
        .process_mut("iterate.conditions")
        .unwrap()
        .insert_before(
            "differentials",
            "count",
            SegmentStep::action(move |_: &mut Segment| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    let err = seg.evaluate().unwrap_err();
    assert!(matches!(err, MissionError::ConfigurationMismatch { ref segment, .. } if segment == "throttle"));
    assert_eq!(iterations.load(Ordering::SeqCst), 0);
    assert_eq!(seg.lifecycle(), SegmentLifecycle::Failed);
    assert_eq!(seg.failure(), Some(&err));
}

#[test]
fn exhausted_iterations_report_non_convergence() {
    let mut seg = Segment::new("stubborn")
        .with_control_points(2)
        .with_boundary(Boundary {
            duration: Some(5.0),
            mass_start: Some(10.0),
            ..Boundary::default()
        });
    seg.state.numerics.solver.max_iterations = 5;
    seg.add_unknown("x", row(&[0.1])).unwrap();
    seg.add_residual("r", 1).unwrap();
    // exp(x) has no root; every Newton step still lowers the norm.
    seg.process_mut().process_mut("iterate.residuals").unwrap().push(
        "r",
        SegmentStep::action(|seg: &mut Segment| {
            let r = seg.state.unknowns.array("x")?.map(f64::exp);
            seg.state.residuals.set("r", r)?;
            Ok(())
        }),
    ).unwrap();

    let err = seg.evaluate().unwrap_err();
    match &err {
        MissionError::NonConvergence {
            tag,
            iterations,
            residual_norm,
        } => {
            assert_eq!(tag, "stubborn");
            assert_eq!(*iterations, 5);
            assert!(*residual_norm > 0.0);
        }
        other => panic!("expected NonConvergence, got {other:?}"),
    }
    assert_eq!(seg.state.numerics.converged, Some(false));
    assert_eq!(seg.state.numerics.iterations, 5);
    assert_eq!(seg.lifecycle(), SegmentLifecycle::Failed);
}

#[test]
fn climb_without_start_altitude_is_a_missing_prerequisite() {
    let mut seg = climb(
        "climb",
        Boundary {
            air_speed: Some(50.0),
            climb_rate: Some(5.0),
            altitude_end: Some(1000.0),
            mass_start: Some(1000.0),
            ..Boundary::default()
        },
    );
    let err = seg.initialize().unwrap_err();
    assert_eq!(
        err,
        MissionError::MissingPrerequisite {
            segment: "climb".into(),
            what: "altitude".into(),
        }
    );
    assert_eq!(seg.lifecycle(), SegmentLifecycle::Failed);
}

#[test]
fn missing_mass_surfaces_from_iterate() {
    let mut seg = Segment::new("massless").with_boundary(Boundary {
        duration: Some(1.0),
        ..Boundary::default()
    });
    let err = seg.evaluate().unwrap_err();
    assert!(matches!(err, MissionError::MissingPrerequisite { ref what, .. } if what == "mass"));
}

#[test]
fn lifecycle_order_is_enforced() {
    let mut seg = throttle_segment();
    assert!(matches!(
        seg.iterate(),
        Err(MissionError::Lifecycle { action: "iterate", state: SegmentLifecycle::Constructed, .. })
    ));
    seg.initialize().unwrap();
    assert!(matches!(
        seg.post_process(),
        Err(MissionError::Lifecycle { action: "post_process", .. })
    ));
    seg.converge().unwrap();
    seg.post_process().unwrap();

    // A converged segment can be evaluated again from scratch.
    seg.evaluate().unwrap();
    assert_eq!(seg.lifecycle(), SegmentLifecycle::PostProcessed);
}

#[test]
fn climb_rate_profile() {
    let mut seg = climb(
        "climb",
        Boundary {
            air_speed: Some(50.0),
            climb_rate: Some(5.0),
            altitude_start: Some(0.0),
            altitude_end: Some(1000.0),
            mass_start: Some(1000.0),
            ..Boundary::default()
        },
    )
    .with_control_points(8);
    seg.evaluate().unwrap();

    let c = &seg.state.conditions;
    let last = c.rows() - 1;
    assert!((c.time[(last, 0)] - 200.0).abs() < 1e-9);
    assert!((c.altitude[(last, 0)] - 1000.0).abs() < 1e-9);
    assert!((c.velocity[(0, 2)] + 5.0).abs() < 1e-12);
    assert!((c.position[(last, 2)] + 1000.0).abs() < 1e-9);
    let horizontal = (50.0_f64 * 50.0 - 25.0).sqrt();
    assert!((c.position[(last, 0)] - horizontal * 200.0).abs() < 1e-6);
}

#[test]
fn climb_rate_above_air_speed_is_rejected() {
    let mut seg = climb(
        "steep",
        Boundary {
            air_speed: Some(5.0),
            climb_rate: Some(50.0),
            altitude_start: Some(0.0),
            altitude_end: Some(1000.0),
            mass_start: Some(1.0),
            ..Boundary::default()
        },
    );
    assert!(matches!(
        seg.initialize(),
        Err(MissionError::ConfigurationMismatch { .. })
    ));
}

#[test]
fn altitude_climb_solves_for_flight_path_angle() {
    let mut seg = altitude_climb(
        "climb",
        Boundary {
            air_speed: Some(50.0),
            climb_rate: Some(10.0),
            altitude_start: Some(0.0),
            altitude_end: Some(500.0),
            mass_start: Some(1000.0),
            ..Boundary::default()
        },
    )
    .with_control_points(6);
    seg.add_residual("vertical_speed", 1).unwrap();
    seg.process_mut().process_mut("iterate.residuals").unwrap().push(
        "vertical_speed",
        SegmentStep::action(|seg: &mut Segment| {
            let up = -seg.state.conditions.velocity.column(2).clone_owned();
            let r = DMatrix::from_fn(up.len(), 1, |i, _| up[i] - 5.0);
            seg.state.residuals.set("vertical_speed", r)?;
            Ok(())
        }),
    ).unwrap();

    seg.evaluate().unwrap();

    let angle = seg.state.unknowns.array("climb_angle").unwrap();
    assert!(angle.iter().all(|a| (a - 0.1_f64.asin()).abs() < 1e-8));

    let c = &seg.state.conditions;
    let last = c.rows() - 1;
    assert!((c.altitude[(last, 0)] - 500.0).abs() < 1e-6);
    assert!((c.time[(last, 0)] - c.time[(0, 0)] - 100.0).abs() < 1e-6);
}

#[test]
fn converge_is_refused_after_a_failed_initialize() {
    let mut seg = throttle_segment();
    seg.evaluate().unwrap();

    seg.state.numerics.number_of_control_points = 0;
    assert!(matches!(
        seg.initialize(),
        Err(MissionError::ConfigurationMismatch { .. })
    ));
    assert_eq!(seg.lifecycle(), SegmentLifecycle::Failed);

    assert!(matches!(
        seg.converge(),
        Err(MissionError::Lifecycle { action: "converge", state: SegmentLifecycle::Failed, .. })
    ));
    assert!(matches!(
        seg.iterate(),
        Err(MissionError::Lifecycle { action: "iterate", .. })
    ));
    assert!(seg.post_process().is_err());
    assert_eq!(seg.lifecycle(), SegmentLifecycle::Failed);
    assert!(!seg.is_converged());
}

#[test]
fn reevaluating_with_more_control_points_resizes_the_state() {
    let mut seg = throttle_segment();
    seg.evaluate().unwrap();
    assert_eq!(seg.state.rows(), 2);

    seg.state.numerics.number_of_control_points = 5;
    seg.evaluate().unwrap();

    let c = &seg.state.conditions;
    assert_eq!(c.rows(), 5);
    assert_eq!(c.velocity.shape(), (5, 3));
    assert!((c.time[(4, 0)] - 10.0).abs() < 1e-9);
    let throttle = seg.state.unknowns.array("throttle").unwrap();
    assert_eq!(throttle.shape(), (5, 1));
    assert!(throttle.iter().all(|t| (t - 0.5).abs() < 1e-6));
    assert_eq!(seg.state.residuals.array("balance").unwrap().nrows(), 5);
    assert_eq!(seg.lifecycle(), SegmentLifecycle::PostProcessed);
}

#[test]
fn level_flight_path_cannot_reach_altitude_end() {
    let mut seg = altitude_climb(
        "climb",
        Boundary {
            air_speed: Some(50.0),
            altitude_start: Some(0.0),
            altitude_end: Some(500.0),
            mass_start: Some(1000.0),
            ..Boundary::default()
        },
    )
    .with_control_points(4);
    seg.state.unknowns.insert("climb_angle", row(&[0.0]));

    seg.initialize().unwrap();
    assert!(matches!(
        seg.iterate(),
        Err(MissionError::ConfigurationMismatch { ref segment, .. }) if segment == "climb"
    ));
}
