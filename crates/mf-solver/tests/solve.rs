use mf_solver::{JacobianScheme, RootFinder, SolverConfig, SolverError, solve};
use nalgebra::DVector;

#[derive(Debug, PartialEq)]
enum CallerError {
    Solver(SolverError),
    Model(&'static str),
}

impl From<SolverError> for CallerError {
    fn from(e: SolverError) -> Self {
        CallerError::Solver(e)
    }
}

#[test]
fn trivial_convergence() {
    let target = DVector::from_vec(vec![0.5, -2.0, 10.0]);
    let solution = solve(
        DVector::zeros(3),
        3,
        |x: &DVector<f64>| -> Result<_, SolverError> { Ok(x - &target) },
        &SolverConfig::default(),
    )
    .unwrap();

    assert!((solution.x - &target).amax() < 1e-8);
    assert!(solution.residual_norm <= 1e-8);
    assert!(solution.evaluations > solution.iterations);
}

#[test]
fn non_square_system_never_calls_residual() {
    let mut calls = 0;
    let err = solve(
        DVector::zeros(2),
        3,
        |_: &DVector<f64>| -> Result<DVector<f64>, SolverError> {
            calls += 1;
            Ok(DVector::zeros(3))
        },
        &SolverConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SolverError::ProblemSetup { .. }));
    assert_eq!(calls, 0);
}

#[test]
fn residual_length_is_enforced() {
    let err = solve(
        DVector::zeros(2),
        2,
        |_: &DVector<f64>| -> Result<DVector<f64>, SolverError> { Ok(DVector::zeros(1)) },
        &SolverConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SolverError::ProblemSetup { .. }));
}

#[test]
fn iteration_budget_exhausted() {
    let config = SolverConfig {
        max_iterations: 2,
        ..SolverConfig::default()
    };
    // x^3 - 1000 from far away needs more than two Newton steps
    let err = solve(
        DVector::from_element(1, 1.0),
        1,
        |x: &DVector<f64>| -> Result<DVector<f64>, SolverError> {
            Ok(DVector::from_element(1, x[0].powi(3) - 1000.0))
        },
        &config,
    )
    .unwrap_err();

    match err {
        SolverError::DidNotConverge {
            residual_norm,
            iterations,
        } => {
            assert_eq!(iterations, 2);
            assert!(residual_norm > 1e-8);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn caller_errors_pass_through() {
    let err = solve(
        DVector::from_element(1, 1.0),
        1,
        |x: &DVector<f64>| {
            if x[0] > 1.5 {
                Err(CallerError::Model("stall"))
            } else {
                Ok(DVector::from_element(1, x[0] - 4.0))
            }
        },
        &SolverConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err, CallerError::Model("stall"));
}

#[test]
fn broyden_with_central_differences() {
    let config = SolverConfig {
        method: RootFinder::Broyden,
        jacobian: JacobianScheme::Central,
        ..SolverConfig::default()
    };
    let solution = solve(
        DVector::from_vec(vec![1.0, 1.0]),
        2,
        |v: &DVector<f64>| -> Result<DVector<f64>, SolverError> {
            Ok(DVector::from_vec(vec![
                v[0] * v[0] + v[1] * v[1] - 4.0,
                v[0] - v[1],
            ]))
        },
        &config,
    )
    .unwrap();

    let root = 2f64.sqrt();
    assert!((solution.x[0] - root).abs() < 1e-6);
    assert!((solution.x[1] - root).abs() < 1e-6);
}

#[test]
fn empty_system_converges_immediately() {
    let solution = solve(
        DVector::zeros(0),
        0,
        |_: &DVector<f64>| -> Result<DVector<f64>, SolverError> { Ok(DVector::zeros(0)) },
        &SolverConfig::default(),
    )
    .unwrap();
    assert_eq!(solution.iterations, 0);
    assert_eq!(solution.evaluations, 1);
}

#[test]
fn config_from_yaml() {
    let yaml = r#"
method: broyden
max_iterations: 80
jacobian: central
"#;
    let config: SolverConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.method, RootFinder::Broyden);
    assert_eq!(config.max_iterations, 80);
    assert_eq!(config.jacobian, JacobianScheme::Central);
    assert_eq!(config.tolerance, 1e-8);
    assert_eq!(config.line_search_beta, 0.5);
}
