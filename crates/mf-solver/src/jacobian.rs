//! Finite difference Jacobian computation.

use crate::config::JacobianScheme;
use nalgebra::{DMatrix, DVector};

/// Perturbation for column `j`.
fn step(x: &DVector<f64>, j: usize, epsilon: f64) -> f64 {
    epsilon * x[j].abs().max(1.0)
}

/// Compute Jacobian using forward finite differences.
///
/// `f_x` is the residual already evaluated at `x`; each column costs one call.
pub fn forward_difference<F, E>(
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    f: &mut F,
    epsilon: f64,
) -> Result<DMatrix<f64>, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    let n = x.len();
    let mut jac = DMatrix::zeros(f_x.len(), n);

    for j in 0..n {
        let dx = step(x, j, epsilon);
        let mut x_perturbed = x.clone();
        x_perturbed[j] += dx;

        let df = (f(&x_perturbed)? - f_x) / dx;
        jac.set_column(j, &df);
    }

    Ok(jac)
}

/// Compute Jacobian using central finite differences (more accurate but 2x cost).
pub fn central_difference<F, E>(
    x: &DVector<f64>,
    rows: usize,
    f: &mut F,
    epsilon: f64,
) -> Result<DMatrix<f64>, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    let n = x.len();
    let mut jac = DMatrix::zeros(rows, n);

    for j in 0..n {
        let dx = step(x, j, epsilon);

        let mut x_plus = x.clone();
        x_plus[j] += dx;
        let f_plus = f(&x_plus)?;

        let mut x_minus = x.clone();
        x_minus[j] -= dx;
        let f_minus = f(&x_minus)?;

        jac.set_column(j, &((f_plus - f_minus) / (2.0 * dx)));
    }

    Ok(jac)
}

/// Dispatch on the configured stencil.
pub fn jacobian<F, E>(
    scheme: JacobianScheme,
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    f: &mut F,
    epsilon: f64,
) -> Result<DMatrix<f64>, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    match scheme {
        JacobianScheme::Forward => forward_difference(x, f_x, f, epsilon),
        JacobianScheme::Central => central_difference(x, f_x.len(), f, epsilon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type R = Result<DVector<f64>, ()>;

    #[test]
    fn jacobian_linear() {
        // f(x) = 2*x, J = 2
        let mut f = |x: &DVector<f64>| -> R { Ok(DVector::from_element(1, 2.0 * x[0])) };

        let x = DVector::from_element(1, 3.0);
        let f_x = f(&x).unwrap();
        let jac = forward_difference(&x, &f_x, &mut f, 1e-7).unwrap();

        assert!((jac[(0, 0)] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn central_is_exact_for_quadratics() {
        // f(x, y) = (x^2, x*y), J = [[2x, 0], [y, x]]
        let mut calls = 0;
        let mut f = |v: &DVector<f64>| -> R {
            calls += 1;
            Ok(DVector::from_vec(vec![v[0] * v[0], v[0] * v[1]]))
        };

        let x = DVector::from_vec(vec![3.0, -2.0]);
        let jac = central_difference(&x, 2, &mut f, 1e-5).unwrap();

        assert!((jac[(0, 0)] - 6.0).abs() < 1e-8);
        assert!(jac[(0, 1)].abs() < 1e-8);
        assert!((jac[(1, 0)] + 2.0).abs() < 1e-8);
        assert!((jac[(1, 1)] - 3.0).abs() < 1e-8);
        assert_eq!(calls, 4);
    }

    #[test]
    fn caller_errors_propagate() {
        let mut f = |_: &DVector<f64>| -> Result<DVector<f64>, &'static str> { Err("stall") };
        let x = DVector::from_element(2, 1.0);
        let f_x = DVector::zeros(2);
        assert_eq!(forward_difference(&x, &f_x, &mut f, 1e-7).unwrap_err(), "stall");
    }
}
