//! Control-point distributions and their D/I operators.

use crate::error::{NumericsError, NumericsResult};
use crate::operators::Operators;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Control-point distribution used to build a segment's operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discretization {
    /// Cosine-spaced points with spectral differentiation.
    #[default]
    Chebyshev,
    /// Evenly spaced points with second-order finite differences.
    Linear,
}

impl Discretization {
    pub fn operators(self, points: usize) -> NumericsResult<Operators> {
        match self {
            Discretization::Chebyshev => chebyshev(points),
            Discretization::Linear => linear(points),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Discretization::Chebyshev => "chebyshev",
            Discretization::Linear => "linear",
        }
    }
}

fn single_point() -> Operators {
    Operators {
        control_points: DVector::zeros(1),
        differentiate: DMatrix::zeros(1, 1),
        integrate: DMatrix::zeros(1, 1),
    }
}

/// Chebyshev points on `[0, 1]` with spectral differentiation.
///
/// `x_i = (1 - cos(pi*i/(n-1))) / 2`. `I` inverts `D` with the first point held
/// fixed, so `(I @ g)[0] == 0` and `I @ (D @ f) == f - f[0]` for any polynomial
/// of degree below `n`.
pub fn chebyshev(points: usize) -> NumericsResult<Operators> {
    match points {
        0 => Err(NumericsError::InvalidArg {
            what: "number of control points must be positive",
        }),
        1 => Ok(single_point()),
        n => {
            let last = (n - 1) as f64;
            let x = DVector::from_fn(n, |i, _| 0.5 * (1.0 - (PI * i as f64 / last).cos()));
            let c = |i: usize| if i == 0 || i == n - 1 { 2.0 } else { 1.0 };
            let sign = |i: usize, j: usize| if (i + j) % 2 == 0 { 1.0 } else { -1.0 };

            let mut d = DMatrix::zeros(n, n);
            for i in 0..n {
                let mut diagonal = 0.0;
                for j in 0..n {
                    if i != j {
                        let entry = c(i) / c(j) * sign(i, j) / (x[i] - x[j]);
                        d[(i, j)] = entry;
                        diagonal -= entry;
                    }
                }
                d[(i, i)] = diagonal;
            }

            let integrate = integration_operator(&d)?;
            Ok(Operators {
                control_points: x,
                differentiate: d,
                integrate,
            })
        }
    }
}

/// Evenly spaced points on `[0, 1]`.
///
/// `D` uses central differences inside and one-sided second-order stencils at
/// the ends; `I` is the cumulative trapezoidal rule starting at zero.
pub fn linear(points: usize) -> NumericsResult<Operators> {
    match points {
        0 => Err(NumericsError::InvalidArg {
            what: "number of control points must be positive",
        }),
        1 => Ok(single_point()),
        n => {
            let h = 1.0 / (n - 1) as f64;
            let x = DVector::from_fn(n, |i, _| i as f64 * h);

            let mut d = DMatrix::zeros(n, n);
            if n == 2 {
                for i in 0..2 {
                    d[(i, 0)] = -1.0 / h;
                    d[(i, 1)] = 1.0 / h;
                }
            } else {
                d[(0, 0)] = -3.0 / (2.0 * h);
                d[(0, 1)] = 4.0 / (2.0 * h);
                d[(0, 2)] = -1.0 / (2.0 * h);
                for i in 1..n - 1 {
                    d[(i, i - 1)] = -1.0 / (2.0 * h);
                    d[(i, i + 1)] = 1.0 / (2.0 * h);
                }
                d[(n - 1, n - 3)] = 1.0 / (2.0 * h);
                d[(n - 1, n - 2)] = -4.0 / (2.0 * h);
                d[(n - 1, n - 1)] = 3.0 / (2.0 * h);
            }

            let mut integrate = DMatrix::zeros(n, n);
            for i in 1..n {
                integrate[(i, 0)] = 0.5 * h;
                for j in 1..i {
                    integrate[(i, j)] = h;
                }
                integrate[(i, i)] = 0.5 * h;
            }

            Ok(Operators {
                control_points: x,
                differentiate: d,
                integrate,
            })
        }
    }
}

/// Invert `D` on all points but the first, padding with a zero row and column.
fn integration_operator(d: &DMatrix<f64>) -> NumericsResult<DMatrix<f64>> {
    let n = d.nrows();
    let inner = d
        .view((1, 1), (n - 1, n - 1))
        .clone_owned()
        .try_inverse()
        .ok_or(NumericsError::Singular { points: n })?;

    let mut integrate = DMatrix::zeros(n, n);
    integrate.view_mut((1, 1), (n - 1, n - 1)).copy_from(&inner);
    Ok(integrate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: &DVector<f64>, f: impl Fn(f64) -> f64) -> DVector<f64> {
        x.map(f)
    }

    #[test]
    fn chebyshev_points_span_unit_interval() {
        let ops = chebyshev(5).unwrap();
        let x = &ops.control_points;
        assert!((x[0] - 0.0).abs() < 1e-15);
        assert!((x[4] - 1.0).abs() < 1e-15);
        assert!((x[2] - 0.5).abs() < 1e-15);
        assert!(x.as_slice().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn chebyshev_differentiates_quadratic_exactly() {
        let ops = chebyshev(6).unwrap();
        let f = sample(&ops.control_points, |x| 3.0 * x * x - x + 2.0);
        let df = &ops.differentiate * &f;
        for (i, &x) in ops.control_points.iter().enumerate() {
            assert!((df[i] - (6.0 * x - 1.0)).abs() < 1e-10);
        }
    }

    #[test]
    fn chebyshev_integral_of_derivative_recovers_function() {
        let ops = chebyshev(8).unwrap();
        let f = sample(&ops.control_points, |x| x.powi(7) - 2.0 * x.powi(3) + 4.0);
        let recovered = &ops.integrate * (&ops.differentiate * &f);
        for i in 0..f.len() {
            assert!((recovered[i] - (f[i] - f[0])).abs() < 1e-9);
        }
    }

    #[test]
    fn linear_operators_are_exact_for_linear_functions() {
        let ops = linear(5).unwrap();
        let f = sample(&ops.control_points, |x| 2.0 * x + 1.0);
        let df = &ops.differentiate * &f;
        assert!(df.iter().all(|v| (v - 2.0).abs() < 1e-12));

        let g = DVector::from_element(5, 2.0);
        let integral = &ops.integrate * &g;
        for (i, &x) in ops.control_points.iter().enumerate() {
            assert!((integral[i] - 2.0 * x).abs() < 1e-12);
        }
    }

    #[test]
    fn linear_two_points() {
        let ops = linear(2).unwrap();
        let f = DVector::from_vec(vec![1.0, 3.0]);
        let df = &ops.differentiate * &f;
        assert_eq!(df.as_slice(), &[2.0, 2.0]);
    }

    #[test]
    fn degenerate_point_counts() {
        assert!(matches!(chebyshev(0), Err(NumericsError::InvalidArg { .. })));
        assert!(matches!(linear(0), Err(NumericsError::InvalidArg { .. })));

        let one = chebyshev(1).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one.integrate[(0, 0)], 0.0);
    }

    #[test]
    fn discretization_from_yaml() {
        let d: Discretization = serde_yaml::from_str("linear").unwrap();
        assert_eq!(d, Discretization::Linear);
        assert_eq!(Discretization::default().as_str(), "chebyshev");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn chebyshev_round_trip_for_polynomials(
            coeffs in prop::collection::vec(-5.0_f64..5.0, 1..8),
            extra in 0_usize..4,
        ) {
            let n = coeffs.len() + extra;
            prop_assume!(n >= 2);
            let ops = chebyshev(n).unwrap();
            let f = ops.control_points.map(|x| {
                coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
            });
            let recovered = &ops.integrate * (&ops.differentiate * &f);
            for i in 0..n {
                prop_assert!((recovered[i] - (f[i] - f[0])).abs() < 1e-8);
            }
        }
    }
}
