//! Differentiation/integration operator bundle.

use crate::error::{NumericsError, NumericsResult};
use nalgebra::{DMatrix, DVector};

/// Control points plus the dense `D` and `I` operators defined on them.
#[derive(Debug, Clone, PartialEq)]
pub struct Operators {
    pub control_points: DVector<f64>,
    pub differentiate: DMatrix<f64>,
    pub integrate: DMatrix<f64>,
}

impl Default for Operators {
    fn default() -> Self {
        Self {
            control_points: DVector::zeros(0),
            differentiate: DMatrix::zeros(0, 0),
            integrate: DMatrix::zeros(0, 0),
        }
    }
}

impl Operators {
    /// Number of control points.
    pub fn len(&self) -> usize {
        self.control_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.control_points.is_empty()
    }

    /// Map the operators onto a physical coordinate `offset + span * x`.
    ///
    /// Derivatives scale by `1/span` and integrals by `span`.
    pub fn rescale(&self, span: f64, offset: f64) -> NumericsResult<Operators> {
        if !span.is_finite() || span == 0.0 {
            return Err(NumericsError::InvalidSpan { span });
        }
        Ok(Operators {
            control_points: self.control_points.map(|x| offset + span * x),
            differentiate: &self.differentiate / span,
            integrate: &self.integrate * span,
        })
    }

    /// Derivative of sampled columns with respect to this coordinate.
    pub fn derivative(&self, f: &DMatrix<f64>) -> NumericsResult<DMatrix<f64>> {
        self.check_rows(f)?;
        Ok(&self.differentiate * f)
    }

    /// Running integral of sampled columns, zero at the first point.
    pub fn integral(&self, f: &DMatrix<f64>) -> NumericsResult<DMatrix<f64>> {
        self.check_rows(f)?;
        Ok(&self.integrate * f)
    }

    fn check_rows(&self, f: &DMatrix<f64>) -> NumericsResult<()> {
        if f.nrows() != self.len() {
            return Err(NumericsError::InvalidArg {
                what: "sampled array rows must match control points",
            });
        }
        Ok(())
    }
}
