//! Discretized segment conditions.
//!
//! Every quantity is an `[N, width]` array with one row per control point.
//! Frame convention: inertial axes, x forward, z positive down, so
//! `position[:, 2] == -altitude`.

use mf_core::{Data, MfError, MfResult, Value};
use nalgebra::DMatrix;

/// Name and column count of one typed condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub width: usize,
}

/// Typed fields in iteration order.
pub const FIELDS: [Field; 9] = [
    Field { name: "time", width: 1 },
    Field { name: "position", width: 3 },
    Field { name: "velocity", width: 3 },
    Field { name: "acceleration", width: 3 },
    Field { name: "altitude", width: 1 },
    Field { name: "mass", width: 1 },
    Field { name: "mass_rate", width: 1 },
    Field { name: "energy", width: 1 },
    Field { name: "power", width: 1 },
];

/// Engine-known quantities plus open-ended collaborator outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub time: DMatrix<f64>,
    pub position: DMatrix<f64>,
    pub velocity: DMatrix<f64>,
    pub acceleration: DMatrix<f64>,
    pub altitude: DMatrix<f64>,
    pub mass: DMatrix<f64>,
    /// Time derivative of mass (negative while burning fuel).
    pub mass_rate: DMatrix<f64>,
    pub energy: DMatrix<f64>,
    /// Power drawn from the energy store.
    pub power: DMatrix<f64>,
    /// Collaborator outputs, keyed by analysis name.
    pub extra: Data,
}

impl Default for Conditions {
    fn default() -> Self {
        Self::with_rows(1)
    }
}

impl Conditions {
    /// Zero-filled conditions with `rows` control points.
    pub fn with_rows(rows: usize) -> Self {
        let z = |width| DMatrix::zeros(rows, width);
        Self {
            time: z(1),
            position: z(3),
            velocity: z(3),
            acceleration: z(3),
            altitude: z(1),
            mass: z(1),
            mass_rate: z(1),
            energy: z(1),
            power: z(1),
            extra: Data::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.time.nrows()
    }

    pub fn field(&self, name: &str) -> Option<&DMatrix<f64>> {
        Some(match name {
            "time" => &self.time,
            "position" => &self.position,
            "velocity" => &self.velocity,
            "acceleration" => &self.acceleration,
            "altitude" => &self.altitude,
            "mass" => &self.mass,
            "mass_rate" => &self.mass_rate,
            "energy" => &self.energy,
            "power" => &self.power,
            _ => return None,
        })
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut DMatrix<f64>> {
        Some(match name {
            "time" => &mut self.time,
            "position" => &mut self.position,
            "velocity" => &mut self.velocity,
            "acceleration" => &mut self.acceleration,
            "altitude" => &mut self.altitude,
            "mass" => &mut self.mass,
            "mass_rate" => &mut self.mass_rate,
            "energy" => &mut self.energy,
            "power" => &mut self.power,
            _ => return None,
        })
    }

    /// Typed field by name, otherwise an array under `extra`.
    pub fn get(&self, path: &str) -> Option<&DMatrix<f64>> {
        self.field(path)
            .or_else(|| self.extra.get(path).and_then(Value::as_array))
    }

    /// Write an array to a typed field (shape must match) or under `extra`.
    pub fn set(&mut self, path: &str, value: DMatrix<f64>) -> MfResult<()> {
        match self.field_mut(path) {
            Some(field) => {
                if field.shape() != value.shape() {
                    return Err(MfError::ShapeMismatch {
                        what: path.to_string(),
                        expected: field.len(),
                        found: value.len(),
                    });
                }
                *field = value;
                Ok(())
            }
            None => self.extra.set(path, value),
        }
    }

    /// Tile single-row arrays to `rows` rows, `extra` included.
    pub fn expand_rows(&mut self, rows: usize) -> MfResult<()> {
        for f in FIELDS {
            if let Some(field) = self.field_mut(f.name) {
                if field.nrows() == rows {
                    continue;
                }
                if field.nrows() != 1 {
                    return Err(MfError::ShapeMismatch {
                        what: f.name.to_string(),
                        expected: rows,
                        found: field.nrows(),
                    });
                }
                *field = tile(field, rows);
            }
        }
        self.extra.expand_rows(rows)
    }

    /// One-row snapshot of the last control point.
    pub fn final_row(&self) -> MfResult<Conditions> {
        let rows = self.rows();
        if rows == 0 {
            return Err(MfError::InvalidArg {
                what: "conditions have no control points",
            });
        }
        let mut out = Conditions::with_rows(1);
        for f in FIELDS {
            if let (Some(src), Some(dst)) = (self.field(f.name), out.field_mut(f.name)) {
                *dst = last_row(src);
            }
        }
        out.extra = self.extra.clone();
        last_rows(&mut out.extra);
        Ok(out)
    }

    /// Stack several conditions vertically, in order.
    ///
    /// Extra arrays are kept when every part has them with the same column count.
    pub fn stack(parts: &[&Conditions]) -> MfResult<Conditions> {
        let Some(first) = parts.first() else {
            return Err(MfError::InvalidArg {
                what: "cannot stack zero conditions",
            });
        };
        let mut out = Conditions::with_rows(0);
        for f in FIELDS {
            let arrays: Vec<&DMatrix<f64>> = parts.iter().filter_map(|c| c.field(f.name)).collect();
            if let Some(dst) = out.field_mut(f.name) {
                *dst = vstack(&arrays, f.width)?;
            }
        }
        for slot in first.extra.layout().iter().filter(|s| !s.scalar) {
            let arrays: Option<Vec<&DMatrix<f64>>> = parts
                .iter()
                .map(|c| c.extra.get(&slot.path).and_then(Value::as_array))
                .collect();
            if let Some(arrays) = arrays {
                if arrays.iter().all(|a| a.ncols() == slot.cols) {
                    out.extra.set(&slot.path, vstack(&arrays, slot.cols)?)?;
                }
            }
        }
        Ok(out)
    }
}

fn tile(single: &DMatrix<f64>, rows: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, single.ncols(), |_, c| single[(0, c)])
}

fn last_row(a: &DMatrix<f64>) -> DMatrix<f64> {
    match a.nrows() {
        0 => DMatrix::zeros(1, a.ncols()),
        n => a.rows(n - 1, 1).clone_owned(),
    }
}

fn last_rows(data: &mut Data) {
    for (_, value) in data.iter_mut() {
        match value {
            Value::Array(a) => *a = last_row(a),
            Value::Map(m) => last_rows(m),
            _ => {}
        }
    }
}

fn vstack(parts: &[&DMatrix<f64>], width: usize) -> MfResult<DMatrix<f64>> {
    let rows = parts.iter().map(|a| a.nrows()).sum();
    let mut out = DMatrix::zeros(rows, width);
    let mut offset = 0;
    for &a in parts {
        if a.ncols() != width {
            return Err(MfError::ShapeMismatch {
                what: "stacked columns".to_string(),
                expected: width,
                found: a.ncols(),
            });
        }
        out.rows_mut(offset, a.nrows()).copy_from(a);
        offset += a.nrows();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::{ones_row, row};

    #[test]
    fn fields_have_declared_widths() {
        let c = Conditions::with_rows(4);
        for f in FIELDS {
            let a = c.field(f.name).unwrap();
            assert_eq!(a.shape(), (4, f.width), "{}", f.name);
        }
        assert_eq!(c.rows(), 4);
    }

    #[test]
    fn expand_tiles_single_rows() {
        let mut c = Conditions::default();
        c.velocity = row(&[50.0, 0.0, -2.0]);
        c.extra.set("aerodynamics.lift_coefficient", ones_row(1) * 0.4).unwrap();

        c.expand_rows(5).unwrap();
        assert_eq!(c.velocity.nrows(), 5);
        assert_eq!(c.velocity[(4, 0)], 50.0);
        assert_eq!(c.get("aerodynamics.lift_coefficient").unwrap().nrows(), 5);

        c.time = DMatrix::zeros(3, 1);
        assert!(matches!(c.expand_rows(5), Err(MfError::ShapeMismatch { .. })));
    }

    #[test]
    fn final_row_snapshot() {
        let mut c = Conditions::with_rows(3);
        c.altitude = DMatrix::from_column_slice(3, 1, &[0.0, 500.0, 1000.0]);
        c.extra.set("battery.charge", DMatrix::from_column_slice(3, 1, &[1.0, 0.9, 0.8])).unwrap();

        let last = c.final_row().unwrap();
        assert_eq!(last.rows(), 1);
        assert_eq!(last.altitude[(0, 0)], 1000.0);
        assert_eq!(last.get("battery.charge").unwrap()[(0, 0)], 0.8);
    }

    #[test]
    fn set_checks_typed_shapes() {
        let mut c = Conditions::with_rows(2);
        assert!(c.set("mass", DMatrix::from_element(2, 1, 10.0)).is_ok());
        assert!(c.set("mass", DMatrix::from_element(2, 2, 10.0)).is_err());
        c.set("propulsion.throttle", DMatrix::from_element(2, 1, 0.7)).unwrap();
        assert_eq!(c.get("propulsion.throttle").unwrap()[(1, 0)], 0.7);
        assert!(c.get("missing").is_none());
    }

    #[test]
    fn stack_concatenates_in_order() {
        let mut a = Conditions::with_rows(2);
        a.time = DMatrix::from_column_slice(2, 1, &[0.0, 10.0]);
        a.extra.set("drag", DMatrix::from_element(2, 1, 1.0)).unwrap();
        let mut b = Conditions::with_rows(3);
        b.time = DMatrix::from_column_slice(3, 1, &[10.0, 15.0, 20.0]);
        b.extra.set("drag", DMatrix::from_element(3, 1, 2.0)).unwrap();

        let merged = Conditions::stack(&[&a, &b]).unwrap();
        assert_eq!(merged.rows(), 5);
        assert_eq!(merged.time.as_slice(), &[0.0, 10.0, 10.0, 15.0, 20.0]);
        assert_eq!(merged.get("drag").unwrap().nrows(), 5);
        assert!(Conditions::stack(&[]).is_err());
    }
}
