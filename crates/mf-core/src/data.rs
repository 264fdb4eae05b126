//! Insertion-ordered key/value container with dotted-path addressing.
//!
//! `Data` is the shared currency between steps: conditions extras, unknowns,
//! residuals, settings and step results are all `Data`. Insertion order is
//! meaningful (it is execution order for processes and packing order for
//! unknowns/residuals), so the map is a plain ordered vector of entries.

use crate::error::{MfError, MfResult};
use nalgebra::{DMatrix, DVector};

/// A value stored in a [`Data`] map.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Result of a step that produces nothing.
    #[default]
    Empty,
    Scalar(f64),
    Flag(bool),
    Text(String),
    /// 2-D array, one row per control point.
    Array(DMatrix<f64>),
    Map(Data),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Scalar(_) => "scalar",
            Value::Flag(_) => "flag",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&DMatrix<f64>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut DMatrix<f64>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Data> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Data> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Number of numeric entries this value contributes to a packed vector.
    pub fn packed_len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Array(a) => a.len(),
            Value::Map(m) => m.packed_len(),
            _ => 0,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Flag(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DMatrix<f64>> for Value {
    fn from(v: DMatrix<f64>) -> Self {
        Value::Array(v)
    }
}

impl From<Data> for Value {
    fn from(v: Data) -> Self {
        Value::Map(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Empty
    }
}

/// Single-row array of ones; `expand_rows` tiles it to every control point.
pub fn ones_row(cols: usize) -> DMatrix<f64> {
    DMatrix::from_element(1, cols, 1.0)
}

/// Single-row array holding `values`.
pub fn row(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, values.len(), values)
}

/// One numeric leaf of a packed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Dotted path of the leaf.
    pub path: String,
    pub rows: usize,
    pub cols: usize,
    /// Leaf is a `Value::Scalar` rather than an array.
    pub scalar: bool,
}

impl Slot {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insertion-ordered, dotted-path addressable map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Data {
    entries: Vec<(String, Value)>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a direct child.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Insert a direct child (no path parsing).
    ///
    /// Replacing an existing key keeps its slot in the ordering.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = &self.entries[self.position(first)?].1;
        for part in parts {
            let map = current.as_map()?;
            current = &map.entries[map.position(part)?].1;
        }
        Some(current)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        match path.split_once('.') {
            None => {
                let idx = self.position(path)?;
                Some(&mut self.entries[idx].1)
            }
            Some((head, rest)) => {
                let idx = self.position(head)?;
                self.entries[idx].1.as_map_mut()?.get_mut(rest)
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a value by dotted path, creating intermediate maps.
    ///
    /// A leaf standing where a map is needed is replaced by a fresh map.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> MfResult<()> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(MfError::InvalidArg {
                what: "data path must be non-empty dotted segments",
            });
        }
        self.set_value(path, value.into());
        Ok(())
    }

    fn set_value(&mut self, path: &str, value: Value) {
        match path.split_once('.') {
            None => {
                self.insert(path, value);
            }
            Some((head, rest)) => {
                let idx = match self.position(head) {
                    Some(idx) => idx,
                    None => {
                        self.entries.push((head.to_string(), Value::Map(Data::new())));
                        self.entries.len() - 1
                    }
                };
                let slot = &mut self.entries[idx].1;
                if !matches!(slot, Value::Map(_)) {
                    *slot = Value::Map(Data::new());
                }
                if let Value::Map(child) = slot {
                    child.set_value(rest, value);
                }
            }
        }
    }

    /// Remove a value by dotted path, returning it.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            None => {
                let idx = self.position(path)?;
                Some(self.entries.remove(idx).1)
            }
            Some((head, rest)) => {
                let idx = self.position(head)?;
                self.entries[idx].1.as_map_mut()?.remove(rest)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn typed<'a, T>(
        &'a self,
        path: &str,
        expected: &'static str,
        pick: impl FnOnce(&'a Value) -> Option<T>,
    ) -> MfResult<T> {
        let value = self.get(path).ok_or_else(|| MfError::MissingKey {
            path: path.to_string(),
        })?;
        let found = value.kind();
        pick(value).ok_or_else(|| MfError::TypeMismatch {
            path: path.to_string(),
            expected,
            found,
        })
    }

    pub fn array(&self, path: &str) -> MfResult<&DMatrix<f64>> {
        self.typed(path, "array", Value::as_array)
    }

    pub fn array_mut(&mut self, path: &str) -> MfResult<&mut DMatrix<f64>> {
        let value = self.get_mut(path).ok_or_else(|| MfError::MissingKey {
            path: path.to_string(),
        })?;
        let found = value.kind();
        value.as_array_mut().ok_or_else(|| MfError::TypeMismatch {
            path: path.to_string(),
            expected: "array",
            found,
        })
    }

    pub fn scalar(&self, path: &str) -> MfResult<f64> {
        self.typed(path, "scalar", Value::as_scalar)
    }

    pub fn map(&self, path: &str) -> MfResult<&Data> {
        self.typed(path, "map", Value::as_map)
    }

    /// Recursively merge `other` into `self`; values from `other` win.
    pub fn update(&mut self, other: &Data) {
        for (key, theirs) in other.iter() {
            let merged = match (self.get_mut(key), theirs) {
                (Some(Value::Map(mine)), Value::Map(theirs)) => {
                    mine.update(theirs);
                    true
                }
                _ => false,
            };
            if !merged {
                self.insert(key, theirs.clone());
            }
        }
    }

    /// Ordered numeric leaves, in packing order.
    pub fn layout(&self) -> Vec<Slot> {
        let mut slots = Vec::new();
        self.collect_slots("", &mut slots);
        slots
    }

    fn collect_slots(&self, prefix: &str, out: &mut Vec<Slot>) {
        for (key, value) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match value {
                Value::Scalar(_) => out.push(Slot {
                    path,
                    rows: 1,
                    cols: 1,
                    scalar: true,
                }),
                Value::Array(a) => out.push(Slot {
                    path,
                    rows: a.nrows(),
                    cols: a.ncols(),
                    scalar: false,
                }),
                Value::Map(m) => m.collect_slots(&path, out),
                _ => {}
            }
        }
    }

    /// Total number of numeric entries across all leaves.
    pub fn packed_len(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.packed_len()).sum()
    }

    /// Flatten every numeric leaf (arrays row-major) into one vector.
    pub fn pack_array(&self) -> DVector<f64> {
        let mut out = Vec::with_capacity(self.packed_len());
        self.pack_into(&mut out);
        DVector::from_vec(out)
    }

    fn pack_into(&self, out: &mut Vec<f64>) {
        for (_, value) in &self.entries {
            match value {
                Value::Scalar(s) => out.push(*s),
                Value::Array(a) => {
                    for r in 0..a.nrows() {
                        for c in 0..a.ncols() {
                            out.push(a[(r, c)]);
                        }
                    }
                }
                Value::Map(m) => m.pack_into(out),
                _ => {}
            }
        }
    }

    /// Write a packed vector back into the numeric leaves, keeping every shape.
    pub fn unpack_array(&mut self, values: &DVector<f64>) -> MfResult<()> {
        self.unpack_slice(values.as_slice())
    }

    pub fn unpack_slice(&mut self, values: &[f64]) -> MfResult<()> {
        let expected = self.packed_len();
        if values.len() != expected {
            return Err(MfError::ShapeMismatch {
                what: "packed array".to_string(),
                expected,
                found: values.len(),
            });
        }
        let mut cursor = 0;
        self.unpack_from(values, &mut cursor);
        Ok(())
    }

    fn unpack_from(&mut self, values: &[f64], cursor: &mut usize) {
        for (_, value) in &mut self.entries {
            match value {
                Value::Scalar(s) => {
                    *s = values[*cursor];
                    *cursor += 1;
                }
                Value::Array(a) => {
                    for r in 0..a.nrows() {
                        for c in 0..a.ncols() {
                            a[(r, c)] = values[*cursor];
                            *cursor += 1;
                        }
                    }
                }
                Value::Map(m) => m.unpack_from(values, cursor),
                _ => {}
            }
        }
    }

    /// Tile every single-row array to `rows` rows.
    ///
    /// Arrays that already have `rows` rows are left alone; scalars are never expanded.
    pub fn expand_rows(&mut self, rows: usize) -> MfResult<()> {
        self.expand_rows_at("", rows)
    }

    /// Cut every array down to its first row, the inverse of [`expand_rows`](Self::expand_rows).
    pub fn first_rows(&mut self) {
        for (_, value) in &mut self.entries {
            match value {
                Value::Array(a) if a.nrows() > 1 => {
                    *a = a.rows(0, 1).clone_owned();
                }
                Value::Map(m) => m.first_rows(),
                _ => {}
            }
        }
    }

    fn expand_rows_at(&mut self, prefix: &str, rows: usize) -> MfResult<()> {
        for (key, value) in &mut self.entries {
            match value {
                Value::Array(a) if a.nrows() == rows => {}
                Value::Array(a) if a.nrows() == 1 => {
                    let first = a.row(0).clone_owned();
                    *a = DMatrix::from_fn(rows, first.ncols(), |_, c| first[c]);
                }
                Value::Array(a) => {
                    return Err(MfError::ShapeMismatch {
                        what: join(prefix, key),
                        expected: rows,
                        found: a.nrows(),
                    });
                }
                Value::Map(m) => m.expand_rows_at(&join(prefix, key), rows)?,
                _ => {}
            }
        }
        Ok(())
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
