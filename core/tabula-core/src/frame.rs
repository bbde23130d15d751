//! Frame — the in-memory table exchanged with backends.
//!
//! A frame is an ordered list of column names and a list of rows, each row
//! holding one [`ScalarValue`] per column. Backends accept frames on commit
//! and return frames on read.

use crate::error::{TabulaError, TabulaResult};
use crate::value::ScalarValue;
use serde_json::Value;
use std::collections::HashMap;

/// Row-major table of dynamically typed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<ScalarValue>>,
}

impl Frame {
    /// Create an empty frame with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a frame from rows. Every row must have one value per column.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<ScalarValue>>,
    ) -> TabulaResult<Self> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Build a frame from named columns of equal length.
    pub fn from_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Vec<ScalarValue>)>,
    ) -> TabulaResult<Self> {
        let (names, data): (Vec<String>, Vec<Vec<ScalarValue>>) = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .unzip();
        let len = data.first().map(Vec::len).unwrap_or(0);
        if let Some((name, values)) = names.iter().zip(&data).find(|(_, v)| v.len() != len) {
            return Err(TabulaError::Validation(format!(
                "column '{name}' has {} values, expected {len}",
                values.len()
            )));
        }
        let mut columns: Vec<std::vec::IntoIter<ScalarValue>> =
            data.into_iter().map(Vec::into_iter).collect();
        let rows = (0..len)
            .map(|_| columns.iter_mut().filter_map(Iterator::next).collect())
            .collect();
        Ok(Self {
            columns: names,
            rows,
        })
    }

    /// Build a frame from JSON.
    ///
    /// Accepts a dict of columns (`{"a": [1, 2], "b": ["x", "y"]}`) or a list
    /// of records (`[{"a": 1, "b": "x"}, ...]`). Record keys missing from a
    /// record are filled with nulls.
    pub fn from_json(value: &Value) -> TabulaResult<Self> {
        match value {
            Value::Object(map) => {
                let mut columns = Vec::with_capacity(map.len());
                for (name, column) in map {
                    let Value::Array(items) = column else {
                        return Err(TabulaError::Validation(format!(
                            "column '{name}' must be a list of values"
                        )));
                    };
                    columns.push((
                        name.clone(),
                        items.iter().map(ScalarValue::from_json).collect(),
                    ));
                }
                Self::from_columns(columns)
            }
            Value::Array(records) => {
                let mut frame = Frame::default();
                for record in records {
                    let Value::Object(fields) = record else {
                        return Err(TabulaError::Validation(
                            "records must be JSON objects".to_string(),
                        ));
                    };
                    for name in fields.keys() {
                        frame.ensure_column(name);
                    }
                    let row = frame
                        .columns
                        .iter()
                        .map(|c| fields.get(c).map(ScalarValue::from_json).unwrap_or(ScalarValue::Null))
                        .collect();
                    frame.rows.push(row);
                }
                Ok(frame)
            }
            _ => Err(TabulaError::Validation(
                "dataset must be a dict of columns or a list of records".to_string(),
            )),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<ScalarValue>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<ScalarValue>> {
        self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<ScalarValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// Value at (`row`, `column`); `None` if either is out of range.
    pub fn value(&self, row: usize, column: &str) -> Option<&ScalarValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Append a row. Its width must match the column count.
    pub fn push_row(&mut self, row: Vec<ScalarValue>) -> TabulaResult<()> {
        if row.len() != self.columns.len() {
            return Err(TabulaError::Validation(format!(
                "expected {} values per row, got {}",
                self.columns.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Add `name` as an all-null column if it is not present.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
            for row in &mut self.rows {
                row.push(ScalarValue::Null);
            }
        }
    }

    /// Add or replace a column.
    pub fn set_column(&mut self, name: &str, values: Vec<ScalarValue>) -> TabulaResult<()> {
        if values.len() != self.rows.len() {
            return Err(TabulaError::Validation(format!(
                "column '{name}' has {} values, frame has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.ensure_column(name);
        let idx = self.column_index(name).unwrap_or_default();
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Remove the named columns; unknown names are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.contains(&c.as_str()))
            .collect();
        let mut keep_iter = keep.iter();
        self.columns.retain(|_| *keep_iter.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut keep_iter = keep.iter();
            row.retain(|_| *keep_iter.next().unwrap_or(&true));
        }
    }

    /// New frame with only the rows at `indices`, in the given order.
    pub fn take(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Keep rows for which `keep` returns true.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[ScalarValue]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Stack `other` below `self`.
    ///
    /// Columns are the union of both frames (this frame's order first); cells
    /// for columns a frame lacks are null.
    pub fn concat(mut self, other: Frame) -> Frame {
        for name in &other.columns {
            self.ensure_column(name);
        }
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();
        for row in other.rows {
            let mapped = mapping
                .iter()
                .map(|idx| idx.map(|i| row[i].clone()).unwrap_or(ScalarValue::Null))
                .collect();
            self.rows.push(mapped);
        }
        self
    }

    /// Row as a column-name → value map.
    pub fn row_map(&self, row: usize) -> Option<HashMap<&str, &ScalarValue>> {
        let values = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .map(String::as_str)
                .zip(values.iter())
                .collect(),
        )
    }

    /// Copy of this frame with rows sorted by `column`.
    ///
    /// Ordering is by the value's display form for mixed types; intended for
    /// comparisons in tests and reports.
    pub fn sorted_by(&self, column: &str) -> Frame {
        let mut frame = self.clone();
        if let Some(idx) = self.column_index(column) {
            frame.rows.sort_by(|a, b| compare_values(&a[idx], &b[idx]));
        }
        frame
    }
}

fn compare_values(a: &ScalarValue, b: &ScalarValue) -> std::cmp::Ordering {
    use ScalarValue::*;
    match (a, b) {
        (Int64(x), Int64(y)) => x.cmp(y),
        (Float64(x), Float64(y)) => x.total_cmp(y),
        (Int64(x), Float64(y)) => (*x as f64).total_cmp(y),
        (Float64(x), Int64(y)) => x.total_cmp(&(*y as f64)),
        (Null, Null) => std::cmp::Ordering::Equal,
        (Null, _) => std::cmp::Ordering::Less,
        (_, Null) => std::cmp::Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ints(values: &[i64]) -> Vec<ScalarValue> {
        values.iter().map(|v| ScalarValue::Int64(*v)).collect()
    }

    #[test]
    fn from_columns_transposes() {
        let frame =
            Frame::from_columns([("a", ints(&[1, 2])), ("b", ints(&[3, 4]))]).unwrap();
        assert_eq!(frame.columns(), ["a", "b"]);
        assert_eq!(frame.rows()[1], ints(&[2, 4]));
    }

    #[test]
    fn from_columns_rejects_ragged_input() {
        let err = Frame::from_columns([("a", ints(&[1, 2])), ("b", ints(&[3]))]).unwrap_err();
        assert!(matches!(err, TabulaError::Validation(_)));
    }

    #[test]
    fn from_json_dict_of_columns() {
        let frame = Frame::from_json(&json!({"col1": [1, 2, 3], "col2": ["a", "b", "c"]})).unwrap();
        assert_eq!(frame.num_rows(), 3);
        assert_eq!(frame.value(2, "col2"), Some(&ScalarValue::from("c")));
    }

    #[test]
    fn from_json_records_fill_missing_keys() {
        let frame = Frame::from_json(&json!([{"a": 1}, {"a": 2, "b": true}])).unwrap();
        assert_eq!(frame.columns(), ["a", "b"]);
        assert_eq!(frame.value(0, "b"), Some(&ScalarValue::Null));
        assert_eq!(frame.value(1, "b"), Some(&ScalarValue::Boolean(true)));
    }

    #[test]
    fn from_json_rejects_scalars() {
        assert!(Frame::from_json(&json!(3)).is_err());
        assert!(Frame::from_json(&json!({"a": 3})).is_err());
    }

    #[test]
    fn concat_unions_columns() {
        let top = Frame::from_columns([("a", ints(&[1]))]).unwrap();
        let bottom = Frame::from_columns([("b", ints(&[2])), ("a", ints(&[3]))]).unwrap();
        let joined = top.concat(bottom);
        assert_eq!(joined.columns(), ["a", "b"]);
        assert_eq!(joined.rows()[0], vec![ScalarValue::Int64(1), ScalarValue::Null]);
        assert_eq!(joined.rows()[1], ints(&[3, 2]));
    }

    #[test]
    fn drop_and_ensure_columns() {
        let mut frame =
            Frame::from_columns([("a", ints(&[1])), ("b", ints(&[2])), ("c", ints(&[3]))]).unwrap();
        frame.drop_columns(&["b", "missing"]);
        assert_eq!(frame.columns(), ["a", "c"]);
        assert_eq!(frame.rows()[0], ints(&[1, 3]));

        frame.ensure_column("d");
        assert_eq!(frame.value(0, "d"), Some(&ScalarValue::Null));
    }

    #[test]
    fn set_column_replaces_values() {
        let mut frame = Frame::from_columns([("a", ints(&[1, 2]))]).unwrap();
        frame.set_column("a", ints(&[5, 6])).unwrap();
        frame.set_column("b", ints(&[7, 8])).unwrap();
        assert_eq!(frame.rows()[1], ints(&[6, 8]));
        assert!(frame.set_column("c", ints(&[1])).is_err());
    }

    #[test]
    fn sorted_by_orders_numbers() {
        let frame = Frame::from_columns([("a", ints(&[3, 1, 2]))]).unwrap();
        assert_eq!(frame.sorted_by("a").column("a").unwrap(), ints(&[1, 2, 3]));
    }
}
