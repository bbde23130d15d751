//! Scalar values stored in table cells.
//!
//! Every cell of a [`Frame`](crate::frame::Frame) is a [`ScalarValue`]. The
//! physical type of a column is decided at the write boundary, where values
//! are cast with [`ScalarValue::cast_to`].

use crate::error::{TabulaError, TabulaResult};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A dynamically typed cell value.
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Null,
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    /// Array values; persisted as JSON text.
    List(Vec<ScalarValue>),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// The Arrow type a value of this kind is stored as when nothing else is known.
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) | ScalarValue::List(_) => DataType::Utf8,
            ScalarValue::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert a JSON value into a cell value. Objects are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ScalarValue::Null,
            Value::Bool(b) => ScalarValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ScalarValue::Int64(i),
                None => n
                    .as_f64()
                    .map(ScalarValue::Float64)
                    .unwrap_or(ScalarValue::Null),
            },
            Value::String(s) => ScalarValue::Utf8(s.clone()),
            Value::Array(items) => ScalarValue::List(items.iter().map(Self::from_json).collect()),
            Value::Object(_) => ScalarValue::Utf8(value.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            ScalarValue::Null => Value::Null,
            ScalarValue::Int64(v) => Value::from(*v),
            ScalarValue::Float64(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ScalarValue::Utf8(s) => Value::String(s.clone()),
            ScalarValue::Boolean(b) => Value::Bool(*b),
            ScalarValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Cast to the physical column type `target`.
    ///
    /// `column` is only used to name the column in the error.
    pub fn cast_to(&self, target: &DataType, column: &str) -> TabulaResult<ScalarValue> {
        let mismatch = || TabulaError::TypeMismatch {
            column: column.to_string(),
            expected: format!("{target:?}"),
            actual: format!("{self:?}"),
        };
        if self.is_null() {
            return Ok(ScalarValue::Null);
        }
        match target {
            DataType::Int64 => match self {
                ScalarValue::Int64(v) => Ok(ScalarValue::Int64(*v)),
                // i64::MAX as f64 rounds up to 2^63, which is out of range.
                ScalarValue::Float64(f)
                    if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
                {
                    Ok(ScalarValue::Int64(*f as i64))
                }
                ScalarValue::Boolean(b) => Ok(ScalarValue::Int64(i64::from(*b))),
                ScalarValue::Utf8(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(ScalarValue::Int64)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            DataType::Float64 => match self {
                ScalarValue::Int64(v) => Ok(ScalarValue::Float64(*v as f64)),
                ScalarValue::Float64(f) => Ok(ScalarValue::Float64(*f)),
                ScalarValue::Utf8(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(ScalarValue::Float64)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            DataType::Boolean => match self {
                ScalarValue::Boolean(b) => Ok(ScalarValue::Boolean(*b)),
                ScalarValue::Int64(0) => Ok(ScalarValue::Boolean(false)),
                ScalarValue::Int64(1) => Ok(ScalarValue::Boolean(true)),
                ScalarValue::Utf8(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(ScalarValue::Boolean(true)),
                    "false" => Ok(ScalarValue::Boolean(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            DataType::Utf8 => Ok(ScalarValue::Utf8(self.to_string())),
            _ => Err(mismatch()),
        }
    }

    /// Extract a value from an Arrow array at the given index.
    pub fn from_array(array: &ArrayRef, idx: usize) -> TabulaResult<Self> {
        if array.is_null(idx) {
            return Ok(ScalarValue::Null);
        }
        let value = match array.data_type() {
            DataType::Null => ScalarValue::Null,
            DataType::Int32 => ScalarValue::Int64(i64::from(array.as_primitive::<Int32Type>().value(idx))),
            DataType::Int64 => ScalarValue::Int64(array.as_primitive::<Int64Type>().value(idx)),
            DataType::Float32 => {
                ScalarValue::Float64(f64::from(array.as_primitive::<Float32Type>().value(idx)))
            }
            DataType::Float64 => ScalarValue::Float64(array.as_primitive::<Float64Type>().value(idx)),
            DataType::Boolean => ScalarValue::Boolean(array.as_boolean().value(idx)),
            DataType::Utf8 => ScalarValue::Utf8(array.as_string::<i32>().value(idx).to_string()),
            DataType::LargeUtf8 => ScalarValue::Utf8(array.as_string::<i64>().value(idx).to_string()),
            _ => ScalarValue::Utf8(arrow::util::display::array_value_to_string(array.as_ref(), idx)?),
        };
        Ok(value)
    }

    /// Convert a SQLite cell into a value.
    pub fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => ScalarValue::Null,
            ValueRef::Integer(i) => ScalarValue::Int64(i),
            ValueRef::Real(f) => ScalarValue::Float64(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                ScalarValue::Utf8(String::from_utf8_lossy(t).into_owned())
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(s) => write!(f, "{s}"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::List(_) => write!(f, "{}", self.to_json()),
        }
    }
}

// Floats compare by bit pattern so values can key hash maps.
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => true,
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a == b,
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.to_bits() == b.to_bits(),
            (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a == b,
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a == b,
            (ScalarValue::List(a), ScalarValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Int64(v) => v.hash(state),
            ScalarValue::Float64(v) => v.to_bits().hash(state),
            ScalarValue::Utf8(s) => s.hash(state),
            ScalarValue::Boolean(b) => b.hash(state),
            ScalarValue::List(items) => items.hash(state),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ScalarValue::Null)
    }
}

impl ToSql for ScalarValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            ScalarValue::Null => SqlValue::Null,
            ScalarValue::Int64(v) => SqlValue::Integer(*v),
            ScalarValue::Float64(v) => SqlValue::Real(*v),
            ScalarValue::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            ScalarValue::Utf8(s) => SqlValue::Text(s.clone()),
            ScalarValue::List(_) => SqlValue::Text(self.to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}
