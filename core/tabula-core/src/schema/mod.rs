//! Table schemas — JSON-Schema-like documents describing a table's columns.
//!
//! A schema file lives at `<project>/schemas/<table>.schema.json` and looks like:
//!
//! ```json
//! {
//!   "properties": {
//!     "id":   {"type": "integer", "PrimaryKey": true},
//!     "name": {"type": ["string", "null"]},
//!     "tags": {"type": "array"}
//!   }
//! }
//! ```
//!
//! Property order is preserved and decides the order of padded columns.

pub mod resolver;

pub use resolver::SchemaResolver;

use crate::error::{TabulaError, TabulaResult};
use arrow::datatypes::{DataType, Field, Schema};
use serde_json::Value;
use tracing::warn;

/// JSON types a property may declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
    Other(String),
}

impl JsonType {
    fn parse(name: &str) -> Self {
        match name {
            "string" => JsonType::String,
            "integer" => JsonType::Integer,
            "number" => JsonType::Number,
            "boolean" => JsonType::Boolean,
            "array" => JsonType::Array,
            "object" => JsonType::Object,
            "null" => JsonType::Null,
            other => JsonType::Other(other.to_string()),
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub types: Vec<JsonType>,
    pub format: Option<String>,
    pub enum_values: Option<Vec<Value>>,
    pub primary_key: bool,
    /// Raw property object as found in the document.
    pub props: Value,
}

impl FieldSpec {
    fn from_props(name: &str, props: &Value) -> Self {
        let types = match props.get("type") {
            Some(Value::String(t)) => vec![JsonType::parse(t)],
            Some(Value::Array(ts)) => ts
                .iter()
                .map(|t| match t {
                    Value::String(s) => JsonType::parse(s),
                    Value::Null => JsonType::Null,
                    other => JsonType::Other(other.to_string()),
                })
                .collect(),
            _ => vec![JsonType::String],
        };
        Self {
            name: name.to_string(),
            types,
            format: props.get("format").and_then(Value::as_str).map(str::to_string),
            enum_values: props.get("enum").and_then(Value::as_array).cloned(),
            primary_key: props.get("PrimaryKey").and_then(Value::as_bool).unwrap_or(false),
            props: props.clone(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        field_is_nullable(&self.props)
    }

    /// Physical (Arrow) type for this column.
    ///
    /// The first match wins in the order string, integer, number, boolean,
    /// array; arrays are stored as JSON text.
    pub fn arrow_type(&self) -> DataType {
        let has = |t: JsonType| self.types.contains(&t);
        if has(JsonType::String) {
            DataType::Utf8
        } else if has(JsonType::Integer) {
            DataType::Int64
        } else if has(JsonType::Number) {
            DataType::Float64
        } else if has(JsonType::Boolean) {
            DataType::Boolean
        } else if has(JsonType::Array) {
            DataType::Utf8
        } else {
            warn!(field = %self.name, types = ?self.types, "unrecognised JSON type, storing as text");
            DataType::Utf8
        }
    }

    /// Column type used in SQL DDL for the row store.
    pub fn sql_type(&self) -> &'static str {
        if self.enum_values.is_some() {
            return "TEXT";
        }
        match self.arrow_type() {
            DataType::Int64 => "INTEGER",
            DataType::Float64 => "REAL",
            DataType::Boolean => "BOOLEAN",
            _ => "TEXT",
        }
    }
}

/// Parsed schema document for one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    document: Value,
    fields: Vec<FieldSpec>,
}

impl TableSchema {
    /// Schema with no declared properties ("no constraints known").
    pub fn empty() -> Self {
        Self {
            document: Value::Object(Default::default()),
            fields: Vec::new(),
        }
    }

    /// Parse a schema document. Documents without `properties` are valid and
    /// declare no columns.
    pub fn from_value(document: Value) -> TabulaResult<Self> {
        let fields = match document.get("properties") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(props)) => props
                .iter()
                .map(|(name, p)| FieldSpec::from_props(name, p))
                .collect(),
            Some(_) => {
                return Err(TabulaError::Serialization(
                    "'properties' must be an object".to_string(),
                ));
            }
        };
        Ok(Self { document, fields })
    }

    pub fn from_json_str(text: &str) -> TabulaResult<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// The raw document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// The single field flagged `PrimaryKey`, if any.
    ///
    /// `table` is only used to name the table when more than one field is
    /// flagged.
    pub fn primary_key(&self, table: &str) -> TabulaResult<Option<&str>> {
        let mut keys = self.fields.iter().filter(|f| f.primary_key);
        let first = keys.next();
        if keys.next().is_some() {
            return Err(TabulaError::schema(table, "more than one primary key"));
        }
        Ok(first.map(|f| f.name.as_str()))
    }

    /// Arrow schema for the declared columns, in declaration order.
    pub fn to_arrow_schema(&self) -> Schema {
        Schema::new(
            self.fields
                .iter()
                .map(|f| Field::new(&f.name, f.arrow_type(), f.is_nullable()))
                .collect::<Vec<_>>(),
        )
    }
}

/// Whether a property object allows nulls: `nullable: true`, or `null` in
/// its `type` list, or `null` in its `enum` list.
pub fn field_is_nullable(props: &Value) -> bool {
    let as_list = |v: Option<&Value>| -> Vec<Value> {
        match v {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    };
    let admits_null =
        |items: &[Value]| items.iter().any(|v| v.is_null() || v.as_str() == Some("null"));

    props.get("nullable").and_then(Value::as_bool).unwrap_or(false)
        || admits_null(&as_list(props.get("type")))
        || admits_null(&as_list(props.get("enum")))
}
