//! Error types for the Tabula storage engine.
//!
//! All public APIs return `TabulaResult<T>` — no panics in library code.

use thiserror::Error;

/// Unified error type for all Tabula operations.
#[derive(Debug, Error)]
pub enum TabulaError {
    /// Unsupported backend identifier or unrecognized policy value
    #[error("configuration error: {0}")]
    Config(String),

    /// Schema document violates a structural rule (e.g. two primary keys)
    #[error("schema error in table '{table}': {message}")]
    Schema { table: String, message: String },

    /// Incoming data does not satisfy the write contract
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested table does not exist
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Requested column does not exist in the table
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Requested project folder does not exist
    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    /// A value cannot be stored in the physical column type
    #[error("type mismatch in column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// Storage layer error (corruption, unexpected layout, etc.)
    #[error("storage error: {0}")]
    Storage(String),

    /// Ad-hoc query could not be parsed
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// Ad-hoc query attempted something other than a read
    #[error("query is not read-only: {0}")]
    ReadOnlyQuery(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Apache Arrow error (RecordBatch operations)
    #[error("arrow error: {source}")]
    Arrow {
        #[from]
        source: arrow::error::ArrowError,
    },

    /// Apache Parquet error (file I/O)
    #[error("parquet error: {source}")]
    Parquet {
        #[from]
        source: parquet::errors::ParquetError,
    },

    /// SQLite error (row store and query materialization)
    #[error("sqlite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result type alias for all Tabula operations.
pub type TabulaResult<T> = Result<T, TabulaError>;

impl From<serde_json::Error> for TabulaError {
    fn from(err: serde_json::Error) -> Self {
        TabulaError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TabulaError {
    fn from(err: toml::de::Error) -> Self {
        TabulaError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for TabulaError {
    fn from(err: toml::ser::Error) -> Self {
        TabulaError::Serialization(err.to_string())
    }
}

impl TabulaError {
    pub(crate) fn schema(table: &str, message: impl Into<String>) -> Self {
        TabulaError::Schema {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn column_not_found(table: &str, column: &str) -> Self {
        TabulaError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_config() {
        let err = TabulaError::Config("backend 'mongo' not supported".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: backend 'mongo' not supported"
        );
    }

    #[test]
    fn error_display_table_not_found() {
        let err = TabulaError::TableNotFound("cases".to_string());
        assert_eq!(err.to_string(), "table 'cases' not found");
    }

    #[test]
    fn error_display_schema_names_table() {
        let err = TabulaError::schema("cases", "more than one primary key");
        assert_eq!(
            err.to_string(),
            "schema error in table 'cases': more than one primary key"
        );
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = TabulaError::TypeMismatch {
            column: "age".to_string(),
            expected: "Int64".to_string(),
            actual: "Utf8(\"ten\")".to_string(),
        };
        assert!(err.to_string().contains("'age'"));
        assert!(err.to_string().contains("expected Int64"));
    }

    #[test]
    fn error_display_sql_parse() {
        let err = TabulaError::SqlParse {
            message: "unexpected token".to_string(),
            sql: "SELECT * FORM cases".to_string(),
        };
        assert!(err.to_string().contains("SQL parse error"));
        assert!(err.to_string().contains("FORM cases"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TabulaError = io.into();
        assert!(matches!(err, TabulaError::Io { .. }));
    }

    #[test]
    fn serde_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: TabulaError = bad.unwrap_err().into();
        assert!(matches!(err, TabulaError::Serialization(_)));
    }

    #[test]
    fn toml_error_converts() {
        let bad = toml::from_str::<toml::Table>("backend = ");
        let err: TabulaError = bad.unwrap_err().into();
        assert!(matches!(err, TabulaError::Serialization(_)));
    }
}
