//! Storage module — pluggable table backends.
//!
//! All backends implement the [`StorageBackend`] trait. Callers obtain a
//! boxed backend from [`Database`](crate::engine::Database) and never depend
//! on concrete types.

pub mod backup;
pub mod columnar;
pub mod compression;
pub mod parquet;
pub mod parquet_io;
pub mod query;
pub mod sqlite;
pub mod versioned;

use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::schema::{SchemaResolver, TableSchema};
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Timestamp format stamped into metadata (`2024-01-31T13:45:00`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Available storage engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum BackendKind {
    /// One Parquet file per table, no history.
    #[default]
    Parquet,
    /// One Parquet file per table with per-key version history.
    ParquetVersioned,
    /// One SQLite database per project, one SQL table per dataset.
    Sqlite,
}

impl BackendKind {
    pub const ALL: &'static [BackendKind] = &[
        BackendKind::Parquet,
        BackendKind::ParquetVersioned,
        BackendKind::Sqlite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Parquet => "parquet",
            BackendKind::ParquetVersioned => "parquet_versioned",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" | "default" => Ok(BackendKind::Parquet),
            "parquet_versioned" => Ok(BackendKind::ParquetVersioned),
            "sqlite" => Ok(BackendKind::Sqlite),
            "duckdb" => Err(TabulaError::Config(format!(
                "backend '{s}' is recognized but not implemented; use parquet, parquet_versioned or sqlite"
            ))),
            _ => Err(TabulaError::Config(format!("backend '{s}' not supported"))),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = TabulaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Conflict rule for incoming rows whose primary key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WritePolicy {
    /// Existing rows win; incoming duplicates are dropped.
    Append,
    /// Incoming rows supersede existing rows.
    #[default]
    Upsert,
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::Append => f.write_str("append"),
            WritePolicy::Upsert => f.write_str("upsert"),
        }
    }
}

impl FromStr for WritePolicy {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(WritePolicy::Append),
            "upsert" => Ok(WritePolicy::Upsert),
            _ => Err(TabulaError::Config(format!("write policy '{s}' not recognized"))),
        }
    }
}

/// Whether a pre-write snapshot is kept before mutating a physical artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupPolicy {
    #[default]
    None,
    TimestampedCopies,
}

impl fmt::Display for BackupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupPolicy::None => f.write_str("none"),
            BackupPolicy::TimestampedCopies => f.write_str("timestamped_copies"),
        }
    }
}

impl FromStr for BackupPolicy {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BackupPolicy::None),
            "timestamped_copies" => Ok(BackupPolicy::TimestampedCopies),
            _ => Err(TabulaError::Config(format!("backup policy '{s}' not recognized"))),
        }
    }
}

/// On-disk format version and last successful write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub version: String,
    pub last_updated: String,
}

impl DatabaseMetadata {
    pub const VERSION_KEY: &'static str = "version";
    pub const LAST_UPDATED_KEY: &'static str = "last_updated";

    /// Metadata for a write happening now.
    pub fn now(version: &str) -> Self {
        Self {
            version: version.to_string(),
            last_updated: now_timestamp(),
        }
    }
}

/// Capability set every storage engine provides.
///
/// # Contract
///
/// - `commit_table`: zero-row frames are a no-op. Rows are merged with the
///   stored table according to the write policy, keyed by the schema's
///   primary key; without a primary key rows are appended.
/// - `read_table`: the logical table (reconstructed for versioned stores);
///   `TableNotFound` if it was never written.
/// - `sql_query`: read-only ad-hoc query; the table is visible under its own
///   name.
/// - `get_tables_list`: sorted table names; empty if the data folder does not
///   exist.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Format version and current time, as stamped on the next write.
    fn db_metadata(&self) -> DatabaseMetadata;

    /// Metadata stored with `table`'s physical artifact, if it exists.
    fn table_metadata(&self, table: &str) -> TabulaResult<Option<DatabaseMetadata>>;

    fn data_folder(&self) -> &Path;

    /// Schema lookups used by this backend.
    fn schemas(&self) -> &SchemaResolver;

    fn write_policy(&self) -> WritePolicy;

    fn set_write_policy(&mut self, policy: WritePolicy);

    fn backup_policy(&self) -> BackupPolicy;

    fn set_backup_policy(&mut self, policy: BackupPolicy);

    fn get_tables_list(&self) -> TabulaResult<Vec<String>>;

    fn read_table(&self, table: &str) -> TabulaResult<Frame>;

    fn read_table_column(&self, table: &str, column: &str) -> TabulaResult<Vec<ScalarValue>>;

    fn commit_table(&self, table: &str, frame: &Frame) -> TabulaResult<()>;

    fn sql_query(&self, query: &str, table: &str) -> TabulaResult<Frame>;

    fn get_table_schema(&self, table: &str) -> TabulaResult<Arc<TableSchema>> {
        self.schemas().get_table_schema(table)
    }

    fn get_primary_key(&self, table: &str) -> TabulaResult<Option<String>> {
        self.schemas().get_primary_key(table)
    }

    /// Stored values of `table`'s primary key column; empty without a key.
    fn get_primary_keys(&self, table: &str) -> TabulaResult<Vec<ScalarValue>> {
        match self.get_primary_key(table)? {
            Some(key) => self.read_table_column(table, &key),
            None => Ok(Vec::new()),
        }
    }

    /// Commit several tables. Nothing is written if the counts differ.
    fn commit_tables(&self, tables: &[&str], frames: &[Frame]) -> TabulaResult<()> {
        check_batch_len(tables.len(), frames.len())?;
        for (table, frame) in tables.iter().zip(frames) {
            self.commit_table(table, frame)?;
        }
        Ok(())
    }

    /// Commit several tables given as JSON (dict of columns or list of
    /// records). All datasets are converted before anything is written.
    fn commit_tables_dict(&self, tables: &[&str], datasets: &[serde_json::Value]) -> TabulaResult<()> {
        check_batch_len(tables.len(), datasets.len())?;
        let frames = datasets
            .iter()
            .map(Frame::from_json)
            .collect::<TabulaResult<Vec<_>>>()?;
        self.commit_tables(tables, &frames)
    }
}

fn check_batch_len(tables: usize, datasets: usize) -> TabulaResult<()> {
    if tables != datasets {
        return Err(TabulaError::Validation(format!(
            "length of table names ({tables}) does not match length of datasets ({datasets})"
        )));
    }
    Ok(())
}

/// Require the declared primary key to be present in incoming data.
pub(crate) fn check_primary_key_present(
    table: &str,
    primary_key: Option<&str>,
    frame: &Frame,
) -> TabulaResult<()> {
    match primary_key {
        Some(key) if !frame.has_column(key) => Err(TabulaError::Validation(format!(
            "primary key '{key}' of table '{table}' not found in incoming columns"
        ))),
        _ => Ok(()),
    }
}
