//! Columnar Store — one Parquet file per table, no history.
//!
//! # Commit sequence
//!
//! ```text
//! commit_table(table, frame)
//!   ├─ table name must round-trip through the file suffix
//!   ├─ empty frame            → no-op
//!   ├─ resolve primary key    → must be present in frame
//!   ├─ file exists?
//!   │    ├─ yes: backup → read old → cast incoming → merge (write policy)
//!   │    └─ no:  pad declared columns → cast to declared types → merge with nothing
//!   ├─ pad declared columns, resolve physical types
//!   └─ write temp file + rename (metadata stamped)
//! ```
//!
//! The merge step is a [`TableMerge`] so the versioned store can reuse the
//! whole sequence with its own rules.

use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::schema::SchemaResolver;
use crate::schema::resolver::DEFAULT_SCHEMA_TTL;
use crate::storage::backup::BackupManager;
use crate::storage::compression::CompressionAlgorithm;
use crate::storage::parquet_io::{ParquetReader, ParquetWriter};
use crate::storage::{
    BackendKind, BackupPolicy, DatabaseMetadata, StorageBackend, WritePolicy, check_primary_key_present,
    columnar, query,
};
use crate::value::ScalarValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// On-disk format version of the Parquet backends.
pub const PARQUET_FORMAT_VERSION: &str = "1.0.0";

/// Every file suffix used by columnar backends, longest first.
const COLUMNAR_SUFFIXES: &[&str] = &["ver.parquet", "parquet"];

/// Rules for combining incoming rows with a table's stored rows.
pub trait TableMerge: Send + Sync {
    /// Rows to write when the table does not exist yet.
    fn new_rows(
        &self,
        incoming: Frame,
        primary_key: Option<&str>,
        policy: WritePolicy,
    ) -> TabulaResult<Frame> {
        let empty = Frame::new(incoming.columns().to_vec());
        self.merge(incoming, empty, primary_key, policy)
    }

    /// Rows to write when `existing` is already stored.
    ///
    /// `primary_key` is `None` when the table declares none, in which case
    /// rows must accumulate regardless of `policy`.
    fn merge(
        &self,
        incoming: Frame,
        existing: Frame,
        primary_key: Option<&str>,
        policy: WritePolicy,
    ) -> TabulaResult<Frame>;
}

/// Physical replace/append semantics of the unversioned store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMerge;

impl TableMerge for PlainMerge {
    fn merge(
        &self,
        incoming: Frame,
        existing: Frame,
        primary_key: Option<&str>,
        policy: WritePolicy,
    ) -> TabulaResult<Frame> {
        let Some(key) = primary_key else {
            return Ok(existing.concat(incoming));
        };
        let incoming_keys = key_column(&incoming, key)?;
        match policy {
            WritePolicy::Append => {
                // Stored keys win; among incoming duplicates the first wins.
                let mut seen: HashSet<ScalarValue> = key_column(&existing, key)
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                let keep: Vec<usize> = incoming_keys
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, k)| seen.insert(k).then_some(i))
                    .collect();
                Ok(existing.concat(incoming.take(&keep)))
            }
            WritePolicy::Upsert => {
                // Incoming rows replace stored ones; among incoming duplicates
                // the last wins.
                let last = last_occurrences(&incoming_keys);
                let replaced: HashSet<&ScalarValue> = incoming_keys.iter().collect();
                let mut kept = existing;
                if let Some(idx) = kept.column_index(key) {
                    kept.retain_rows(|row| !replaced.contains(&row[idx]));
                }
                Ok(kept.concat(incoming.take(&last)))
            }
        }
    }
}

/// Values of the key column, or a validation error naming it.
pub(crate) fn key_column(frame: &Frame, key: &str) -> TabulaResult<Vec<ScalarValue>> {
    frame.column(key).ok_or_else(|| {
        TabulaError::Validation(format!("primary key '{key}' not found in columns"))
    })
}

/// Indices of the last occurrence of each key, in row order.
fn last_occurrences(keys: &[ScalarValue]) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut keep: Vec<usize> = keys
        .iter()
        .enumerate()
        .rev()
        .filter_map(|(i, k)| seen.insert(k).then_some(i))
        .collect();
    keep.reverse();
    keep
}

/// Unversioned Parquet backend: `<data>/<table>.parquet`.
pub struct ParquetStore {
    kind: BackendKind,
    data_folder: PathBuf,
    suffix: &'static str,
    schemas: SchemaResolver,
    write_policy: WritePolicy,
    backups: BackupManager,
    compression: CompressionAlgorithm,
}

impl ParquetStore {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        Self::with_layout(BackendKind::Parquet, data_folder.into(), "parquet")
    }

    pub(crate) fn with_layout(kind: BackendKind, data_folder: PathBuf, suffix: &'static str) -> Self {
        let schemas = SchemaResolver::for_data_folder(&data_folder, DEFAULT_SCHEMA_TTL);
        let backups = BackupManager::new(&data_folder, BackupPolicy::default());
        Self {
            kind,
            data_folder,
            suffix,
            schemas,
            write_policy: WritePolicy::default(),
            backups,
            compression: CompressionAlgorithm::default(),
        }
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_schema_ttl(mut self, ttl: Duration) -> Self {
        self.schemas = SchemaResolver::for_data_folder(&self.data_folder, ttl);
        self
    }

    pub fn compression(&self) -> CompressionAlgorithm {
        self.compression
    }

    pub fn suffix(&self) -> &str {
        self.suffix
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.data_folder.join(format!("{table}.{}", self.suffix))
    }

    /// Physical rows of `table`, exactly as stored.
    pub fn read_physical(&self, table: &str) -> TabulaResult<Frame> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(TabulaError::TableNotFound(table.to_string()));
        }
        let contents = ParquetReader::read(&path)?;
        columnar::from_record_batches(&contents.schema, &contents.batches)
    }

    /// Run the full commit sequence with `rules` deciding the merged rows.
    pub fn write_table(&self, table: &str, frame: &Frame, rules: &dyn TableMerge) -> TabulaResult<()> {
        self.check_table_name(table)?;
        if frame.is_empty() {
            debug!(table, "empty commit, nothing to write");
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_folder)?;

        let declared = self.schemas.get_table_schema(table)?;
        let primary_key = declared.primary_key(table)?;
        check_primary_key_present(table, primary_key, frame)?;

        let path = self.table_path(table);
        let (mut merged, stored_schema) = if path.exists() {
            self.backups.backup(&path, table, self.suffix)?;
            let contents = ParquetReader::read(&path)?;
            let existing = columnar::from_record_batches(&contents.schema, &contents.batches)?;
            let incoming = columnar::cast_frame(frame, &contents.schema)?;
            let merged = rules.merge(incoming, existing, primary_key, self.write_policy)?;
            (merged, Some(contents.schema))
        } else {
            let mut incoming = frame.clone();
            for name in declared.column_names() {
                incoming.ensure_column(name);
            }
            // Keys compare on the types they will be stored as.
            let target = columnar::resolve_schema(&incoming, None, &declared);
            let incoming = columnar::cast_frame(&incoming, &target)?;
            (rules.new_rows(incoming, primary_key, self.write_policy)?, None)
        };

        for name in declared.column_names() {
            merged.ensure_column(name);
        }

        let schema = columnar::resolve_schema(&merged, stored_schema.as_deref(), &declared);
        let batch = columnar::to_record_batch(&merged, Arc::new(schema))?;
        ParquetWriter::write_atomic(&path, &batch, &self.db_metadata(), self.compression)?;

        info!(
            table,
            incoming = frame.num_rows(),
            stored = merged.num_rows(),
            policy = %self.write_policy,
            "committed table"
        );
        Ok(())
    }

    /// A table name must map to a file this store lists back under the same
    /// name (`x.ver` in the plain store would land in `x.ver.parquet`).
    fn check_table_name(&self, table: &str) -> TabulaResult<()> {
        let file_name = format!("{table}.{}", self.suffix);
        if table.contains(['/', '\\']) || self.owns_file(&file_name).as_deref() != Some(table) {
            return Err(TabulaError::Validation(format!(
                "table name '{table}' cannot be stored by the {} backend",
                self.kind
            )));
        }
        Ok(())
    }

    fn owns_file(&self, file_name: &str) -> Option<String> {
        let suffix = COLUMNAR_SUFFIXES
            .iter()
            .find(|s| file_name.ends_with(&format!(".{s}")))?;
        if *suffix != self.suffix {
            return None;
        }
        let stem = &file_name[..file_name.len() - suffix.len() - 1];
        (!stem.is_empty()).then(|| stem.to_string())
    }
}

impl StorageBackend for ParquetStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn db_metadata(&self) -> DatabaseMetadata {
        DatabaseMetadata::now(PARQUET_FORMAT_VERSION)
    }

    fn table_metadata(&self, table: &str) -> TabulaResult<Option<DatabaseMetadata>> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(None);
        }
        ParquetReader::read_metadata(&path)
    }

    fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    fn schemas(&self) -> &SchemaResolver {
        &self.schemas
    }

    fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    fn set_write_policy(&mut self, policy: WritePolicy) {
        self.write_policy = policy;
    }

    fn backup_policy(&self) -> BackupPolicy {
        self.backups.policy()
    }

    fn set_backup_policy(&mut self, policy: BackupPolicy) {
        self.backups.set_policy(policy);
    }

    fn get_tables_list(&self) -> TabulaResult<Vec<String>> {
        if !self.data_folder.is_dir() {
            return Ok(Vec::new());
        }
        let mut tables = Vec::new();
        for entry in std::fs::read_dir(&self.data_folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(table) = self.owns_file(&entry.file_name().to_string_lossy()) {
                tables.push(table);
            }
        }
        tables.sort();
        Ok(tables)
    }

    fn read_table(&self, table: &str) -> TabulaResult<Frame> {
        self.read_physical(table)
    }

    fn read_table_column(&self, table: &str, column: &str) -> TabulaResult<Vec<ScalarValue>> {
        self.read_table(table)?
            .column(column)
            .ok_or_else(|| TabulaError::column_not_found(table, column))
    }

    #[instrument(skip(self, frame), fields(rows = frame.num_rows()))]
    fn commit_table(&self, table: &str, frame: &Frame) -> TabulaResult<()> {
        self.write_table(table, frame, &PlainMerge)
    }

    fn sql_query(&self, sql: &str, table: &str) -> TabulaResult<Frame> {
        query::query_frame(&self.read_table(table)?, table, sql)
    }
}

impl std::fmt::Debug for ParquetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetStore")
            .field("kind", &self.kind)
            .field("data_folder", &self.data_folder)
            .field("write_policy", &self.write_policy)
            .field("backup_policy", &self.backups.policy())
            .field("compression", &self.compression)
            .finish()
    }
}
