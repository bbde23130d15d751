//! Versioned Columnar Store — per-key history in `<data>/<table>.ver.parquet`.
//!
//! Every physical row carries three reserved columns:
//!
//! | Column      | Type    | Meaning                                        |
//! |-------------|---------|------------------------------------------------|
//! | `_version`  | Int64   | 1, 2, 3, … per primary-key value                |
//! | `_deleted`  | Boolean | soft-delete marker                             |
//! | `_metadata` | Utf8    | JSON object, at least `{"timestamp": "…"}`     |
//!
//! History is never rewritten. Reads reconstruct the logical table: for each
//! key the row with the highest `_version` is current, and the key is hidden
//! when that row is soft-deleted. `(key, _version)` is unique in storage.

use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::schema::SchemaResolver;
use crate::storage::compression::CompressionAlgorithm;
use crate::storage::parquet::{ParquetStore, TableMerge, key_column};
use crate::storage::{
    BackendKind, BackupPolicy, DatabaseMetadata, StorageBackend, WritePolicy, now_timestamp, query,
};
use crate::value::ScalarValue;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

pub const VERSION_COLUMN: &str = "_version";
pub const DELETED_COLUMN: &str = "_deleted";
pub const METADATA_COLUMN: &str = "_metadata";

/// Reserved columns, in the order they are appended to new rows.
pub const METADATA_COLUMNS: [&str; 3] = [VERSION_COLUMN, DELETED_COLUMN, METADATA_COLUMN];

/// `_metadata` payload for rows written now.
pub fn row_metadata() -> String {
    serde_json::json!({ "timestamp": now_timestamp() }).to_string()
}

/// Latest physical state of one key.
#[derive(Debug, Clone)]
struct KeyState {
    version: i64,
    row: usize,
    deleted: bool,
}

/// Highest-version row per key, scanning in physical order.
fn latest_by_key(frame: &Frame, key: &str) -> TabulaResult<HashMap<ScalarValue, KeyState>> {
    let key_idx = frame
        .column_index(key)
        .ok_or_else(|| TabulaError::Storage(format!("stored table lacks primary key column '{key}'")))?;
    let version_idx = frame.column_index(VERSION_COLUMN);
    let deleted_idx = frame.column_index(DELETED_COLUMN);

    let mut latest: HashMap<ScalarValue, KeyState> = HashMap::new();
    for (row, values) in frame.rows().iter().enumerate() {
        let version = version_idx.and_then(|i| values[i].as_i64()).unwrap_or(0);
        let deleted = deleted_idx.and_then(|i| values[i].as_bool()).unwrap_or(false);
        let state = KeyState { version, row, deleted };
        latest
            .entry(values[key_idx].clone())
            .and_modify(|s| {
                if version >= s.version {
                    *s = state.clone();
                }
            })
            .or_insert(state);
    }
    Ok(latest)
}

/// Collapse physical history into the logical table.
///
/// Rows keep their physical order. Without a primary key only soft-deleted
/// rows are dropped.
pub fn reconstruct(mut physical: Frame, primary_key: Option<&str>) -> TabulaResult<Frame> {
    match primary_key {
        Some(key) => {
            let mut visible: Vec<usize> = latest_by_key(&physical, key)?
                .into_values()
                .filter(|s| !s.deleted)
                .map(|s| s.row)
                .collect();
            visible.sort_unstable();
            physical = physical.take(&visible);
        }
        None => {
            if let Some(idx) = physical.column_index(DELETED_COLUMN) {
                physical.retain_rows(|row| row[idx].as_bool() != Some(true));
            }
        }
    }
    physical.drop_columns(&METADATA_COLUMNS);
    Ok(physical)
}

/// Append `rows` of `incoming` to `existing`, each stamped with its version.
fn append_stamped(
    existing: Frame,
    incoming: &Frame,
    rows: &[(usize, i64)],
    deleted: bool,
) -> TabulaResult<Frame> {
    let mut columns = incoming.columns().to_vec();
    columns.extend(METADATA_COLUMNS.iter().map(|c| c.to_string()));
    let metadata = row_metadata();

    let stamped_rows = rows
        .iter()
        .map(|&(idx, version)| {
            let mut row = incoming.rows()[idx].clone();
            row.push(ScalarValue::Int64(version));
            row.push(ScalarValue::Boolean(deleted));
            row.push(ScalarValue::Utf8(metadata.clone()));
            row
        })
        .collect();
    Ok(existing.concat(Frame::from_rows(columns, stamped_rows)?))
}

/// Versioned append/upsert rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionedMerge;

impl TableMerge for VersionedMerge {
    fn merge(
        &self,
        mut incoming: Frame,
        existing: Frame,
        primary_key: Option<&str>,
        policy: WritePolicy,
    ) -> TabulaResult<Frame> {
        incoming.drop_columns(&METADATA_COLUMNS);

        let Some(key) = primary_key else {
            let all: Vec<(usize, i64)> = (0..incoming.num_rows()).map(|i| (i, 1)).collect();
            return append_stamped(existing, &incoming, &all, false);
        };
        let incoming_keys = key_column(&incoming, key)?;

        match policy {
            WritePolicy::Append => {
                // Any stored version of a key blocks it, deleted or not.
                let mut seen: HashSet<ScalarValue> = existing
                    .column(key)
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                let survivors: Vec<(usize, i64)> = incoming_keys
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, k)| seen.insert(k).then_some((i, 1)))
                    .collect();
                append_stamped(existing, &incoming, &survivors, false)
            }
            WritePolicy::Upsert => {
                let latest = if existing.has_column(key) {
                    latest_by_key(&existing, key)?
                } else {
                    HashMap::new()
                };

                // Current data per key, projected onto the incoming columns;
                // `None` once the latest version is deleted.
                let projection: Vec<Option<usize>> = incoming
                    .columns()
                    .iter()
                    .map(|c| existing.column_index(c))
                    .collect();
                let mut current: HashMap<ScalarValue, (i64, Option<Vec<ScalarValue>>)> = latest
                    .into_iter()
                    .map(|(k, s)| {
                        let data = (!s.deleted).then(|| {
                            projection
                                .iter()
                                .map(|idx| match idx {
                                    Some(i) => existing.rows()[s.row][*i].clone(),
                                    None => ScalarValue::Null,
                                })
                                .collect()
                        });
                        (k, (s.version, data))
                    })
                    .collect();

                let mut stamped = Vec::new();
                for (idx, k) in incoming_keys.into_iter().enumerate() {
                    let row = &incoming.rows()[idx];
                    let version = match current.get(&k) {
                        Some((_, Some(data))) if data == row => {
                            debug!(key = %k, "unchanged row, no new version");
                            continue;
                        }
                        Some((version, _)) => version + 1,
                        None => 1,
                    };
                    current.insert(k, (version, Some(row.clone())));
                    stamped.push((idx, version));
                }
                append_stamped(existing, &incoming, &stamped, false)
            }
        }
    }
}

/// Appends a deleted version for each listed key that is currently visible.
struct SoftDelete;

impl TableMerge for SoftDelete {
    fn merge(
        &self,
        incoming: Frame,
        existing: Frame,
        primary_key: Option<&str>,
        _policy: WritePolicy,
    ) -> TabulaResult<Frame> {
        let Some(key) = primary_key else {
            return Ok(existing);
        };
        let latest = latest_by_key(&existing, key)?;
        let mut data_columns = existing.clone();
        data_columns.drop_columns(&METADATA_COLUMNS);

        let mut tombstones = Vec::new();
        let mut done = HashSet::new();
        for k in key_column(&incoming, key)? {
            if let Some(state) = latest.get(&k)
                && !state.deleted
                && done.insert(k)
            {
                tombstones.push((state.row, state.version + 1));
            }
        }
        append_stamped(existing, &data_columns, &tombstones, true)
    }
}

/// Versioned Parquet backend.
///
/// Wraps [`ParquetStore`] for file layout, backups and atomic writes, and
/// substitutes the versioned merge rules and read-time reconstruction.
#[derive(Debug)]
pub struct VersionedParquetStore {
    inner: ParquetStore,
}

impl VersionedParquetStore {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        Self {
            inner: ParquetStore::with_layout(BackendKind::ParquetVersioned, data_folder.into(), "ver.parquet"),
        }
    }

    pub fn with_compression(self, compression: CompressionAlgorithm) -> Self {
        Self {
            inner: self.inner.with_compression(compression),
        }
    }

    pub fn with_schema_ttl(self, ttl: Duration) -> Self {
        Self {
            inner: self.inner.with_schema_ttl(ttl),
        }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.inner.table_path(table)
    }

    /// Every stored version, including the reserved columns.
    pub fn read_table_history(&self, table: &str) -> TabulaResult<Frame> {
        self.inner.read_physical(table)
    }

    /// Soft-delete `keys`: each currently visible key gets a new version
    /// marked `_deleted`. Unknown or already deleted keys are ignored.
    #[instrument(skip(self, keys), fields(count = keys.len()))]
    pub fn delete_keys(&self, table: &str, keys: &[ScalarValue]) -> TabulaResult<()> {
        let key = self.get_primary_key(table)?.ok_or_else(|| {
            TabulaError::Validation(format!("table '{table}' has no primary key to delete by"))
        })?;
        if !self.table_path(table).exists() {
            return Err(TabulaError::TableNotFound(table.to_string()));
        }
        let frame = Frame::from_columns([(key, keys.to_vec())])?;
        self.inner.write_table(table, &frame, &SoftDelete)
    }
}

impl StorageBackend for VersionedParquetStore {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn db_metadata(&self) -> DatabaseMetadata {
        self.inner.db_metadata()
    }

    fn table_metadata(&self, table: &str) -> TabulaResult<Option<DatabaseMetadata>> {
        self.inner.table_metadata(table)
    }

    fn data_folder(&self) -> &Path {
        self.inner.data_folder()
    }

    fn schemas(&self) -> &SchemaResolver {
        self.inner.schemas()
    }

    fn write_policy(&self) -> WritePolicy {
        self.inner.write_policy()
    }

    fn set_write_policy(&mut self, policy: WritePolicy) {
        self.inner.set_write_policy(policy);
    }

    fn backup_policy(&self) -> BackupPolicy {
        self.inner.backup_policy()
    }

    fn set_backup_policy(&mut self, policy: BackupPolicy) {
        self.inner.set_backup_policy(policy);
    }

    fn get_tables_list(&self) -> TabulaResult<Vec<String>> {
        self.inner.get_tables_list()
    }

    fn read_table(&self, table: &str) -> TabulaResult<Frame> {
        let physical = self.inner.read_physical(table)?;
        let primary_key = self.get_primary_key(table)?;
        reconstruct(physical, primary_key.as_deref())
    }

    fn read_table_column(&self, table: &str, column: &str) -> TabulaResult<Vec<ScalarValue>> {
        self.read_table(table)?
            .column(column)
            .ok_or_else(|| TabulaError::column_not_found(table, column))
    }

    #[instrument(skip(self, frame), fields(rows = frame.num_rows()))]
    fn commit_table(&self, table: &str, frame: &Frame) -> TabulaResult<()> {
        self.inner.write_table(table, frame, &VersionedMerge)
    }

    fn sql_query(&self, sql: &str, table: &str) -> TabulaResult<Frame> {
        query::query_frame(&self.read_table(table)?, table, sql)
    }
}
