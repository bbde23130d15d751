//! Schema Resolver — loads schema documents with a short-lived cache.
//!
//! Schemas are read from `<schemas-folder>/<table>.schema.json`. Each lookup
//! is cached per table for `ttl`, so bulk operations do not re-parse the file
//! for every row while external edits still become visible within the window.

use super::TableSchema;
use crate::error::TabulaResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default staleness window for cached schemas.
pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(10);

struct CachedSchema {
    schema: Arc<TableSchema>,
    fetched_at: Instant,
}

pub struct SchemaResolver {
    schemas_folder: PathBuf,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedSchema>>,
}

impl SchemaResolver {
    pub fn new(schemas_folder: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            schemas_folder: schemas_folder.into(),
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver for a backend whose data lives in `data_folder`; schemas sit
    /// in the sibling `schemas` folder.
    pub fn for_data_folder(data_folder: &Path, ttl: Duration) -> Self {
        let project = data_folder.parent().unwrap_or_else(|| Path::new(""));
        Self::new(project.join("schemas"), ttl)
    }

    pub fn schemas_folder(&self) -> &Path {
        &self.schemas_folder
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.schemas_folder.join(format!("{table}.schema.json"))
    }

    /// Schema for `table`; an empty schema when no file exists.
    pub fn get_table_schema(&self, table: &str) -> TabulaResult<Arc<TableSchema>> {
        if let Some(cached) = self.cache.lock().get(table)
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&cached.schema));
        }

        let schema = Arc::new(self.load(table)?);
        self.cache.lock().insert(
            table.to_string(),
            CachedSchema {
                schema: Arc::clone(&schema),
                fetched_at: Instant::now(),
            },
        );
        Ok(schema)
    }

    /// Name of the primary key field of `table`, if one is declared.
    pub fn get_primary_key(&self, table: &str) -> TabulaResult<Option<String>> {
        let schema = self.get_table_schema(table)?;
        Ok(schema.primary_key(table)?.map(str::to_string))
    }

    /// Drop the cached schema for `table`.
    pub fn invalidate(&self, table: &str) {
        self.cache.lock().remove(table);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn load(&self, table: &str) -> TabulaResult<TableSchema> {
        let path = self.schema_path(table);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(table, path = %path.display(), "loaded schema");
                TableSchema::from_json_str(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TableSchema::empty()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for SchemaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaResolver")
            .field("schemas_folder", &self.schemas_folder)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabulaError;
    use tempfile::TempDir;

    fn write_schema(dir: &Path, table: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{table}.schema.json")), body).unwrap();
    }

    #[test]
    fn missing_schema_is_empty() {
        let tmp = TempDir::new().unwrap();
        let resolver = SchemaResolver::new(tmp.path(), DEFAULT_SCHEMA_TTL);
        let schema = resolver.get_table_schema("non_existent_table").unwrap();
        assert!(schema.is_empty());
        assert_eq!(resolver.get_primary_key("non_existent_table").unwrap(), None);
    }

    #[test]
    fn schemas_folder_is_sibling_of_data() {
        let resolver =
            SchemaResolver::for_data_folder(Path::new("/projects/p1/data"), DEFAULT_SCHEMA_TTL);
        assert_eq!(resolver.schemas_folder(), Path::new("/projects/p1/schemas"));
    }

    #[test]
    fn primary_key_resolved_from_file() {
        let tmp = TempDir::new().unwrap();
        write_schema(
            tmp.path(),
            "table1",
            r#"{"properties": {"col1": {"type": "integer", "PrimaryKey": true}, "col2": {"type": "number"}}}"#,
        );
        let resolver = SchemaResolver::new(tmp.path(), DEFAULT_SCHEMA_TTL);
        assert_eq!(resolver.get_primary_key("table1").unwrap().as_deref(), Some("col1"));
    }

    #[test]
    fn two_primary_keys_fail_at_resolution() {
        let tmp = TempDir::new().unwrap();
        write_schema(
            tmp.path(),
            "table1",
            r#"{"properties": {"a": {"PrimaryKey": true}, "b": {"PrimaryKey": true}}}"#,
        );
        let resolver = SchemaResolver::new(tmp.path(), DEFAULT_SCHEMA_TTL);
        // Loading the document itself is fine
        assert_eq!(resolver.get_table_schema("table1").unwrap().fields().len(), 2);
        assert!(matches!(
            resolver.get_primary_key("table1"),
            Err(TabulaError::Schema { .. })
        ));
    }

    #[test]
    fn malformed_schema_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_schema(tmp.path(), "bad", "{not json");
        let resolver = SchemaResolver::new(tmp.path(), DEFAULT_SCHEMA_TTL);
        assert!(matches!(
            resolver.get_table_schema("bad"),
            Err(TabulaError::Serialization(_))
        ));
    }

    #[test]
    fn cached_within_ttl_until_invalidated() {
        let tmp = TempDir::new().unwrap();
        write_schema(tmp.path(), "t", r#"{"properties": {"a": {"type": "string"}}}"#);
        let resolver = SchemaResolver::new(tmp.path(), Duration::from_secs(3600));
        assert_eq!(resolver.get_table_schema("t").unwrap().fields().len(), 1);

        write_schema(
            tmp.path(),
            "t",
            r#"{"properties": {"a": {"type": "string"}, "b": {"type": "integer"}}}"#,
        );
        // Stale read inside the window
        assert_eq!(resolver.get_table_schema("t").unwrap().fields().len(), 1);

        resolver.invalidate("t");
        assert_eq!(resolver.get_table_schema("t").unwrap().fields().len(), 2);
    }

    #[test]
    fn zero_ttl_always_rereads() {
        let tmp = TempDir::new().unwrap();
        write_schema(tmp.path(), "t", r#"{"properties": {}}"#);
        let resolver = SchemaResolver::new(tmp.path(), Duration::ZERO);
        assert!(resolver.get_table_schema("t").unwrap().is_empty());

        write_schema(tmp.path(), "t", r#"{"properties": {"a": {"PrimaryKey": true}}}"#);
        assert_eq!(resolver.get_primary_key("t").unwrap().as_deref(), Some("a"));
    }
}
