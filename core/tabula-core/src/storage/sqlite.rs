//! Row Store — one SQLite database per project, one SQL table per dataset.
//!
//! Tables are created from the declared schema (`PRIMARY KEY` on the key
//! field) or, without one, from the types of the first committed frame.
//! Conflicts are resolved by SQLite itself:
//!
//! | Policy | Statement                                  |
//! |--------|--------------------------------------------|
//! | APPEND | `INSERT OR IGNORE`                         |
//! | UPSERT | `INSERT … ON CONFLICT(pk) DO UPDATE SET …` |
//! | no key | `INSERT`                                   |
//!
//! A commit runs in one transaction together with the metadata update.

use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::schema::resolver::DEFAULT_SCHEMA_TTL;
use crate::schema::{SchemaResolver, TableSchema};
use crate::storage::backup::BackupManager;
use crate::storage::columnar::infer_data_type;
use crate::storage::query::{self, quote_ident, sql_type_for};
use crate::storage::{
    BackendKind, BackupPolicy, DatabaseMetadata, StorageBackend, WritePolicy, check_primary_key_present,
};
use crate::value::ScalarValue;
use arrow::datatypes::DataType;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// On-disk format version of the SQLite backend.
pub const SQLITE_FORMAT_VERSION: &str = "1.0.0";

/// Key/value table holding [`DatabaseMetadata`].
pub const METADATA_TABLE: &str = "__tabula_metadata";

const DB_STEM: &str = "db";
const DB_SUFFIX: &str = "sqlite";

/// Physical type implied by a declared SQLite column type.
fn data_type_for_sql(decl: &str) -> DataType {
    let decl = decl.to_ascii_uppercase();
    if decl.contains("INT") {
        DataType::Int64
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        DataType::Float64
    } else if decl.contains("BOOL") {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

/// SQLite backend: `<data>/db.sqlite`.
pub struct SqliteStore {
    data_folder: PathBuf,
    db_path: PathBuf,
    schemas: SchemaResolver,
    write_policy: WritePolicy,
    backups: BackupManager,
}

impl SqliteStore {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        let data_folder = data_folder.into();
        Self {
            db_path: data_folder.join(format!("{DB_STEM}.{DB_SUFFIX}")),
            schemas: SchemaResolver::for_data_folder(&data_folder, DEFAULT_SCHEMA_TTL),
            write_policy: WritePolicy::default(),
            backups: BackupManager::new(&data_folder, BackupPolicy::default()),
            data_folder,
        }
    }

    pub fn with_schema_ttl(mut self, ttl: Duration) -> Self {
        self.schemas = SchemaResolver::for_data_folder(&self.data_folder, ttl);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Read-only connection; `None` when the database file does not exist.
    fn open_read(&self) -> TabulaResult<Option<Connection>> {
        if !self.db_path.exists() {
            return Ok(None);
        }
        Ok(Some(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?))
    }

    fn open_table(&self, table: &str) -> TabulaResult<Connection> {
        match self.open_read()? {
            Some(conn) if table_exists(&conn, table)? => Ok(conn),
            _ => Err(TabulaError::TableNotFound(table.to_string())),
        }
    }

    fn create_table(conn: &Connection, table: &str, frame: &Frame, declared: &TableSchema, primary_key: Option<&str>) -> TabulaResult<()> {
        let mut defs: Vec<String> = declared
            .fields()
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), f.sql_type()))
            .collect();
        for (idx, name) in frame.columns().iter().enumerate() {
            if declared.field(name).is_none() {
                let dt = infer_data_type(frame.rows().iter().map(|row| &row[idx]));
                defs.push(format!("{} {}", quote_ident(name), sql_type_for(&dt)));
            }
        }
        if let Some(key) = primary_key {
            defs.push(format!("PRIMARY KEY ({})", quote_ident(key)));
        }
        conn.execute(&format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", ")), [])?;
        info!(table, columns = defs.len(), "created table");
        Ok(())
    }

    fn add_missing_columns(conn: &Connection, table: &str, frame: &Frame, declared: &TableSchema) -> TabulaResult<()> {
        let existing = table_columns(conn, table)?;
        for (idx, name) in frame.columns().iter().enumerate() {
            if existing.iter().any(|(c, _)| c == name) {
                continue;
            }
            let sql_type = match declared.field(name) {
                Some(field) => field.sql_type(),
                None => sql_type_for(&infer_data_type(frame.rows().iter().map(|row| &row[idx]))),
            };
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {sql_type}", quote_ident(table), quote_ident(name)),
                [],
            )?;
            debug!(table, column = %name, sql_type, "added column");
        }
        Ok(())
    }

    fn insert_statement(&self, table: &str, columns: &[String], primary_key: Option<&str>) -> String {
        let names = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let table = quote_ident(table);
        match (primary_key, self.write_policy) {
            (None, _) => format!("INSERT INTO {table} ({names}) VALUES ({placeholders})"),
            (Some(_), WritePolicy::Append) => {
                format!("INSERT OR IGNORE INTO {table} ({names}) VALUES ({placeholders})")
            }
            (Some(key), WritePolicy::Upsert) => {
                let updates: Vec<String> = columns
                    .iter()
                    .filter(|c| c.as_str() != key)
                    .map(|c| format!("{0}=excluded.{0}", quote_ident(c)))
                    .collect();
                let action = if updates.is_empty() {
                    "DO NOTHING".to_string()
                } else {
                    format!("DO UPDATE SET {}", updates.join(", "))
                };
                format!(
                    "INSERT INTO {table} ({names}) VALUES ({placeholders}) ON CONFLICT({}) {action}",
                    quote_ident(key)
                )
            }
        }
    }

    fn write_metadata(conn: &Connection, metadata: &DatabaseMetadata) -> TabulaResult<()> {
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (key TEXT PRIMARY KEY, value TEXT)"),
            [],
        )?;
        let upsert = format!("INSERT OR REPLACE INTO {METADATA_TABLE} (key, value) VALUES (?1, ?2)");
        conn.execute(&upsert, params![DatabaseMetadata::VERSION_KEY, metadata.version])?;
        conn.execute(&upsert, params![DatabaseMetadata::LAST_UPDATED_KEY, metadata.last_updated])?;
        Ok(())
    }

    fn read_metadata(conn: &Connection) -> TabulaResult<Option<DatabaseMetadata>> {
        if !table_exists(conn, METADATA_TABLE)? {
            return Ok(None);
        }
        let lookup = |key: &str| -> TabulaResult<Option<String>> {
            Ok(conn
                .query_row(
                    &format!("SELECT value FROM {METADATA_TABLE} WHERE key = ?1"),
                    [key],
                    |row| row.get(0),
                )
                .optional()?)
        };
        match (
            lookup(DatabaseMetadata::VERSION_KEY)?,
            lookup(DatabaseMetadata::LAST_UPDATED_KEY)?,
        ) {
            (Some(version), Some(last_updated)) => Ok(Some(DatabaseMetadata { version, last_updated })),
            _ => Ok(None),
        }
    }
}

fn table_exists(conn: &Connection, table: &str) -> TabulaResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// `(name, declared type)` of each column of `table`.
fn table_columns(conn: &Connection, table: &str) -> TabulaResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// SQLite has no boolean storage class; restore declared BOOLEAN columns.
fn restore_booleans(conn: &Connection, table: &str, mut frame: Frame) -> TabulaResult<Frame> {
    for (name, decl) in table_columns(conn, table)? {
        if data_type_for_sql(&decl) != DataType::Boolean {
            continue;
        }
        if let Some(values) = frame.column(&name) {
            let restored = values
                .iter()
                .map(|v| v.cast_to(&DataType::Boolean, &name))
                .collect::<TabulaResult<Vec<_>>>()?;
            frame.set_column(&name, restored)?;
        }
    }
    Ok(frame)
}

impl StorageBackend for SqliteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn db_metadata(&self) -> DatabaseMetadata {
        DatabaseMetadata::now(SQLITE_FORMAT_VERSION)
    }

    fn table_metadata(&self, table: &str) -> TabulaResult<Option<DatabaseMetadata>> {
        match self.open_read()? {
            Some(conn) if table_exists(&conn, table)? => Self::read_metadata(&conn),
            _ => Ok(None),
        }
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
        let Some(conn) = self.open_read()? else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' AND name != ?1 ORDER BY name",
        )?;
        let tables = stmt
            .query_map([METADATA_TABLE], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    fn read_table(&self, table: &str) -> TabulaResult<Frame> {
        let conn = self.open_table(table)?;
        let frame = query::run_query(&conn, &format!("SELECT * FROM {}", quote_ident(table)))?;
        restore_booleans(&conn, table, frame)
    }

    fn read_table_column(&self, table: &str, column: &str) -> TabulaResult<Vec<ScalarValue>> {
        let conn = self.open_table(table)?;
        if !table_columns(&conn, table)?.iter().any(|(c, _)| c == column) {
            return Err(TabulaError::column_not_found(table, column));
        }
        let sql = format!("SELECT {} FROM {}", quote_ident(column), quote_ident(table));
        let frame = restore_booleans(&conn, table, query::run_query(&conn, &sql)?)?;
        frame
            .column(column)
            .ok_or_else(|| TabulaError::column_not_found(table, column))
    }

    #[instrument(skip(self, frame), fields(rows = frame.num_rows()))]
    fn commit_table(&self, table: &str, frame: &Frame) -> TabulaResult<()> {
        if frame.is_empty() {
            debug!(table, "empty commit, nothing to write");
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_folder)?;

        let declared = self.schemas.get_table_schema(table)?;
        let primary_key = declared.primary_key(table)?;
        check_primary_key_present(table, primary_key, frame)?;

        let exists = match self.open_read()? {
            Some(conn) => table_exists(&conn, table)?,
            None => false,
        };
        if exists {
            self.backups.backup(&self.db_path, DB_STEM, DB_SUFFIX)?;
        }

        let mut conn = Connection::open(&self.db_path)?;
        let tx = conn.transaction()?;
        if exists {
            Self::add_missing_columns(&tx, table, frame, &declared)?;
        } else {
            Self::create_table(&tx, table, frame, &declared, primary_key)?;
        }

        let targets: Vec<DataType> = {
            let stored = table_columns(&tx, table)?;
            frame
                .columns()
                .iter()
                .map(|c| {
                    stored
                        .iter()
                        .find(|(name, _)| name == c)
                        .map(|(_, decl)| data_type_for_sql(decl))
                        .unwrap_or(DataType::Utf8)
                })
                .collect()
        };
        {
            let mut insert = tx.prepare(&self.insert_statement(table, frame.columns(), primary_key))?;
            for row in frame.rows() {
                let values = row
                    .iter()
                    .zip(&targets)
                    .zip(frame.columns())
                    .map(|((v, dt), name)| v.cast_to(dt, name))
                    .collect::<TabulaResult<Vec<_>>>()?;
                insert.execute(rusqlite::params_from_iter(values.iter()))?;
            }
        }
        Self::write_metadata(&tx, &self.db_metadata())?;
        tx.commit()?;

        info!(table, rows = frame.num_rows(), policy = %self.write_policy, "committed table");
        Ok(())
    }

    fn sql_query(&self, sql: &str, table: &str) -> TabulaResult<Frame> {
        query::ensure_read_only(sql)?;
        let conn = self.open_table(table)?;
        query::run_query(&conn, sql)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("write_policy", &self.write_policy)
            .field("backup_policy", &self.backups.policy())
            .finish()
    }
}
