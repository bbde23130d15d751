//! Database Constructors — factory methods for creating backends

use crate::config::StoreConfig;
use crate::engine::Database;
use crate::error::TabulaResult;
use crate::storage::parquet::ParquetStore;
use crate::storage::sqlite::SqliteStore;
use crate::storage::versioned::VersionedParquetStore;
use crate::storage::{BackendKind, StorageBackend};
use std::path::Path;
use tracing::{info, instrument};

impl Database {
    /// Backend of `kind` storing its tables under `data_folder`, with default
    /// policies (UPSERT, no backups).
    #[instrument(skip(data_folder))]
    pub fn create(kind: BackendKind, data_folder: impl AsRef<Path>) -> Box<dyn StorageBackend> {
        let data_folder = data_folder.as_ref();
        info!("Creating {} backend at {:?}", kind, data_folder);
        match kind {
            BackendKind::Parquet => Box::new(ParquetStore::new(data_folder)),
            BackendKind::ParquetVersioned => Box::new(VersionedParquetStore::new(data_folder)),
            BackendKind::Sqlite => Box::new(SqliteStore::new(data_folder)),
        }
    }

    /// Backend configured from `config`. `data_folder` is the resolved data
    /// folder; `config.data_folder` is not consulted here.
    #[instrument(skip(config, data_folder), fields(backend = %config.backend))]
    pub fn with_config(config: &StoreConfig, data_folder: impl AsRef<Path>) -> Box<dyn StorageBackend> {
        let data_folder = data_folder.as_ref();
        let ttl = config.schema_cache_ttl();
        let mut backend: Box<dyn StorageBackend> = match config.backend {
            BackendKind::Parquet => Box::new(
                ParquetStore::new(data_folder)
                    .with_compression(config.compression)
                    .with_schema_ttl(ttl),
            ),
            BackendKind::ParquetVersioned => Box::new(
                VersionedParquetStore::new(data_folder)
                    .with_compression(config.compression)
                    .with_schema_ttl(ttl),
            ),
            BackendKind::Sqlite => Box::new(SqliteStore::new(data_folder).with_schema_ttl(ttl)),
        };
        backend.set_write_policy(config.write_policy);
        backend.set_backup_policy(config.backup_policy);
        info!(
            "Created {} backend at {:?} (write={}, backup={})",
            config.backend, data_folder, config.write_policy, config.backup_policy
        );
        backend
    }

    /// Backend named by a text identifier (`"parquet"`, `"parquet_versioned"`,
    /// `"sqlite"`, case-insensitive). Unknown names are a `Config` error
    /// naming the value.
    pub fn create_named(name: &str, data_folder: impl AsRef<Path>) -> TabulaResult<Box<dyn StorageBackend>> {
        let kind: BackendKind = name.parse()?;
        Ok(Self::create(kind, data_folder))
    }
}
