//! Configuration — explicit settings threaded into backends and projects.
//!
//! A project's `config.toml` looks like:
//!
//! ```toml
//! [project]
//! name = "sample"
//!
//! [database]
//! backend = "PARQUET_VERSIONED"
//! data_folder = "data"
//! backup_policy = "TIMESTAMPED_COPIES"
//! ```
//!
//! Every `database` key is optional; missing keys take the defaults below.

use crate::error::TabulaResult;
use crate::schema::resolver::DEFAULT_SCHEMA_TTL;
use crate::storage::compression::CompressionAlgorithm;
use crate::storage::{BackendKind, BackupPolicy, WritePolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Storage settings for one backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Data folder, relative to the project folder.
    pub data_folder: String,
    pub backup_policy: BackupPolicy,
    pub write_policy: WritePolicy,
    /// Staleness window of the schema cache.
    pub schema_cache_ttl_secs: u64,
    /// Parquet codec (ignored by the SQLite backend).
    pub compression: CompressionAlgorithm,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_folder: "data".to_string(),
            backup_policy: BackupPolicy::default(),
            write_policy: WritePolicy::default(),
            schema_cache_ttl_secs: DEFAULT_SCHEMA_TTL.as_secs(),
            compression: CompressionAlgorithm::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn with_backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = policy;
        self
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_schema_cache_ttl(mut self, ttl: Duration) -> Self {
        self.schema_cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub name: String,
}

/// Contents of `<project>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    pub database: StoreConfig,
}

impl ProjectConfig {
    /// Defaults for a project called `name`.
    pub fn for_project(name: &str) -> Self {
        Self {
            project: ProjectSection {
                name: name.to_string(),
            },
            database: StoreConfig::default(),
        }
    }

    /// Load `path`, filling missing keys from [`ProjectConfig::for_project`].
    /// A missing file yields the defaults.
    pub fn load(path: &Path, name: &str) -> TabulaResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::for_project(name)),
            Err(e) => return Err(e.into()),
        };
        let mut config: ProjectConfig = toml::from_str(&text)?;
        if config.project.name.is_empty() {
            config.project.name = name.to_string();
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> TabulaResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, BackendKind::Parquet);
        assert_eq!(config.data_folder, "data");
        assert_eq!(config.backup_policy, BackupPolicy::None);
        assert_eq!(config.write_policy, WritePolicy::Upsert);
        assert_eq!(config.schema_cache_ttl(), Duration::from_secs(10));
        assert_eq!(config.compression, CompressionAlgorithm::Snappy);
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[database]\nbackend = \"SQLITE\"\n").unwrap();
        let config = ProjectConfig::load(&path, "demo").unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.database.backend, BackendKind::Sqlite);
        assert_eq!(config.database.data_folder, "data");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = ProjectConfig::load(&tmp.path().join("config.toml"), "demo").unwrap();
        assert_eq!(config, ProjectConfig::for_project("demo"));
    }

    #[test]
    fn unknown_backend_in_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[database]\nbackend = \"ORACLE\"\n").unwrap();
        assert!(ProjectConfig::load(&path, "demo").is_err());
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = ProjectConfig::for_project("demo");
        config.database = StoreConfig::new(BackendKind::ParquetVersioned)
            .with_backup_policy(BackupPolicy::TimestampedCopies)
            .with_compression(CompressionAlgorithm::Zstd);
        config.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"PARQUET_VERSIONED\""));
        assert!(text.contains("\"TIMESTAMPED_COPIES\""));
        assert_eq!(ProjectConfig::load(&path, "demo").unwrap(), config);
    }
}
