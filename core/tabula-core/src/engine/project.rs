//! Project — a folder of datasets, schemas and settings with one backend.
//!
//! ```text
//! <projects>/<name>/
//!   config.toml
//!   data/          tables (and backup/)
//!   schemas/       <table>.schema.json
//!   reports/
//!   parsers/
//! ```

use crate::config::{ProjectConfig, StoreConfig};
use crate::engine::Database;
use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::storage::{BackendKind, BackupPolicy, StorageBackend};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_FILE: &str = "config.toml";

pub struct Project {
    name: String,
    folder: PathBuf,
    config: ProjectConfig,
    database: Box<dyn StorageBackend>,
}

impl Project {
    /// Open `<projects_folder>/<name>`; the folder must already exist.
    pub fn open(projects_folder: impl AsRef<Path>, name: &str) -> TabulaResult<Self> {
        let folder = projects_folder.as_ref().join(name);
        if !folder.is_dir() {
            return Err(TabulaError::ProjectNotFound(format!(
                "{name} (in {})",
                projects_folder.as_ref().display()
            )));
        }
        let config = ProjectConfig::load(&folder.join(CONFIG_FILE), name)?;
        let database = Database::with_config(&config.database, folder.join(&config.database.data_folder));
        info!(project = name, backend = %config.database.backend, "opened project");
        Ok(Self {
            name: name.to_string(),
            folder,
            config,
            database,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn database(&self) -> &dyn StorageBackend {
        self.database.as_ref()
    }

    pub fn database_mut(&mut self) -> &mut dyn StorageBackend {
        self.database.as_mut()
    }

    pub fn data_folder(&self) -> PathBuf {
        self.folder.join(&self.config.database.data_folder)
    }

    pub fn schemas_folder(&self) -> PathBuf {
        self.folder.join("schemas")
    }

    pub fn reports_folder(&self) -> PathBuf {
        self.folder.join("reports")
    }

    pub fn parsers_folder(&self) -> PathBuf {
        self.folder.join("parsers")
    }

    pub fn db_backend(&self) -> BackendKind {
        self.config.database.backend
    }

    pub fn db_backup_policy(&self) -> BackupPolicy {
        self.config.database.backup_policy
    }

    /// Switch to another backend and persist the choice.
    ///
    /// The new backend starts with the configured policies; data written by
    /// the previous backend is not migrated.
    pub fn set_db_backend(&mut self, kind: BackendKind) -> TabulaResult<()> {
        self.config.database.backend = kind;
        self.database = Database::with_config(&self.config.database, self.data_folder());
        self.save_config()
    }

    pub fn set_db_backup_policy(&mut self, policy: BackupPolicy) -> TabulaResult<()> {
        self.database.set_backup_policy(policy);
        self.config.database.backup_policy = policy;
        self.save_config()
    }

    pub fn set_store_config(&mut self, store: StoreConfig) -> TabulaResult<()> {
        self.database = Database::with_config(&store, self.folder.join(&store.data_folder));
        self.config.database = store;
        self.save_config()
    }

    pub fn save_config(&self) -> TabulaResult<()> {
        self.config.save(&self.folder.join(CONFIG_FILE))
    }

    /// Tables stored by the current backend.
    pub fn datasets(&self) -> TabulaResult<Vec<String>> {
        self.database.get_tables_list()
    }

    /// Read several datasets. Fails before reading anything if one is
    /// missing, listing what is available.
    pub fn get_datasets(&self, names: &[&str]) -> TabulaResult<Vec<Frame>> {
        let available = self.datasets()?;
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !available.iter().any(|a| a == n))
            .collect();
        if !missing.is_empty() {
            return Err(TabulaError::TableNotFound(format!(
                "{} in project '{}' (available: {})",
                missing.join(", "),
                self.name,
                available.join(", ")
            )));
        }
        names.iter().map(|n| self.database.read_table(n)).collect()
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("folder", &self.folder)
            .field("backend", &self.database.kind())
            .finish()
    }
}
