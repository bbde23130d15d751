//! # Tabula — Versioned Tabular Storage Engine
//!
//! Tabula persists tables for a project folder through one of several
//! interchangeable backends, under a write policy (append/upsert) and a
//! backup policy.
//!
//! ## Features
//!
//! - **Parquet store**: one file per table, read-merge-rewrite commits
//! - **Versioned Parquet store**: per-key version history, soft deletes,
//!   "latest non-deleted row per key" reconstruction on read
//! - **SQLite row store**: one SQL table per dataset with native conflict
//!   resolution
//! - **JSON schemas**: primary key, column types and padding from
//!   `<project>/schemas/<table>.schema.json`, cached with a TTL
//! - **Atomic writes**: temp file + rename, optional timestamped backups
//!
//! ## Quick Start
//!
//! ```rust
//! use tabula_core::{BackendKind, Database, Frame, WritePolicy};
//!
//! # fn main() -> tabula_core::TabulaResult<()> {
//! let project = tempfile::tempdir()?;
//! std::fs::create_dir_all(project.path().join("schemas"))?;
//! std::fs::write(
//!     project.path().join("schemas/people.schema.json"),
//!     r#"{"properties": {"id": {"type": "integer", "PrimaryKey": true},
//!                        "name": {"type": "string"}}}"#,
//! )?;
//!
//! let mut db = Database::create(BackendKind::Parquet, project.path().join("data"));
//! db.commit_table("people", &Frame::from_json(&serde_json::json!({"id": [1, 2], "name": ["a", "b"]}))?)?;
//!
//! // Existing rows win under APPEND
//! db.set_write_policy(WritePolicy::Append);
//! db.commit_table("people", &Frame::from_json(&serde_json::json!({"id": [1], "name": ["z"]}))?)?;
//! assert_eq!(db.read_table_column("people", "name")?.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Commit Pipeline
//!
//! ```text
//! Frame → primary key check → backup → read old → merge (policy)
//!       → type resolution → single atomic write
//! ```
//!
//! ## Module Structure
//!
//! - [`engine`] — backend factory ([`Database`]) and [`Project`]
//! - [`storage`] — the [`StorageBackend`] trait and its implementations
//! - [`schema`] — schema documents and the caching resolver
//! - [`frame`] / [`value`] — the tabular data model
//! - [`config`] — [`StoreConfig`] and project configuration
//! - [`error`] — [`TabulaError`]

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod schema;
pub mod storage;
pub mod value;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{ProjectConfig, StoreConfig};
pub use engine::{Database, Project};
pub use error::{TabulaError, TabulaResult};
pub use frame::Frame;
pub use schema::{SchemaResolver, TableSchema};
pub use storage::{BackendKind, BackupPolicy, DatabaseMetadata, StorageBackend, WritePolicy};
pub use value::ScalarValue;
