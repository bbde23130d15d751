//! Database — the backend factory.

/// Entry point for obtaining a storage backend.
///
/// Callers hold the result as `Box<dyn StorageBackend>` and never name a
/// concrete backend type; adding an engine means adding a [`BackendKind`]
/// variant and one match arm in the constructors.
///
/// | Kind                | Artifact                       |
/// |---------------------|--------------------------------|
/// | `Parquet`           | `<data>/<table>.parquet`       |
/// | `ParquetVersioned`  | `<data>/<table>.ver.parquet`   |
/// | `Sqlite`            | `<data>/db.sqlite`             |
///
/// # Example
///
/// ```rust
/// use tabula_core::{BackendKind, Database, Frame};
///
/// # fn main() -> tabula_core::TabulaResult<()> {
/// let tmp = tempfile::tempdir()?;
/// let db = Database::create(BackendKind::ParquetVersioned, tmp.path().join("data"));
/// let frame = Frame::from_json(&serde_json::json!({"id": [1, 2], "name": ["a", "b"]}))?;
/// db.commit_table("people", &frame)?;
/// assert_eq!(db.read_table("people")?.num_rows(), 2);
/// # Ok(())
/// # }
/// ```
///
/// [`BackendKind`]: crate::storage::BackendKind
#[derive(Debug, Clone, Copy)]
pub struct Database;
