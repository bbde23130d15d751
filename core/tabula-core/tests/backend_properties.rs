// Behaviour shared by every backend: write policies, empty commits, backups,
// batch validation and read-only queries.

use serde_json::json;
use std::path::{Path, PathBuf};
use tabula_core::storage::versioned::{VERSION_COLUMN, VersionedParquetStore};
use tabula_core::{
    BackendKind, BackupPolicy, Database, Frame, ScalarValue, StorageBackend, TabulaError, TabulaResult,
    WritePolicy,
};
use tempfile::TempDir;

struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        tabula_core::logging::init_test();
        Self {
            tmp: TempDir::new().unwrap(),
        }
    }

    fn data(&self) -> PathBuf {
        self.tmp.path().join("data")
    }

    fn schema(&self, table: &str, body: serde_json::Value) {
        let dir = self.tmp.path().join("schemas");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{table}.schema.json")), body.to_string()).unwrap();
    }

    fn keyed(&self, table: &str) {
        self.schema(
            table,
            json!({"properties": {
                "col1": {"type": "integer", "PrimaryKey": true},
                "col2": {"type": "string"}
            }}),
        );
    }

    fn backend(&self, kind: BackendKind) -> Box<dyn StorageBackend> {
        Database::create(kind, self.data())
    }
}

fn pairs(rows: &[(i64, &str)]) -> Frame {
    Frame::from_rows(
        ["col1", "col2"],
        rows.iter()
            .map(|(k, v)| vec![ScalarValue::Int64(*k), ScalarValue::from(*v)])
            .collect(),
    )
    .unwrap()
}

fn as_pairs(frame: &Frame) -> Vec<(i64, String)> {
    let sorted = frame.sorted_by("col1");
    (0..sorted.num_rows())
        .map(|i| {
            (
                sorted.value(i, "col1").and_then(ScalarValue::as_i64).unwrap(),
                sorted.value(i, "col2").unwrap().to_string(),
            )
        })
        .collect()
}

fn expected(rows: &[(i64, &str)]) -> Vec<(i64, String)> {
    rows.iter().map(|(k, v)| (*k, v.to_string())).collect()
}

fn artifact(kind: BackendKind, data: &Path, table: &str) -> PathBuf {
    match kind {
        BackendKind::Parquet => data.join(format!("{table}.parquet")),
        BackendKind::ParquetVersioned => data.join(format!("{table}.ver.parquet")),
        BackendKind::Sqlite => data.join("db.sqlite"),
    }
}

#[test]
fn test_empty_commit_is_a_noop() -> TabulaResult<()> {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        fx.keyed("t");
        let db = fx.backend(*kind);

        db.commit_table("t", &Frame::new(["col1", "col2"]))?;
        assert!(db.get_tables_list()?.is_empty(), "{kind}: empty first commit created a table");

        db.commit_table("t", &pairs(&[(1, "a")]))?;
        let path = artifact(*kind, &fx.data(), "t");
        let bytes = std::fs::read(&path)?;
        let meta = db.table_metadata("t")?;

        std::thread::sleep(std::time::Duration::from_millis(1100));
        db.commit_table("t", &Frame::new(["col1", "col2"]))?;
        assert_eq!(std::fs::read(&path)?, bytes, "{kind}: file changed");
        assert_eq!(db.table_metadata("t")?, meta, "{kind}: metadata changed");
    }
    Ok(())
}

#[test]
fn test_two_primary_keys_is_schema_error() {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        fx.schema(
            "t",
            json!({"properties": {"a": {"PrimaryKey": true}, "b": {"PrimaryKey": true}}}),
        );
        let db = fx.backend(*kind);
        assert!(matches!(db.get_primary_key("t"), Err(TabulaError::Schema { .. })));
        let frame = Frame::from_json(&json!({"a": ["x"], "b": ["y"]})).unwrap();
        assert!(matches!(db.commit_table("t", &frame), Err(TabulaError::Schema { .. })));
    }
}

#[test]
fn test_append_and_upsert_diverge() -> TabulaResult<()> {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        fx.keyed("t");

        let mut append = fx.backend(*kind);
        append.set_write_policy(WritePolicy::Append);
        append.commit_table("t", &pairs(&[(1, "a"), (2, "b")]))?;
        append.commit_table("t", &pairs(&[(1, "c"), (3, "d")]))?;
        assert_eq!(
            as_pairs(&append.read_table("t")?),
            expected(&[(1, "a"), (2, "b"), (3, "d")]),
            "{kind} APPEND"
        );

        let fx = Fixture::new();
        fx.keyed("t");
        let upsert = fx.backend(*kind);
        upsert.commit_table("t", &pairs(&[(1, "a"), (2, "b")]))?;
        upsert.commit_table("t", &pairs(&[(1, "c"), (3, "d")]))?;
        assert_eq!(
            as_pairs(&upsert.read_table("t")?),
            expected(&[(1, "c"), (2, "b"), (3, "d")]),
            "{kind} UPSERT"
        );
    }
    Ok(())
}

#[test]
fn test_versioned_reconstruction() -> TabulaResult<()> {
    let fx = Fixture::new();
    fx.keyed("t");
    let db = VersionedParquetStore::new(fx.data());
    db.commit_table("t", &pairs(&[(1, "a")]))?;
    db.commit_table("t", &pairs(&[(1, "b")]))?;

    let history = db.read_table_history("t")?;
    assert_eq!(history.num_rows(), 2);
    assert_eq!(
        history.column(VERSION_COLUMN).unwrap(),
        vec![ScalarValue::Int64(1), ScalarValue::Int64(2)]
    );
    assert_eq!(db.read_table("t")?, pairs(&[(1, "b")]));
    assert_eq!(db.read_table_column("t", "col2")?, vec![ScalarValue::from("b")]);
    Ok(())
}

#[test]
fn test_soft_deleted_latest_version_hides_key() -> TabulaResult<()> {
    let fx = Fixture::new();
    fx.keyed("t");
    let db = VersionedParquetStore::new(fx.data());
    db.commit_table("t", &pairs(&[(1, "a"), (2, "b")]))?;
    db.commit_table("t", &pairs(&[(1, "a2")]))?;
    db.delete_keys("t", &[ScalarValue::Int64(1)])?;

    assert_eq!(db.read_table_history("t")?.num_rows(), 4);
    assert_eq!(as_pairs(&db.read_table("t")?), expected(&[(2, "b")]));
    assert!(db.get_primary_keys("t")?.iter().all(|k| k != &ScalarValue::Int64(1)));
    Ok(())
}

#[test]
fn test_identical_upsert_creates_no_version() -> TabulaResult<()> {
    let fx = Fixture::new();
    fx.keyed("t");
    let db = VersionedParquetStore::new(fx.data());
    db.commit_table("t", &pairs(&[(1, "a")]))?;
    db.commit_table("t", &pairs(&[(1, "a")]))?;
    db.commit_table("t", &pairs(&[(1, "a")]))?;
    assert_eq!(db.read_table_history("t")?.num_rows(), 1);
    Ok(())
}

#[test]
fn test_no_primary_key_accumulates() -> TabulaResult<()> {
    for kind in BackendKind::ALL {
        for policy in [WritePolicy::Append, WritePolicy::Upsert] {
            let fx = Fixture::new();
            let mut db = fx.backend(*kind);
            db.set_write_policy(policy);
            db.commit_table("t", &pairs(&[(1, "a"), (2, "b")]))?;
            db.commit_table("t", &pairs(&[(1, "a"), (3, "c")]))?;
            assert_eq!(db.read_table("t")?.num_rows(), 4, "{kind} {policy}");
        }
    }
    Ok(())
}

#[test]
fn test_backup_on_update_only() -> TabulaResult<()> {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        fx.keyed("t");
        let mut db = fx.backend(*kind);
        db.set_backup_policy(BackupPolicy::TimestampedCopies);
        let backups = fx.data().join("backup");

        db.commit_table("t", &pairs(&[(1, "a")]))?;
        assert!(!backups.exists(), "{kind}: first commit made a backup");

        let before = std::fs::read(artifact(*kind, &fx.data(), "t"))?;
        db.commit_table("t", &pairs(&[(2, "b")]))?;

        let files: Vec<PathBuf> = std::fs::read_dir(&backups)?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        assert_eq!(files.len(), 1, "{kind}");
        assert_eq!(std::fs::read(&files[0])?, before, "{kind}: backup differs from pre-commit file");
    }
    Ok(())
}

#[test]
fn test_no_backup_by_default() -> TabulaResult<()> {
    let fx = Fixture::new();
    let db = fx.backend(BackendKind::Parquet);
    db.commit_table("t", &pairs(&[(1, "a")]))?;
    db.commit_table("t", &pairs(&[(2, "b")]))?;
    assert!(!fx.data().join("backup").exists());
    Ok(())
}

#[test]
fn test_batch_size_mismatch() {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        let db = fx.backend(*kind);
        let err = db.commit_tables(&["t1", "t2"], &[pairs(&[(1, "a")])]).unwrap_err();
        assert!(matches!(err, TabulaError::Validation(_)));

        let err = db
            .commit_tables_dict(&["t1", "t2"], &[json!({"col1": [1]})])
            .unwrap_err();
        assert!(matches!(err, TabulaError::Validation(_)));
        assert!(db.get_tables_list().unwrap().is_empty(), "{kind}: partial batch written");
    }
}

#[test]
fn test_commit_tables_dict_converts_everything_first() -> TabulaResult<()> {
    let fx = Fixture::new();
    let db = fx.backend(BackendKind::Parquet);
    let err = db
        .commit_tables_dict(&["good", "bad"], &[json!({"a": [1]}), json!("not a dataset")])
        .unwrap_err();
    assert!(matches!(err, TabulaError::Validation(_)));
    assert!(db.get_tables_list()?.is_empty());

    db.commit_tables_dict(
        &["t1", "t2"],
        &[json!({"a": [1, 2]}), json!([{"b": "x"}, {"b": "y", "c": true}])],
    )?;
    assert_eq!(db.get_tables_list()?, vec!["t1", "t2"]);
    assert_eq!(db.read_table("t2")?.columns(), &["b", "c"]);
    Ok(())
}

#[test]
fn test_queries_are_read_only() -> TabulaResult<()> {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        fx.keyed("t");
        let db = fx.backend(*kind);
        db.commit_table("t", &pairs(&[(1, "a"), (2, "b")]))?;

        let result = db.sql_query("SELECT col2 FROM t ORDER BY col1 DESC", "t")?;
        assert_eq!(
            result.column("col2").unwrap(),
            vec![ScalarValue::from("b"), ScalarValue::from("a")],
            "{kind}"
        );
        for sql in ["DELETE FROM t", "UPDATE t SET col2 = 'x'", "DROP TABLE t"] {
            assert!(
                matches!(db.sql_query(sql, "t"), Err(TabulaError::ReadOnlyQuery(_))),
                "{kind}: {sql}"
            );
        }
        assert_eq!(db.read_table("t")?.num_rows(), 2);
    }
    Ok(())
}

#[test]
fn test_primary_key_values() -> TabulaResult<()> {
    for kind in BackendKind::ALL {
        let fx = Fixture::new();
        fx.keyed("t");
        fx.schema("free", json!({"properties": {"a": {"type": "string"}}}));
        let db = fx.backend(*kind);
        db.commit_table("t", &pairs(&[(2, "b"), (1, "a")]))?;
        db.commit_table("free", &Frame::from_json(&json!({"a": ["x"]}))?)?;

        let mut keys = db.get_primary_keys("t")?;
        keys.sort_by_key(|k| k.as_i64());
        assert_eq!(keys, vec![ScalarValue::Int64(1), ScalarValue::Int64(2)], "{kind}");
        assert!(db.get_primary_keys("free")?.is_empty());
    }
    Ok(())
}

#[test]
fn test_schema_edits_seen_after_invalidate() -> TabulaResult<()> {
    let fx = Fixture::new();
    fx.schema("t", json!({"properties": {"a": {"type": "string"}}}));
    let db = fx.backend(BackendKind::Parquet);
    assert_eq!(db.get_primary_key("t")?, None);

    fx.schema("t", json!({"properties": {"a": {"type": "string", "PrimaryKey": true}}}));
    assert_eq!(db.get_primary_key("t")?, None);
    db.schemas().invalidate("t");
    assert_eq!(db.get_primary_key("t")?.as_deref(), Some("a"));
    Ok(())
}

#[test]
fn test_first_write_dedups_keys_after_cast() -> TabulaResult<()> {
    let rows = json!([{"col1": 1, "col2": "a"}, {"col1": 1.0, "col2": "b"}]);
    for kind in [BackendKind::Parquet, BackendKind::ParquetVersioned] {
        let fx = Fixture::new();
        fx.keyed("t");
        let db = fx.backend(kind);
        db.commit_table("t", &Frame::from_json(&rows)?)?;
        assert_eq!(as_pairs(&db.read_table("t")?), expected(&[(1, "b")]), "{kind}");
    }

    let fx = Fixture::new();
    fx.keyed("t");
    let db = VersionedParquetStore::new(fx.data());
    db.commit_table("t", &Frame::from_json(&rows)?)?;
    let history = db.read_table_history("t")?;
    assert_eq!(
        history.column("col1").unwrap(),
        vec![ScalarValue::Int64(1), ScalarValue::Int64(1)]
    );
    assert_eq!(
        history.column(VERSION_COLUMN).unwrap(),
        vec![ScalarValue::Int64(1), ScalarValue::Int64(2)]
    );
    Ok(())
}

#[test]
fn test_first_write_append_keeps_first_after_cast() -> TabulaResult<()> {
    let rows = json!([{"col1": 1, "col2": "a"}, {"col1": 1.0, "col2": "b"}]);
    for kind in [BackendKind::Parquet, BackendKind::ParquetVersioned] {
        let fx = Fixture::new();
        fx.keyed("t");
        let mut db = fx.backend(kind);
        db.set_write_policy(WritePolicy::Append);
        db.commit_table("t", &Frame::from_json(&rows)?)?;
        assert_eq!(as_pairs(&db.read_table("t")?), expected(&[(1, "a")]), "{kind}");
    }
    Ok(())
}

#[test]
fn test_plain_store_rejects_names_it_cannot_list() -> TabulaResult<()> {
    let fx = Fixture::new();
    let plain = fx.backend(BackendKind::Parquet);
    let err = plain.commit_table("x.ver", &pairs(&[(1, "a")])).unwrap_err();
    assert!(matches!(err, TabulaError::Validation(_)));
    assert!(plain.get_tables_list()?.is_empty());

    let versioned = fx.backend(BackendKind::ParquetVersioned);
    versioned.commit_table("x.ver", &pairs(&[(1, "a")]))?;
    assert_eq!(versioned.get_tables_list()?, vec!["x.ver"]);
    assert!(plain.get_tables_list()?.is_empty());
    Ok(())
}
