//! Parquet I/O — whole-file table reads and atomic rewrites.
//!
//! Table files carry [`DatabaseMetadata`] as file-level key-value metadata.
//! Writes go to a temporary file in the target directory which is then
//! renamed over the target, so readers never observe a partial file.

use crate::error::{TabulaError, TabulaResult};
use crate::storage::DatabaseMetadata;
use crate::storage::compression::CompressionAlgorithm;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes Arrow RecordBatches to Parquet files.
pub struct ParquetWriter;

/// Reads Parquet files into Arrow RecordBatches.
pub struct ParquetReader;

/// Full contents of a table file.
#[derive(Debug)]
pub struct ParquetContents {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub metadata: Option<DatabaseMetadata>,
}

impl ParquetWriter {
    /// Replace `path` with `batch`, stamping `metadata` into the file.
    pub fn write_atomic(
        path: &Path,
        batch: &RecordBatch,
        metadata: &DatabaseMetadata,
        compression: CompressionAlgorithm,
    ) -> TabulaResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| TabulaError::Storage(format!("no parent folder for {}", path.display())))?;
        let tmp = NamedTempFile::new_in(dir)?;

        let props = WriterProperties::builder()
            .set_compression(compression.to_parquet_compression())
            .set_key_value_metadata(Some(vec![
                KeyValue::new(
                    DatabaseMetadata::VERSION_KEY.to_string(),
                    metadata.version.clone(),
                ),
                KeyValue::new(
                    DatabaseMetadata::LAST_UPDATED_KEY.to_string(),
                    metadata.last_updated.clone(),
                ),
            ]))
            .build();

        let mut writer = ArrowWriter::try_new(tmp.as_file().try_clone()?, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ParquetReader {
    /// Read all batches, the Arrow schema and the stored metadata.
    pub fn read(path: &Path) -> TabulaResult<ParquetContents> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let metadata = Self::metadata_from_kv(builder.metadata().file_metadata().key_value_metadata());
        let reader = builder.build()?;

        let mut batches = Vec::new();
        for batch_result in reader {
            batches.push(batch_result?);
        }
        Ok(ParquetContents {
            schema,
            batches,
            metadata,
        })
    }

    /// Read only the stored metadata without loading data.
    pub fn read_metadata(path: &Path) -> TabulaResult<Option<DatabaseMetadata>> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        Ok(Self::metadata_from_kv(
            builder.metadata().file_metadata().key_value_metadata(),
        ))
    }

    fn metadata_from_kv(kv: Option<&Vec<KeyValue>>) -> Option<DatabaseMetadata> {
        let kv = kv?;
        let lookup = |key: &str| {
            kv.iter()
                .find(|entry| entry.key == key)
                .and_then(|entry| entry.value.clone())
        };
        Some(DatabaseMetadata {
            version: lookup(DatabaseMetadata::VERSION_KEY)?,
            last_updated: lookup(DatabaseMetadata::LAST_UPDATED_KEY)?,
        })
    }
}
