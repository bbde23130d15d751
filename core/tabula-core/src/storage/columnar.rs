//! Columnar conversion — Frame ↔ Arrow RecordBatch.
//!
//! Physical column types are resolved once per write: the type already
//! stored in the table file wins, then the type declared in the table schema,
//! then a type inferred from the values. Values are cast to the resolved type
//! while the column arrays are built.

use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::schema::TableSchema;
use crate::value::ScalarValue;
use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use rayon::prelude::*;
use std::sync::Arc;

/// Type that best holds every non-null value of a column.
///
/// All integers → Int64, integers mixed with floats → Float64, all booleans →
/// Boolean, anything else (including all-null) → Utf8.
pub fn infer_data_type<'a>(values: impl IntoIterator<Item = &'a ScalarValue>) -> DataType {
    let mut inferred: Option<DataType> = None;
    for value in values {
        let dt = match value {
            ScalarValue::Null => continue,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Utf8(_) | ScalarValue::List(_) => return DataType::Utf8,
        };
        inferred = Some(match (inferred, dt) {
            (None, dt) => dt,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    inferred.unwrap_or(DataType::Utf8)
}

/// Arrow schema for writing `frame`.
///
/// Column order follows the frame. Every field is nullable; nullability in
/// table schemas is descriptive only.
pub fn resolve_schema(frame: &Frame, existing: Option<&Schema>, declared: &TableSchema) -> Schema {
    let fields: Vec<Field> = frame
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let data_type = existing
                .and_then(|s| s.field_with_name(name).ok())
                .map(|f| f.data_type().clone())
                .filter(|dt| *dt != DataType::Null)
                .or_else(|| declared.field(name).map(|f| f.arrow_type()))
                .unwrap_or_else(|| infer_data_type(frame.rows().iter().map(|row| &row[idx])));
            Field::new(name, data_type, true)
        })
        .collect();
    Schema::new(fields)
}

/// Cast every cell of `frame` to the type `schema` gives its column.
///
/// Columns absent from `schema` are left untouched.
pub fn cast_frame(frame: &Frame, schema: &Schema) -> TabulaResult<Frame> {
    let targets: Vec<Option<DataType>> = frame
        .columns()
        .iter()
        .map(|c| schema.field_with_name(c).ok().map(|f| f.data_type().clone()))
        .collect();
    let rows = frame
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .zip(&targets)
                .zip(frame.columns())
                .map(|((value, target), name)| match target {
                    Some(dt) => value.cast_to(dt, name),
                    None => Ok(value.clone()),
                })
                .collect::<TabulaResult<Vec<_>>>()
        })
        .collect::<TabulaResult<Vec<_>>>()?;
    Frame::from_rows(frame.columns().to_vec(), rows)
}

/// Build a RecordBatch with `schema` from `frame`.
///
/// Schema fields missing from the frame become all-null columns.
pub fn to_record_batch(frame: &Frame, schema: SchemaRef) -> TabulaResult<RecordBatch> {
    let columns: Vec<ArrayRef> = schema
        .fields()
        .par_iter()
        .map(|field| build_column(frame, field.name(), field.data_type()))
        .collect::<TabulaResult<_>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(frame.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

/// Convert RecordBatches (all sharing `schema`) into a frame.
pub fn from_record_batches(schema: &Schema, batches: &[RecordBatch]) -> TabulaResult<Frame> {
    let mut frame = Frame::new(schema.fields().iter().map(|f| f.name().clone()));
    for batch in batches {
        for row_idx in 0..batch.num_rows() {
            let row = batch
                .columns()
                .iter()
                .map(|col| ScalarValue::from_array(col, row_idx))
                .collect::<TabulaResult<Vec<_>>>()?;
            frame.push_row(row)?;
        }
    }
    Ok(frame)
}

/// Build a single column array from row data.
fn build_column(frame: &Frame, name: &str, data_type: &DataType) -> TabulaResult<ArrayRef> {
    let idx = frame.column_index(name);
    let rows = frame.rows();
    let cell = |row: &[ScalarValue]| -> TabulaResult<ScalarValue> {
        match idx {
            Some(i) => row[i].cast_to(data_type, name),
            None => Ok(ScalarValue::Null),
        }
    };

    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for row in rows {
                match cell(row)? {
                    ScalarValue::Int64(v) => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for row in rows {
                match cell(row)? {
                    ScalarValue::Float64(v) => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::with_capacity(rows.len(), 256);
            for row in rows {
                match cell(row)? {
                    ScalarValue::Utf8(v) => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for row in rows {
                match cell(row)? {
                    ScalarValue::Boolean(v) => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        dt => Err(TabulaError::Storage(format!(
            "unsupported column type for '{name}': {dt:?}"
        ))),
    }
}
