//! Streaming Parquet reader producing bounded [`RawBatch`]es.
//!
//! Only the required columns are decoded (column projection), and record batches are pulled
//! from the file lazily, so memory stays proportional to the batch size.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{
    DataType as ArrowType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{RawBatch, RawRow, RawValue};

use super::unified::{BatchSource, ReaderOptions};

/// Reads a Parquet file batch by batch.
///
/// Nested list columns are surfaced as [`RawValue::List`]; everything else as native scalars.
pub struct ParquetBatchReader {
    locator: String,
    reader: ParquetRecordBatchReader,
    columns: Arc<[String]>,
    next_position: u64,
    done: bool,
}

impl ParquetBatchReader {
    pub fn open(
        path: &Path,
        locator: &str,
        required: &[String],
        options: &ReaderOptions,
    ) -> PipelineResult<Self> {
        let file = File::open(path).map_err(|e| PipelineError::source_read(locator, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| PipelineError::source_read(locator, e))?;

        let file_columns: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let positions = super::csv::header_positions(&file_columns, required, options.strict_columns)
            .map_err(|m| PipelineError::source_read(locator, m))?;

        let mask = ProjectionMask::roots(builder.parquet_schema(), positions);
        let reader = builder
            .with_projection(mask)
            .with_batch_size(options.batch_size)
            .build()
            .map_err(|e| PipelineError::source_read(locator, e))?;

        Ok(Self {
            locator: locator.to_owned(),
            reader,
            columns: required.iter().cloned().collect(),
            next_position: 0,
            done: false,
        })
    }

    fn convert(&mut self, batch: &RecordBatch) -> Result<Vec<RawRow>, String> {
        let schema = batch.schema();
        let arrays = self
            .columns
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .map(|i| batch.column(i))
                    .map_err(|_| format!("column '{name}' missing from decoded batch"))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let values = arrays
                .iter()
                .zip(self.columns.iter())
                .map(|(array, name)| raw_value(array.as_ref(), i).map_err(|m| format!("column '{name}': {m}")))
                .collect::<Result<Vec<_>, String>>()
                .map_err(|m| format!("row {}: {m}", self.next_position))?;
            rows.push(RawRow {
                position: self.next_position,
                values,
            });
            self.next_position += 1;
        }
        Ok(rows)
    }
}

impl Iterator for ParquetBatchReader {
    type Item = PipelineResult<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let batch = match self.reader.next()? {
                Ok(b) => b,
                Err(e) => {
                    self.done = true;
                    return Some(Err(PipelineError::source_read(&self.locator, e)));
                }
            };
            if batch.num_rows() == 0 {
                continue;
            }
            return Some(match self.convert(&batch) {
                Ok(rows) => Ok(RawBatch {
                    columns: Arc::clone(&self.columns),
                    rows,
                }),
                Err(m) => {
                    self.done = true;
                    Err(PipelineError::source_read(&self.locator, m))
                }
            });
        }
    }
}

impl BatchSource for ParquetBatchReader {
    fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Convert one cell of an Arrow array into a [`RawValue`].
pub(crate) fn raw_value(array: &dyn Array, i: usize) -> Result<RawValue, String> {
    if array.is_null(i) {
        return Ok(RawValue::Null);
    }
    let v = match array.data_type() {
        ArrowType::Null => RawValue::Null,
        ArrowType::Utf8 => RawValue::Text(array.as_string::<i32>().value(i).to_owned()),
        ArrowType::LargeUtf8 => RawValue::Text(array.as_string::<i64>().value(i).to_owned()),
        ArrowType::Utf8View => RawValue::Text(array.as_string_view().value(i).to_owned()),
        ArrowType::Boolean => RawValue::Bool(array.as_boolean().value(i)),
        ArrowType::Int8 => RawValue::Int(i64::from(array.as_primitive::<Int8Type>().value(i))),
        ArrowType::Int16 => RawValue::Int(i64::from(array.as_primitive::<Int16Type>().value(i))),
        ArrowType::Int32 => RawValue::Int(i64::from(array.as_primitive::<Int32Type>().value(i))),
        ArrowType::Int64 => RawValue::Int(array.as_primitive::<Int64Type>().value(i)),
        ArrowType::UInt8 => RawValue::Int(i64::from(array.as_primitive::<UInt8Type>().value(i))),
        ArrowType::UInt16 => RawValue::Int(i64::from(array.as_primitive::<UInt16Type>().value(i))),
        ArrowType::UInt32 => RawValue::Int(i64::from(array.as_primitive::<UInt32Type>().value(i))),
        ArrowType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(i);
            RawValue::Int(i64::try_from(v).map_err(|_| format!("u64 {v} out of range for i64"))?)
        }
        ArrowType::Float32 => RawValue::Float(f64::from(array.as_primitive::<Float32Type>().value(i))),
        ArrowType::Float64 => RawValue::Float(array.as_primitive::<Float64Type>().value(i)),
        ArrowType::List(_) => list_value(array.as_list::<i32>().value(i).as_ref())?,
        ArrowType::LargeList(_) => list_value(array.as_list::<i64>().value(i).as_ref())?,
        other => return Err(format!("unsupported parquet column type {other}")),
    };
    Ok(v)
}

fn list_value(items: &dyn Array) -> Result<RawValue, String> {
    (0..items.len())
        .map(|j| raw_value(items, j))
        .collect::<Result<Vec<_>, _>>()
        .map(RawValue::List)
}
