//! Reading a written Parquet output back for validation.
//!
//! Values are decoded from the Arrow types found in the file, so a writer that stored a column
//! with the wrong physical type shows up as a mismatch instead of being papered over.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{DataType as ArrowType, Float64Type, Int16Type, Int32Type, Int64Type};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::file::reader::{FileReader, SerializedFileReader};

use crate::error::{PipelineError, PipelineResult};
use crate::types::Value;

/// A closed Parquet output file.
#[derive(Debug, Clone)]
pub struct OutputFile {
    path: PathBuf,
    columns: Vec<String>,
}

impl OutputFile {
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let builder = Self::builder(&path)?;
        let columns = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
        Ok(Self { path, columns })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column names in file order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Row count recorded in the file footer. Reads no data pages.
    pub fn row_count(&self) -> PipelineResult<u64> {
        let file = File::open(&self.path).map_err(|e| PipelineError::output_read(&self.path, e))?;
        let reader = SerializedFileReader::new(file).map_err(|e| PipelineError::output_read(&self.path, e))?;
        let rows = reader.metadata().file_metadata().num_rows();
        u64::try_from(rows).map_err(|_| PipelineError::output_read(&self.path, format!("negative row count {rows}")))
    }

    /// Stream the named columns as rows of decoded values, in the order given.
    pub fn rows(&self, columns: &[String], batch_size: usize) -> PipelineResult<OutputRows> {
        let builder = Self::builder(&self.path)?;
        let positions = columns
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| PipelineError::output_read(&self.path, format!("output has no column '{name}'")))
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), positions);
        let reader = builder
            .with_projection(mask)
            .with_batch_size(batch_size.max(1))
            .build()
            .map_err(|e| PipelineError::output_read(&self.path, e))?;
        Ok(OutputRows {
            path: self.path.clone(),
            columns: columns.to_vec(),
            reader,
        })
    }

    /// Decode every column of the rows at the given 0-based indices.
    ///
    /// Indices past the end of the file are ignored.
    pub fn rows_at(&self, indices: &BTreeSet<u64>, batch_size: usize) -> PipelineResult<Vec<(u64, Vec<Value>)>> {
        let mut out = Vec::with_capacity(indices.len());
        let Some(&last) = indices.last() else {
            return Ok(out);
        };
        let mut position = 0u64;
        for batch in self.rows(&self.columns, batch_size)? {
            for row in batch? {
                if indices.contains(&position) {
                    out.push((position, row));
                }
                position += 1;
            }
            if position > last {
                break;
            }
        }
        Ok(out)
    }

    fn builder(path: &Path) -> PipelineResult<ParquetRecordBatchReaderBuilder<File>> {
        let file = File::open(path).map_err(|e| PipelineError::output_read(path, e))?;
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| PipelineError::output_read(path, e))
    }
}

/// Batches of decoded output rows.
pub struct OutputRows {
    path: PathBuf,
    columns: Vec<String>,
    reader: ParquetRecordBatchReader,
}

impl OutputRows {
    fn decode(&self, batch: &RecordBatch) -> Result<Vec<Vec<Value>>, String> {
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
        (0..batch.num_rows())
            .map(|i| {
                arrays
                    .iter()
                    .zip(&self.columns)
                    .map(|(array, name)| decode_value(array.as_ref(), i).map_err(|m| format!("column '{name}': {m}")))
                    .collect()
            })
            .collect()
    }
}

impl Iterator for OutputRows {
    type Item = PipelineResult<Vec<Vec<Value>>>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.reader.next()? {
            Ok(b) => b,
            Err(e) => return Some(Err(PipelineError::output_read(&self.path, e))),
        };
        Some(self.decode(&batch).map_err(|m| PipelineError::output_read(&self.path, m)))
    }
}

/// Decode one cell of an output column.
pub fn decode_value(array: &dyn Array, i: usize) -> Result<Value, String> {
    if array.is_null(i) {
        return Ok(Value::Null);
    }
    let v = match array.data_type() {
        ArrowType::Utf8 => Value::Utf8(array.as_string::<i32>().value(i).to_owned()),
        ArrowType::LargeUtf8 => Value::Utf8(array.as_string::<i64>().value(i).to_owned()),
        ArrowType::Int16 => Value::Int16(array.as_primitive::<Int16Type>().value(i)),
        ArrowType::Int32 => Value::Int32(array.as_primitive::<Int32Type>().value(i)),
        ArrowType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(i)),
        ArrowType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(i)),
        ArrowType::Boolean => Value::Bool(array.as_boolean().value(i)),
        ArrowType::List(_) => {
            let items = array.as_list::<i32>().value(i);
            let items = (0..items.len())
                .map(|j| decode_value(items.as_ref(), j))
                .collect::<Result<Vec<_>, _>>()?;
            Value::List(items)
        }
        other => return Err(format!("unexpected output column type {other}")),
    };
    Ok(v)
}
