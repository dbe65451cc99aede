//! Batch-oriented Parquet writer with staged publication.
//!
//! Output is written to `<path>.part`. After the writer closes, the caller decides whether the
//! staged file is published to `<path>`, kept as `<path>.rejected`, or discarded. A sink or
//! staged output dropped without a decision removes its file, so a failed job never leaves a
//! partial output behind.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int16Builder, Int32Builder, Int64Builder, ListBuilder, RecordBatch,
    StringBuilder,
};
use arrow::datatypes::{DataType as ArrowType, Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Batch, DataType, Schema, Value};

use super::stats::{RunningStats, StatsSnapshot};

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Zstandard at the given level.
    Zstd(i32),
    Snappy,
    Uncompressed,
}

/// Options controlling the Parquet sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    pub codec: Codec,
    /// Upper bound on rows per row group.
    pub max_row_group_size: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            codec: Codec::Zstd(3),
            max_row_group_size: 1024 * 1024,
        }
    }
}

impl SinkOptions {
    fn writer_properties(&self) -> Result<WriterProperties, String> {
        let compression = match self.codec {
            Codec::Zstd(level) => Compression::ZSTD(ZstdLevel::try_new(level).map_err(|e| e.to_string())?),
            Codec::Snappy => Compression::SNAPPY,
            Codec::Uncompressed => Compression::UNCOMPRESSED,
        };
        Ok(WriterProperties::builder()
            .set_compression(compression)
            .set_max_row_group_size(self.max_row_group_size.max(1))
            .build())
    }
}

/// `<path><suffix>`, e.g. `out.parquet.part`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Arrow schema for an output schema. Every column is nullable; list elements are nullable.
pub fn arrow_schema(schema: &Schema) -> ArrowSchema {
    ArrowSchema::new(
        schema
            .fields
            .iter()
            .map(|f| ArrowField::new(&f.name, arrow_type(f.data_type), true))
            .collect::<Vec<_>>(),
    )
}

fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Int16 => ArrowType::Int16,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Bool => ArrowType::Boolean,
        DataType::ListUtf8 => ArrowType::List(Arc::new(ArrowField::new("item", ArrowType::Utf8, true))),
        DataType::ListInt16 => ArrowType::List(Arc::new(ArrowField::new("item", ArrowType::Int16, true))),
    }
}

/// Streams batches of one schema into a staged Parquet file.
pub struct ParquetSink {
    target: PathBuf,
    staged: PathBuf,
    schema: Arc<Schema>,
    arrow_schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    rows: u64,
    closed: bool,
}

impl ParquetSink {
    /// Create `<path>.part`, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>, schema: Arc<Schema>, options: &SinkOptions) -> PipelineResult<Self> {
        let target = path.as_ref().to_path_buf();
        let staged = sibling_path(&target, ".part");
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::output_write(&target, e))?;
        }

        let props = options
            .writer_properties()
            .map_err(|m| PipelineError::output_write(&target, m))?;
        let arrow_schema: SchemaRef = Arc::new(arrow_schema(&schema));
        let file = File::create(&staged).map_err(|e| PipelineError::output_write(&staged, e))?;
        let writer = match ArrowWriter::try_new(file, Arc::clone(&arrow_schema), Some(props)) {
            Ok(w) => w,
            Err(e) => {
                let _ = fs::remove_file(&staged);
                return Err(PipelineError::output_write(&staged, e));
            }
        };
        debug!(path = %staged.display(), schema = %schema.name, "parquet sink opened");

        Ok(Self {
            target,
            staged,
            schema,
            arrow_schema,
            writer: Some(writer),
            rows: 0,
            closed: false,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Append a batch and fold it into `stats`.
    pub fn write(&mut self, batch: &Batch, stats: &mut RunningStats) -> PipelineResult<()> {
        if batch.schema.fields != self.schema.fields {
            return Err(PipelineError::output_write(
                &self.staged,
                format!("batch schema '{}' does not match sink schema '{}'", batch.schema.name, self.schema.name),
            ));
        }
        if batch.is_empty() {
            return Ok(());
        }
        let record_batch = to_record_batch(&self.arrow_schema, batch)
            .map_err(|m| PipelineError::output_write(&self.staged, m))?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::output_write(&self.staged, "sink is already closed"))?;
        writer
            .write(&record_batch)
            .map_err(|e| PipelineError::output_write(&self.staged, e))?;
        stats.observe(batch);
        self.rows += batch.row_count() as u64;
        Ok(())
    }

    /// Close the file and freeze the statistics.
    pub fn finish(mut self, stats: RunningStats) -> PipelineResult<(StagedOutput, StatsSnapshot)> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| PipelineError::output_write(&self.staged, "sink is already closed"))?;
        writer
            .close()
            .map_err(|e| PipelineError::output_write(&self.staged, e))?;
        self.closed = true;
        debug!(path = %self.staged.display(), rows = self.rows, "parquet sink closed");

        let staged = StagedOutput {
            staged: self.staged.clone(),
            target: self.target.clone(),
            rows: self.rows,
            settled: false,
        };
        Ok((staged, stats.freeze()))
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if !self.closed {
            drop(self.writer.take());
            if fs::remove_file(&self.staged).is_ok() {
                warn!(path = %self.staged.display(), "removed unfinished output");
            }
        }
    }
}

/// A closed output awaiting a verdict.
#[derive(Debug)]
pub struct StagedOutput {
    staged: PathBuf,
    target: PathBuf,
    rows: u64,
    settled: bool,
}

impl StagedOutput {
    /// The staged file, readable by the validator.
    pub fn path(&self) -> &Path {
        &self.staged
    }

    /// Where the file lands when published.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// Move the staged file to its final path.
    pub fn publish(self) -> PipelineResult<PathBuf> {
        let target = self.target.clone();
        self.settle(&target)
    }

    /// Keep the staged file as `<path>.rejected` for inspection.
    pub fn reject(self) -> PipelineResult<PathBuf> {
        let rejected = sibling_path(&self.target, ".rejected");
        self.settle(&rejected)
    }

    /// Delete the staged file.
    pub fn discard(self) {
        drop(self);
    }

    fn settle(mut self, to: &Path) -> PipelineResult<PathBuf> {
        fs::rename(&self.staged, to).map_err(|e| PipelineError::output_write(to, e))?;
        self.settled = true;
        Ok(to.to_path_buf())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.settled {
            let _ = fs::remove_file(&self.staged);
        }
    }
}

/// Convert a typed batch into an Arrow record batch matching `arrow_schema`.
pub fn to_record_batch(arrow_schema: &SchemaRef, batch: &Batch) -> Result<RecordBatch, String> {
    let columns = batch
        .schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            column_array(&batch.rows, idx, field.data_type).map_err(|m| format!("column '{}': {m}", field.name))
        })
        .collect::<Result<Vec<_>, String>>()?;
    RecordBatch::try_new(Arc::clone(arrow_schema), columns).map_err(|e| e.to_string())
}

macro_rules! primitive_column {
    ($rows:expr, $idx:expr, $builder:ty, $variant:ident) => {{
        let mut b = <$builder>::with_capacity($rows.len());
        for (i, row) in $rows.iter().enumerate() {
            match &row[$idx] {
                Value::$variant(v) => b.append_value(*v),
                Value::Null => b.append_null(),
                other => return Err(mismatch(i, stringify!($variant), other)),
            }
        }
        Arc::new(b.finish()) as ArrayRef
    }};
}

fn column_array(rows: &[Vec<Value>], idx: usize, data_type: DataType) -> Result<ArrayRef, String> {
    let array = match data_type {
        DataType::Utf8 => {
            let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 16);
            for (i, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Utf8(s) => b.append_value(s),
                    Value::Null => b.append_null(),
                    other => return Err(mismatch(i, "Utf8", other)),
                }
            }
            Arc::new(b.finish()) as ArrayRef
        }
        DataType::Int16 => primitive_column!(rows, idx, Int16Builder, Int16),
        DataType::Int32 => primitive_column!(rows, idx, Int32Builder, Int32),
        DataType::Int64 => primitive_column!(rows, idx, Int64Builder, Int64),
        DataType::Float64 => primitive_column!(rows, idx, Float64Builder, Float64),
        DataType::Bool => {
            let mut b = BooleanBuilder::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Bool(v) => b.append_value(*v),
                    Value::Null => b.append_null(),
                    other => return Err(mismatch(i, "Bool", other)),
                }
            }
            Arc::new(b.finish()) as ArrayRef
        }
        DataType::ListUtf8 => {
            let mut b = ListBuilder::new(StringBuilder::new());
            for (i, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::List(items) => {
                        for item in items {
                            match item {
                                Value::Utf8(s) => b.values().append_value(s),
                                Value::Null => b.values().append_null(),
                                other => return Err(mismatch(i, "Utf8 list element", other)),
                            }
                        }
                        b.append(true);
                    }
                    Value::Null => b.append(false),
                    other => return Err(mismatch(i, "List", other)),
                }
            }
            Arc::new(b.finish()) as ArrayRef
        }
        DataType::ListInt16 => {
            let mut b = ListBuilder::new(Int16Builder::new());
            for (i, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::List(items) => {
                        for item in items {
                            match item {
                                Value::Int16(v) => b.values().append_value(*v),
                                Value::Null => b.values().append_null(),
                                other => return Err(mismatch(i, "Int16 list element", other)),
                            }
                        }
                        b.append(true);
                    }
                    Value::Null => b.append(false),
                    other => return Err(mismatch(i, "List", other)),
                }
            }
            Arc::new(b.finish()) as ArrayRef
        }
    };
    Ok(array)
}

fn mismatch(row: usize, expected: &str, found: &Value) -> String {
    format!("row {row} in batch: expected {expected}, found {found:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(
            "t",
            vec![
                Field::new("id", DataType::Utf8),
                Field::new("served", DataType::ListInt16),
            ],
        ))
    }

    #[test]
    fn publish_moves_the_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out.parquet");
        let schema = schema();
        let mut stats = RunningStats::new(&schema, &["id".into()], None).unwrap();
        let mut sink = ParquetSink::create(&out, Arc::clone(&schema), &SinkOptions::default()).unwrap();
        sink.write(
            &Batch::new(
                Arc::clone(&schema),
                vec![
                    vec![Value::Utf8("a".into()), Value::List(vec![Value::Int16(96), Value::Null])],
                    vec![Value::Null, Value::Null],
                ],
            ),
            &mut stats,
        )
        .unwrap();
        let (staged, snapshot) = sink.finish(stats).unwrap();
        assert_eq!(snapshot.row_count, 2);
        assert_eq!(snapshot.non_null_count("id"), Some(1));
        assert!(staged.path().exists());
        assert!(!out.exists());

        let published = staged.publish().unwrap();
        assert_eq!(published, out);
        assert!(out.exists());
        assert!(!sibling_path(&out, ".part").exists());
    }

    #[test]
    fn dropping_an_unfinished_sink_removes_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.parquet");
        let sink = ParquetSink::create(&out, schema(), &SinkOptions::default()).unwrap();
        assert!(sibling_path(&out, ".part").exists());
        drop(sink);
        assert!(!sibling_path(&out, ".part").exists());
        assert!(!out.exists());
    }

    #[test]
    fn rejected_output_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.parquet");
        let schema = schema();
        let stats = RunningStats::new(&schema, &[], None).unwrap();
        let sink = ParquetSink::create(&out, schema, &SinkOptions { codec: Codec::Snappy, ..SinkOptions::default() })
            .unwrap();
        let (staged, _) = sink.finish(stats).unwrap();
        let kept = staged.reject().unwrap();
        assert!(kept.ends_with("out.parquet.rejected"));
        assert!(kept.exists());
        assert!(!out.exists());
    }

    #[test]
    fn type_mismatch_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema();
        let mut stats = RunningStats::new(&schema, &[], None).unwrap();
        let mut sink = ParquetSink::create(dir.path().join("o.parquet"), Arc::clone(&schema), &SinkOptions::default())
            .unwrap();
        let err = sink
            .write(
                &Batch::new(Arc::clone(&schema), vec![vec![Value::Int64(1), Value::Null]]),
                &mut stats,
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputWrite { .. }));
    }
}
