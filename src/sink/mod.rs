//! Output side of a job: the Parquet writer and the statistics recorded while writing.

pub mod parquet;
pub mod stats;

pub use self::parquet::{Codec, ParquetSink, SinkOptions, StagedOutput, arrow_schema, sibling_path};
pub use stats::{ColumnSum, CompensatedSum, RunningStats, StatsSnapshot};
