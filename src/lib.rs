//! `tabular-certify` converts large row-oriented sources (CSV, gzip CSV, Parquet) into Parquet
//! under a declared [`types::Schema`], and certifies every output with three independent
//! validation tiers before publishing it.
//!
//! The primary entrypoint is [`execution::run_job`], which drives one [`execution::JobSpec`]
//! through the job state machine:
//!
//! ```text
//! Reading → Coercing → [Aggregating] → Writing → Validating → Passed | Failed(tier)
//! ```
//!
//! ## What a job does
//!
//! - **Source**: the locator (local path or `https` URL) is checked against a
//!   [`source::SourcePolicy`] allow-list before any access; remote files are fetched with bounded
//!   retry. Rows are read in bounded batches.
//! - **Filter / coerce**: an optional [`processing::Predicate`] selects qualifying rows; every
//!   value is coerced to its declared type, or the job fails with row and column context.
//! - **Aggregate** (optional): rows are grouped by key with declared [`processing::Reducer`]s.
//! - **Write**: batches go to `<output>.part` while running statistics are recorded.
//! - **Validate**: row count, checksums and key uniqueness, then a random sample compared field
//!   by field against the source. Only a passing output is renamed to `<output>`.
//!
//! Many jobs can run concurrently on an [`execution::ExecutionEngine`].
//!
//! ## Quick example: convert a CSV file
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tabular_certify::execution::{JobOptions, JobSpec, run_job};
//! use tabular_certify::source::{SourceLocator, SourcePolicy};
//! use tabular_certify::types::{DataType, Field, Schema};
//!
//! # fn main() -> Result<(), tabular_certify::PipelineError> {
//! let schema = Arc::new(Schema::new(
//!     "contributions",
//!     vec![
//!         Field::new("transaction_id", DataType::Utf8).from_source("transaction.id"),
//!         Field::new("amount", DataType::Float64),
//!     ],
//! ));
//! let job = JobSpec::pass_through("contributions", SourceLocator::local("data/in.csv"), "data/out.parquet", schema)
//!     .with_unique_key(&["transaction_id"])
//!     .with_tracked_columns(&["transaction_id", "amount"])
//!     .with_sum_column("amount");
//! let options = JobOptions {
//!     policy: SourcePolicy::from_env().allow_path_prefix("data"),
//!     ..JobOptions::default()
//! };
//! let report = run_job(&job, &options)?.into_result()?;
//! println!("rows={} sum={:?}", report.rows_written, report.stats.sum);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`source`]: allow-list, remote fetch with retry, CSV/Parquet batch readers
//! - [`processing`]: row predicates, schema coercion, grouped aggregation
//! - [`sink`]: staged Parquet writer and running statistics
//! - [`validate`]: the three validation tiers
//! - [`execution`]: job state machine, multi-job engine, observers and metrics
//! - [`catalog`]: built-in DIME and Voteview record types and derived jobs
//! - [`config`]: environment overrides
//! - [`types`]: schema and value types
//! - [`error`]: the error taxonomy

pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod processing;
pub mod sink;
pub mod source;
pub mod types;
pub mod validate;

pub use error::{PipelineError, PipelineResult, Stage, ValidationFailure};
