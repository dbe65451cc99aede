//! Batch source readers.
//!
//! Most callers should use [`SourceHandle`] (from [`unified`]) which:
//!
//! - checks the locator against a [`SourcePolicy`] allow-list before any I/O
//! - fetches remote sources with bounded retry and exponential backoff
//! - opens fresh, bounded-memory passes over CSV (optionally gzip) or Parquet data
//!
//! Format-specific readers are also available under:
//! - [`csv`]
//! - [`parquet`]

pub mod csv;
pub mod locator;
pub mod parquet;
pub mod remote;
pub mod unified;

pub use locator::{DEFAULT_ALLOWED_DOMAIN, SourceLocator, SourcePolicy};
pub use remote::{AttemptError, RetryPolicy, retry_with_backoff};
pub use unified::{
    BatchSource, DEFAULT_BATCH_SIZE, Encoding, ReaderOptions, SourceFormat, SourceHandle, delimiter_for,
    open_source,
};
