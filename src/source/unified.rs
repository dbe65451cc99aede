//! Unified source entry point.
//!
//! Most callers should use [`SourceHandle::resolve`] followed by [`SourceHandle::open`]:
//!
//! - the locator is checked against a [`SourcePolicy`] before any I/O happens
//! - remote sources are downloaded once (with retry) into a local spool file
//! - if [`ReaderOptions::format`] is `None`, the format is inferred from the file name
//! - every call to `open` starts a fresh pass over the source, which is what the validator
//!   relies on to re-read the source independently of the conversion pass

use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::types::RawBatch;

use super::csv::CsvBatchReader;
use super::locator::{SourceLocator, SourcePolicy};
use super::parquet::ParquetBatchReader;
use super::remote::{self, RetryPolicy};

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// A finite, ordered stream of raw batches.
///
/// Each item is either a batch or the read error that ended the stream.
pub trait BatchSource: Iterator<Item = PipelineResult<RawBatch>> {
    /// Column names carried by every batch, in order.
    fn columns(&self) -> &[String];
}

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text, optionally gzip-compressed.
    Csv,
    /// Apache Parquet.
    Parquet,
}

impl SourceFormat {
    /// Parse a source format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }

    /// Infer the format from a file name, looking through a trailing `.gz`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::from_extension(&inner_extension(name)?)
    }
}

/// Extension of `name` with any trailing `.gz` removed, lower-cased.
fn inner_extension(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".gz").unwrap_or(&lower);
    stem.rsplit_once('.').map(|(_, ext)| ext.to_owned())
}

/// Delimiter implied by a file name: tab for `.tsv`, comma for everything else.
pub fn delimiter_for(name: &str) -> u8 {
    match inner_extension(name).as_deref() {
        Some("tsv") => b'\t',
        _ => b',',
    }
}

/// Character encoding of text sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Strict UTF-8; invalid bytes are a read error.
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to one character.
    Latin1,
}

impl Encoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| format!("invalid UTF-8: {e}")),
            Self::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Options controlling how a source is read.
///
/// Use [`Default`] for common cases.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderOptions {
    /// Maximum rows per batch. Must be greater than zero.
    pub batch_size: usize,
    /// If `None`, infer from the file name.
    pub format: Option<SourceFormat>,
    /// Text encoding for CSV sources.
    pub encoding: Encoding,
    /// Field delimiter for CSV sources. If `None`, tab for `.tsv` names and comma otherwise.
    pub delimiter: Option<u8>,
    /// Require the source to hold exactly the declared columns.
    pub strict_columns: bool,
    /// Retry policy for remote sources.
    pub retry: RetryPolicy,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            format: None,
            encoding: Encoding::Utf8,
            delimiter: None,
            strict_columns: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// A vetted source that can be opened any number of times.
pub struct SourceHandle {
    locator: SourceLocator,
    format: SourceFormat,
    local_path: PathBuf,
    options: ReaderOptions,
    spool: Option<NamedTempFile>,
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("locator", &self.locator)
            .field("format", &self.format)
            .field("local_path", &self.local_path)
            .field("spooled", &self.spool.is_some())
            .finish()
    }
}

impl SourceHandle {
    /// Check the locator against `policy`, then make the source locally readable.
    ///
    /// Rejections ([`PipelineError::InvalidSource`]) happen before any network or file access
    /// beyond path canonicalization.
    pub fn resolve(
        locator: &SourceLocator,
        policy: &SourcePolicy,
        options: &ReaderOptions,
    ) -> PipelineResult<Self> {
        policy.check(locator)?;
        if options.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be > 0"));
        }
        let format = match options.format {
            Some(f) => f,
            None => locator
                .file_name()
                .as_deref()
                .and_then(SourceFormat::from_file_name)
                .ok_or_else(|| PipelineError::InvalidSource {
                    locator: locator.to_string(),
                    reason: "cannot infer the source format; set ReaderOptions::format".to_owned(),
                })?,
        };

        let (local_path, spool) = match locator {
            SourceLocator::Local(path) => (path.clone(), None),
            SourceLocator::Remote { url, .. } => {
                let suffix = locator
                    .file_name()
                    .and_then(|n| n.find('.').map(|i| n[i..].to_owned()))
                    .unwrap_or_default();
                let spool = remote::fetch_to_spool(url, &suffix, &options.retry, policy)?;
                info!(url = %url, spool = %spool.path().display(), "remote source spooled");
                (spool.path().to_path_buf(), Some(spool))
            }
        };

        let mut options = options.clone();
        if options.delimiter.is_none() {
            let name = locator.file_name().unwrap_or_default();
            options.delimiter = Some(delimiter_for(&name));
        }

        Ok(Self {
            locator: locator.clone(),
            format,
            local_path,
            options,
            spool,
        })
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Local file the readers open (the spool file for remote sources).
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Start a fresh pass over the source yielding the `required` columns.
    pub fn open(&self, required: &[String]) -> PipelineResult<Box<dyn BatchSource>> {
        self.open_with_batch_size(required, self.options.batch_size)
    }

    /// Like [`Self::open`] with a different batch size.
    pub fn open_with_batch_size(
        &self,
        required: &[String],
        batch_size: usize,
    ) -> PipelineResult<Box<dyn BatchSource>> {
        if batch_size == 0 {
            return Err(PipelineError::config("batch_size must be > 0"));
        }
        let options = ReaderOptions {
            batch_size,
            ..self.options.clone()
        };
        let locator = self.locator.to_string();
        Ok(match self.format {
            SourceFormat::Csv => Box::new(CsvBatchReader::open(&self.local_path, &locator, required, &options)?),
            SourceFormat::Parquet => {
                Box::new(ParquetBatchReader::open(&self.local_path, &locator, required, &options)?)
            }
        })
    }
}

/// Resolve and open a source in one step.
pub fn open_source(
    locator: &SourceLocator,
    policy: &SourcePolicy,
    required: &[String],
    options: &ReaderOptions,
) -> PipelineResult<(SourceHandle, Box<dyn BatchSource>)> {
    let handle = SourceHandle::resolve(locator, policy, options)?;
    let reader = handle.open(required)?;
    Ok((handle, reader))
}
