use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::execution::Severity;
use crate::validate::Tier;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by every stage of a conversion job.
///
/// Stage errors abort the job. Validation failures are carried in [`PipelineError::Validation`]
/// so that callers can tell "the output is wrong" apart from "the job could not run".
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The locator is outside the allow-list, malformed, or names an unknown format.
    /// Raised before any network or filesystem access.
    #[error("invalid source '{locator}': {reason}")]
    InvalidSource { locator: String, reason: String },

    /// The source could not be opened, fetched, or parsed (including header/schema problems).
    #[error("failed to read source '{locator}': {message}")]
    SourceRead { locator: String, message: String },

    /// A source value could not be converted to its declared type.
    #[error("failed to coerce value at row {row} column '{column}': {message} (raw='{raw}')")]
    Coercion {
        row: u64,
        column: String,
        raw: String,
        message: String,
    },

    /// A field transform rejected its input.
    #[error("transform failed at row {row} column '{column}': {message} (raw='{raw}')")]
    Transform {
        row: u64,
        column: String,
        raw: String,
        message: String,
    },

    /// A reducer is incompatible with its input column, or overflowed.
    #[error("aggregation error on '{column}': {message}")]
    Aggregation { column: String, message: String },

    /// The output file could not be created, written, closed, or published.
    #[error("failed to write output '{}': {message}", .path.display())]
    OutputWrite { path: PathBuf, message: String },

    /// The output file could not be read back during validation.
    #[error("failed to read output '{}': {message}", .path.display())]
    OutputRead { path: PathBuf, message: String },

    /// A job definition or configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// The job was cancelled between batches.
    #[error("job '{job}' was cancelled")]
    Cancelled { job: String },

    /// The output was written but failed a validation tier.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}

impl PipelineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn source_read(locator: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::SourceRead {
            locator: locator.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn output_write(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::OutputWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn output_read(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::OutputRead {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// The job stage that raised the error; `None` for configuration errors and cancellation.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidSource { .. } | Self::SourceRead { .. } => Some(Stage::Reading),
            Self::Coercion { .. } | Self::Transform { .. } => Some(Stage::Coercing),
            Self::Aggregation { .. } => Some(Stage::Aggregating),
            Self::OutputWrite { .. } => Some(Stage::Writing),
            Self::OutputRead { .. } | Self::Validation(_) => Some(Stage::Validating),
            Self::Config { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Severity used for observer alerts. I/O failures on either end of the job are critical.
    pub fn severity(&self) -> Severity {
        match self {
            Self::SourceRead { .. } | Self::OutputWrite { .. } | Self::OutputRead { .. } => Severity::Critical,
            Self::Cancelled { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// The validation failure, if this error is one.
    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(f) => Some(f),
            _ => None,
        }
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Reading,
    Coercing,
    Aggregating,
    Writing,
    Validating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reading => "reading",
            Self::Coercing => "coercing",
            Self::Aggregating => "aggregating",
            Self::Writing => "writing",
            Self::Validating => "validating",
        })
    }
}

/// A count or sum compared by the statistical tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Count(u64),
    Sum(f64),
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n} non-null"),
            Self::Sum(v) => write!(f, "sum {v}"),
        }
    }
}

/// Why a written output was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("row count mismatch: expected {expected}, found {actual}")]
    RowCountMismatch { expected: u64, actual: u64 },

    #[error("checksum mismatch on '{column}': expected {expected}, found {actual}")]
    ChecksumMismatch {
        column: String,
        expected: Measure,
        actual: Measure,
    },

    /// `duplicates` holds at most a handful of offending keys; `total` counts all of them.
    #[error(
        "duplicate keys on ({}): {total} key(s) repeated, e.g. {}",
        .key_columns.join(", "),
        format_duplicates(.duplicates)
    )]
    DuplicateKey {
        key_columns: Vec<String>,
        duplicates: Vec<(String, u64)>,
        total: u64,
    },

    #[error("sample mismatch for {identity} column '{column}': expected {expected}, found {actual}")]
    SampleMismatch {
        identity: String,
        column: String,
        expected: String,
        actual: String,
    },
}

impl ValidationFailure {
    /// The tier that reports this kind of failure.
    pub fn tier(&self) -> Tier {
        match self {
            Self::RowCountMismatch { .. } => Tier::Structural,
            Self::ChecksumMismatch { .. } | Self::DuplicateKey { .. } => Tier::Statistical,
            Self::SampleMismatch { .. } => Tier::SampleExact,
        }
    }
}

fn format_duplicates(duplicates: &[(String, u64)]) -> String {
    duplicates
        .iter()
        .map(|(key, n)| format!("{key} x{n}"))
        .collect::<Vec<_>>()
        .join(", ")
}
