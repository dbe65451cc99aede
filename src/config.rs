//! Environment overrides for the source allow-list and job defaults.
//!
//! | Variable | Effect |
//! |---|---|
//! | `TABULAR_CERTIFY_ALLOWED_DOMAINS` | comma-separated domains replacing the default allow-list |
//! | `TABULAR_CERTIFY_ALLOWED_PATHS` | comma-separated local path prefixes |
//! | `TABULAR_CERTIFY_BATCH_SIZE` | rows per source batch |
//! | `TABULAR_CERTIFY_SAMPLE_SIZE` | rows compared by the sample tier |
//!
//! Unset or blank variables leave the built-in defaults in place. The `from_overrides`
//! constructors take any lookup function, so callers (and tests) need not touch the process
//! environment.

use crate::error::{PipelineError, PipelineResult};
use crate::execution::{JobOptions, JobSpec};
use crate::source::SourcePolicy;

pub const ALLOWED_DOMAINS_VAR: &str = "TABULAR_CERTIFY_ALLOWED_DOMAINS";
pub const ALLOWED_PATHS_VAR: &str = "TABULAR_CERTIFY_ALLOWED_PATHS";
pub const BATCH_SIZE_VAR: &str = "TABULAR_CERTIFY_BATCH_SIZE";
pub const SAMPLE_SIZE_VAR: &str = "TABULAR_CERTIFY_SAMPLE_SIZE";

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl SourcePolicy {
    /// The default policy with overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_overrides(env_lookup)
    }

    /// The default policy with overrides from `lookup`.
    ///
    /// A domain list replaces the default domains; a path list adds local prefixes.
    pub fn from_overrides(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut policy = match non_blank(lookup(ALLOWED_DOMAINS_VAR)) {
            Some(domains) => split_list(&domains).fold(SourcePolicy::deny_all(), |p, d| p.allow_domain(d)),
            None => SourcePolicy::default(),
        };
        if let Some(paths) = non_blank(lookup(ALLOWED_PATHS_VAR)) {
            policy = split_list(&paths).fold(policy, |p, prefix| p.allow_path_prefix(prefix));
        }
        policy
    }
}

/// Job settings that can be overridden per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobDefaults {
    pub batch_size: Option<usize>,
    pub sample_size: Option<usize>,
}

impl JobDefaults {
    pub fn from_env() -> PipelineResult<Self> {
        Self::from_overrides(env_lookup)
    }

    /// Read overrides from `lookup`. Values that are not non-negative integers, or a zero batch
    /// size, are [`PipelineError::Config`] errors.
    pub fn from_overrides(lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        let parse = |key: &str| -> PipelineResult<Option<usize>> {
            non_blank(lookup(key))
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .map_err(|e| PipelineError::config(format!("{key}={v:?}: {e}")))
                })
                .transpose()
        };
        let batch_size = parse(BATCH_SIZE_VAR)?;
        if batch_size == Some(0) {
            return Err(PipelineError::config(format!("{BATCH_SIZE_VAR} must be > 0")));
        }
        Ok(Self {
            batch_size,
            sample_size: parse(SAMPLE_SIZE_VAR)?,
        })
    }

    /// Apply the batch size to a job.
    pub fn apply_to_job(&self, mut job: JobSpec) -> JobSpec {
        if let Some(n) = self.batch_size {
            job.reader.batch_size = n;
        }
        job
    }

    /// Apply the sample size to shared job options.
    pub fn apply_to_options(&self, options: &mut JobOptions) {
        if let Some(n) = self.sample_size {
            options.validation.sample_size = n;
        }
    }
}
