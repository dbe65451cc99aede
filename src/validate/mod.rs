//! Post-hoc validation of a written output against its source.
//!
//! The validator runs after the sink closes and never trusts the conversion code path: the
//! output is decoded from disk and the source is re-read from the start.
//!
//! Tiers run in increasing cost order and stop at the first failure:
//!
//! 1. [`Tier::Structural`]: output row count from the file metadata against the written row
//!    count (pass-through jobs) or a fresh distinct-key count over the source (aggregation jobs).
//! 2. [`Tier::Statistical`]: the sum column and per-column non-null counts recomputed from the
//!    output, then a duplicate scan over the output key.
//! 3. [`Tier::SampleExact`]: randomly sampled output rows re-derived from the source, field by
//!    field.
//!
//! A disabled tier is reported as [`TierStatus::Skipped`]; tiers after a failure are
//! [`TierStatus::NotRun`]. Failures are values in the [`Verdict`], not errors: `validate`
//! returns `Err` only when the output or source cannot be read at all.

pub mod compare;
pub mod output;
mod sample;
mod source_scan;
mod statistical;
mod structural;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult, ValidationFailure};
use crate::execution::JobSpec;
use crate::sink::StatsSnapshot;
use crate::source::SourceHandle;
use crate::types::Schema;

pub use compare::{source_matches, values_match};
pub use output::{OutputFile, decode_value};

/// Default number of output rows compared field by field.
pub const DEFAULT_SAMPLE_SIZE: usize = 1_000;

/// One validation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Row count.
    Structural,
    /// Checksums and key uniqueness.
    Statistical,
    /// Field-by-field comparison of a random sample.
    SampleExact,
}

impl Tier {
    /// All tiers in execution order.
    pub const ALL: [Tier; 3] = [Tier::Structural, Tier::Statistical, Tier::SampleExact];

    pub fn name(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Statistical => "statistical",
            Self::SampleExact => "sample-exact",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the sample tier does when more rows are requested than the output holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleOverflow {
    /// Compare every output row once.
    #[default]
    Clip,
    /// Draw the requested number of rows with replacement.
    WithReplacement,
}

/// Options controlling validation.
///
/// Use [`Default`] for common cases: all tiers on, 1000 samples, unseeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOptions {
    pub structural: bool,
    pub statistical: bool,
    pub sample_exact: bool,
    /// Rows (or keys) compared by the sample tier. Zero passes trivially.
    pub sample_size: usize,
    /// Seed for reproducible sampling; `None` draws from the OS.
    pub seed: Option<u64>,
    pub overflow: SampleOverflow,
    /// Absolute tolerance for the sum check.
    pub sum_tolerance: f64,
    /// Relative tolerance for float comparisons in the sample tier.
    pub float_tolerance: f64,
    /// Upper bound on duplicate keys listed in a failure.
    pub max_reported_duplicates: usize,
    /// Rows per batch when re-reading the source and the output.
    pub batch_size: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            structural: true,
            statistical: true,
            sample_exact: true,
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: None,
            overflow: SampleOverflow::Clip,
            sum_tolerance: 0.01,
            float_tolerance: 1e-6,
            max_reported_duplicates: 10,
            batch_size: 65_536,
        }
    }
}

impl ValidationOptions {
    /// Only the given tiers enabled.
    pub fn only(tiers: &[Tier]) -> Self {
        Self {
            structural: tiers.contains(&Tier::Structural),
            statistical: tiers.contains(&Tier::Statistical),
            sample_exact: tiers.contains(&Tier::SampleExact),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self, tier: Tier) -> bool {
        match tier {
            Tier::Structural => self.structural,
            Tier::Statistical => self.statistical,
            Tier::SampleExact => self.sample_exact,
        }
    }
}

/// Outcome of one tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierStatus {
    Passed,
    Failed(ValidationFailure),
    /// Disabled by the caller.
    Skipped,
    /// Not attempted because an earlier tier failed.
    NotRun,
}

/// One tier's entry in a [`Verdict`].
#[derive(Debug, Clone, PartialEq)]
pub struct TierReport {
    pub tier: Tier,
    pub status: TierStatus,
    /// Number of individual comparisons made.
    pub checks: u64,
    /// What was compared, for logs and reports.
    pub summary: String,
}

/// The immutable result of validating one output.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    tiers: Vec<TierReport>,
}

impl Verdict {
    /// True when no tier failed. Skipped tiers do not fail a verdict.
    pub fn passed(&self) -> bool {
        self.failure().is_none()
    }

    /// The first failure, if any.
    pub fn failure(&self) -> Option<&ValidationFailure> {
        self.tiers.iter().find_map(|t| match &t.status {
            TierStatus::Failed(f) => Some(f),
            _ => None,
        })
    }

    /// The tier that failed, if any.
    pub fn failed_tier(&self) -> Option<Tier> {
        self.tiers
            .iter()
            .find(|t| matches!(t.status, TierStatus::Failed(_)))
            .map(|t| t.tier)
    }

    pub fn tier(&self, tier: Tier) -> Option<&TierReport> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn tiers(&self) -> &[TierReport] {
        &self.tiers
    }
}

/// Result of a tier that ran to completion.
pub(crate) struct TierCheck {
    pub(crate) checks: u64,
    pub(crate) summary: String,
}

/// Everything a tier needs, borrowed for the duration of one validation.
pub(crate) struct ValidationContext<'a> {
    pub(crate) job: &'a JobSpec,
    pub(crate) source: &'a SourceHandle,
    pub(crate) output: OutputFile,
    pub(crate) output_schema: Arc<Schema>,
    pub(crate) stats: &'a StatsSnapshot,
    pub(crate) options: &'a ValidationOptions,
}

/// Validate `output` (the closed file written by `job`) against `source`.
///
/// `stats` are the statistics frozen when the sink closed.
pub fn validate(
    job: &JobSpec,
    source: &SourceHandle,
    output: &Path,
    stats: &StatsSnapshot,
    options: &ValidationOptions,
) -> PipelineResult<Verdict> {
    if options.batch_size == 0 {
        return Err(PipelineError::config("validation batch_size must be > 0"));
    }
    let ctx = ValidationContext {
        job,
        source,
        output: OutputFile::open(output)?,
        output_schema: job.output_schema()?,
        stats,
        options,
    };

    let mut tiers = Vec::with_capacity(Tier::ALL.len());
    let mut failed = false;
    for tier in Tier::ALL {
        if failed {
            tiers.push(TierReport {
                tier,
                status: TierStatus::NotRun,
                checks: 0,
                summary: String::new(),
            });
            continue;
        }
        if !options.is_enabled(tier) {
            info!(job = %job.name, %tier, "validation tier skipped");
            tiers.push(TierReport {
                tier,
                status: TierStatus::Skipped,
                checks: 0,
                summary: "disabled".to_owned(),
            });
            continue;
        }

        let outcome = match tier {
            Tier::Structural => structural::run(&ctx),
            Tier::Statistical => statistical::run(&ctx),
            Tier::SampleExact => sample::run(&ctx),
        };
        let report = match outcome {
            Ok(check) => {
                info!(job = %job.name, %tier, checks = check.checks, summary = %check.summary, "validation tier passed");
                TierReport {
                    tier,
                    status: TierStatus::Passed,
                    checks: check.checks,
                    summary: check.summary,
                }
            }
            Err(PipelineError::Validation(failure)) => {
                warn!(job = %job.name, %tier, %failure, "validation tier failed");
                failed = true;
                TierReport {
                    tier,
                    status: TierStatus::Failed(failure.clone()),
                    checks: 0,
                    summary: failure.to_string(),
                }
            }
            Err(other) => return Err(other),
        };
        tiers.push(report);
    }

    Ok(Verdict { tiers })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(tier: Tier, status: TierStatus) -> TierReport {
        TierReport {
            tier,
            status,
            checks: 0,
            summary: String::new(),
        }
    }

    #[test]
    fn skipped_tiers_do_not_fail_a_verdict() {
        let verdict = Verdict {
            tiers: vec![
                report(Tier::Structural, TierStatus::Passed),
                report(Tier::Statistical, TierStatus::Skipped),
                report(Tier::SampleExact, TierStatus::Passed),
            ],
        };
        assert!(verdict.passed());
        assert_eq!(verdict.failed_tier(), None);
    }

    #[test]
    fn failure_is_reported_with_its_tier() {
        let failure = ValidationFailure::RowCountMismatch { expected: 3, actual: 2 };
        let verdict = Verdict {
            tiers: vec![
                report(Tier::Structural, TierStatus::Failed(failure.clone())),
                report(Tier::Statistical, TierStatus::NotRun),
                report(Tier::SampleExact, TierStatus::NotRun),
            ],
        };
        assert!(!verdict.passed());
        assert_eq!(verdict.failure(), Some(&failure));
        assert_eq!(verdict.failed_tier(), Some(Tier::Structural));
        assert_eq!(failure.tier(), Tier::Structural);
    }

    #[test]
    fn only_enables_the_named_tiers() {
        let opts = ValidationOptions::only(&[Tier::Statistical]);
        assert!(!opts.is_enabled(Tier::Structural));
        assert!(opts.is_enabled(Tier::Statistical));
        assert!(!opts.is_enabled(Tier::SampleExact));
    }
}
