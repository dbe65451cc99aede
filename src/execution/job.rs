//! A single conversion job and its state machine.
//!
//! `Reading → Coercing → [Aggregating] → Writing → Validating → {Passed | Failed(tier)}`
//!
//! Batches are pulled one at a time: the sink finishes appending a batch before the next one is
//! read, so memory stays proportional to the batch size (plus one accumulator per distinct key
//! for aggregation jobs). Any stage error aborts the job and removes the staged output. A
//! validation failure ends the job in [`JobState::Failed`]; its output is never published.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::processing::{Aggregator, Coercer, GroupSpec, Predicate, RowFilter};
use crate::sink::{ParquetSink, RunningStats, SinkOptions, StatsSnapshot};
use crate::source::{ReaderOptions, SourceHandle, SourceLocator, SourcePolicy};
use crate::types::Schema;
use crate::validate::{Tier, ValidationOptions, Verdict, validate};

use super::observer::{JobEvent, JobObserver, Severity};

/// Whether a job copies rows through or groups them.
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// One output row per qualifying source row, in source order.
    PassThrough,
    /// One output row per distinct key.
    Aggregate(GroupSpec),
}

/// Declaration of one conversion job.
///
/// `schema` describes how source columns are coerced. For aggregation jobs the group spec
/// refers to `schema` field names and the output schema is derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    pub source: SourceLocator,
    /// Final output path; the job writes `<output>.part` until validation passes.
    pub output: PathBuf,
    pub schema: Arc<Schema>,
    /// Row-level filter over source columns, applied before coercion.
    pub filter: Option<Predicate>,
    pub kind: JobKind,
    /// Output columns that must be unique in a pass-through output.
    pub unique_key: Vec<String>,
    /// Schema fields identifying a source row, used to find sampled rows in the source.
    /// When empty, sampled rows are located by position.
    pub primary_key: Vec<String>,
    /// Output columns whose non-null counts are recorded and checked.
    pub tracked_columns: Vec<String>,
    /// Numeric output column whose sum is recorded and checked.
    pub sum_column: Option<String>,
    pub reader: ReaderOptions,
}

impl JobSpec {
    pub fn pass_through(
        name: impl Into<String>,
        source: SourceLocator,
        output: impl Into<PathBuf>,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            output: output.into(),
            schema,
            filter: None,
            kind: JobKind::PassThrough,
            unique_key: Vec::new(),
            primary_key: Vec::new(),
            tracked_columns: Vec::new(),
            sum_column: None,
            reader: ReaderOptions::default(),
        }
    }

    /// An aggregation job. Non-null counts of the key columns are tracked by default.
    pub fn aggregate(
        name: impl Into<String>,
        source: SourceLocator,
        output: impl Into<PathBuf>,
        schema: Arc<Schema>,
        group: GroupSpec,
    ) -> Self {
        let tracked_columns = group.key.clone();
        Self {
            tracked_columns,
            kind: JobKind::Aggregate(group),
            ..Self::pass_through(name, source, output, schema)
        }
    }

    /// Add a row filter, combined with any existing one.
    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn with_unique_key(mut self, columns: &[&str]) -> Self {
        self.unique_key = to_strings(columns);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = to_strings(columns);
        self
    }

    pub fn with_tracked_columns(mut self, columns: &[&str]) -> Self {
        self.tracked_columns = to_strings(columns);
        self
    }

    pub fn with_sum_column(mut self, column: impl Into<String>) -> Self {
        self.sum_column = Some(column.into());
        self
    }

    pub fn with_reader(mut self, reader: ReaderOptions) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Source columns read by the job: every field's source column, then filter-only columns.
    pub fn required_source_columns(&self) -> Vec<String> {
        let mut columns = self.schema.source_columns();
        if let Some(filter) = &self.filter {
            for c in filter.columns() {
                if !columns.iter().any(|x| x == c) {
                    columns.push(c.to_owned());
                }
            }
        }
        columns
    }

    pub fn output_schema(&self) -> PipelineResult<Arc<Schema>> {
        match &self.kind {
            JobKind::PassThrough => Ok(Arc::clone(&self.schema)),
            JobKind::Aggregate(group) => group.output_schema(&self.schema).map(Arc::new),
        }
    }

    /// Output columns that must be unique: the group key, or `unique_key` for pass-through jobs.
    pub fn output_key(&self) -> Vec<String> {
        match &self.kind {
            JobKind::PassThrough => self.unique_key.clone(),
            JobKind::Aggregate(group) => group.key.clone(),
        }
    }

    /// Check that every named column exists, returning the output schema.
    pub fn check(&self) -> PipelineResult<Arc<Schema>> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::config("job name must not be empty"));
        }
        let output = self.output_schema()?;
        let in_output = |what: &str, names: &[String]| {
            names.iter().try_for_each(|n| match output.index_of(n) {
                Some(_) => Ok(()),
                None => Err(PipelineError::config(format!(
                    "job '{}': {what} column '{n}' is not in the output schema",
                    self.name
                ))),
            })
        };
        in_output("unique key", &self.unique_key)?;
        in_output("tracked", &self.tracked_columns)?;
        in_output("sum", self.sum_column.as_slice())?;

        if !self.primary_key.is_empty() {
            if matches!(self.kind, JobKind::Aggregate(_)) {
                return Err(PipelineError::config(format!(
                    "job '{}': aggregation jobs are identified by their group key, not a primary key",
                    self.name
                )));
            }
            in_output("primary key", &self.primary_key)?;
        }
        Ok(output)
    }
}

fn to_strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| (*c).to_owned()).collect()
}

/// Shared flag checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options shared by every job of a run.
#[derive(Clone)]
pub struct JobOptions {
    /// Allow-list checked before any source access.
    pub policy: SourcePolicy,
    pub sink: SinkOptions,
    pub validation: ValidationOptions,
    /// Keep a rejected output as `<output>.rejected` instead of deleting it.
    pub keep_rejected: bool,
    pub cancel: CancelToken,
    /// Optional observer for job events and alerts.
    pub observer: Option<Arc<dyn JobObserver>>,
    /// Minimum severity that triggers [`JobObserver::on_alert`].
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for JobOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobOptions")
            .field("policy", &self.policy)
            .field("sink", &self.sink)
            .field("validation", &self.validation)
            .field("keep_rejected", &self.keep_rejected)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            policy: SourcePolicy::default(),
            sink: SinkOptions::default(),
            validation: ValidationOptions::default(),
            keep_rejected: false,
            cancel: CancelToken::new(),
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// Job state. States only move forward; `Passed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Reading,
    Coercing,
    Aggregating,
    Writing,
    Validating,
    Passed,
    Failed { tier: Tier },
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed { .. })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading => f.write_str("reading"),
            Self::Coercing => f.write_str("coercing"),
            Self::Aggregating => f.write_str("aggregating"),
            Self::Writing => f.write_str("writing"),
            Self::Validating => f.write_str("validating"),
            Self::Passed => f.write_str("passed"),
            Self::Failed { tier } => write!(f, "failed ({tier})"),
        }
    }
}

/// Wall-clock time spent per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub reading: Duration,
    pub coercing: Duration,
    pub aggregating: Duration,
    pub writing: Duration,
    pub validating: Duration,
    pub total: Duration,
}

/// Structured result of a job that ran to a verdict.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: String,
    pub source: String,
    /// Published output; `None` unless the job passed.
    pub output: Option<PathBuf>,
    /// Where a rejected output was kept, with `keep_rejected`.
    pub rejected: Option<PathBuf>,
    pub rows_read: u64,
    /// Rows passing the filter.
    pub rows_qualifying: u64,
    pub rows_written: u64,
    /// Groups produced, for aggregation jobs.
    pub distinct_keys: Option<u64>,
    pub stats: StatsSnapshot,
    pub verdict: Verdict,
    pub state: JobState,
    pub timings: StageTimings,
}

impl JobReport {
    pub fn passed(&self) -> bool {
        self.state == JobState::Passed
    }

    /// Turn a failed verdict into [`PipelineError::Validation`].
    pub fn into_result(self) -> PipelineResult<Self> {
        match self.verdict.failure() {
            Some(failure) => Err(PipelineError::Validation(failure.clone())),
            None => Ok(self),
        }
    }
}

/// Run one job to a verdict.
///
/// Returns `Err` when a stage fails or the job is cancelled (the staged output is removed), and
/// `Ok` with [`JobState::Failed`] when the output was written but rejected by validation.
pub fn run_job(job: &JobSpec, options: &JobOptions) -> PipelineResult<JobReport> {
    let mut run = JobRun {
        job,
        options,
        started: Instant::now(),
        state: None,
        timings: StageTimings::default(),
    };
    run.emit(JobEvent::JobStarted {
        job: job.name.clone(),
        source: job.source.to_string(),
    });
    run.execute().inspect_err(|e| run.fail(e))
}

struct JobRun<'a> {
    job: &'a JobSpec,
    options: &'a JobOptions,
    started: Instant,
    state: Option<JobState>,
    timings: StageTimings,
}

impl JobRun<'_> {
    fn execute(&mut self) -> PipelineResult<JobReport> {
        let job = self.job;
        let options = self.options;
        let output_schema = job.check()?;
        self.check_cancelled()?;

        self.advance(JobState::Reading);
        let t = Instant::now();
        let handle = SourceHandle::resolve(&job.source, &options.policy, &job.reader)?;
        let mut reader = handle.open(&job.required_source_columns())?;
        self.timings.reading += t.elapsed();

        let columns = reader.columns().to_vec();
        let filter = job
            .filter
            .clone()
            .map(|p| RowFilter::new(p, &columns, &job.schema))
            .transpose()?;
        let coercer = Coercer::new(Arc::clone(&job.schema), &columns)?;
        let mut aggregator = match &job.kind {
            JobKind::PassThrough => None,
            JobKind::Aggregate(group) => Some(Aggregator::new(&job.schema, group)?),
        };
        let mut stats = RunningStats::new(&output_schema, &job.tracked_columns, job.sum_column.as_deref())?;
        let mut sink = ParquetSink::create(&job.output, Arc::clone(&output_schema), &options.sink)?;

        let (mut rows_read, mut rows_qualifying) = (0u64, 0u64);
        loop {
            self.check_cancelled()?;
            let t = Instant::now();
            let Some(batch) = reader.next() else { break };
            let batch = batch?;
            self.timings.reading += t.elapsed();

            rows_read += batch.row_count() as u64;
            let batch = match &filter {
                Some(f) => f.apply(batch),
                None => batch,
            };
            rows_qualifying += batch.row_count() as u64;

            if batch.row_count() > 0 {
                self.advance(JobState::Coercing);
                let t = Instant::now();
                let typed = coercer.coerce(&batch)?;
                self.timings.coercing += t.elapsed();

                match aggregator.as_mut() {
                    Some(agg) => {
                        self.advance(JobState::Aggregating);
                        let t = Instant::now();
                        agg.push(&typed)?;
                        self.timings.aggregating += t.elapsed();
                    }
                    None => {
                        self.advance(JobState::Writing);
                        let t = Instant::now();
                        sink.write(&typed, &mut stats)?;
                        self.timings.writing += t.elapsed();
                    }
                }
            }
            self.emit(JobEvent::BatchProcessed {
                job: job.name.clone(),
                rows_read,
                rows_qualifying,
            });
        }

        let distinct_keys = aggregator.as_ref().map(|agg| agg.group_count() as u64);
        if let Some(agg) = aggregator {
            self.advance(JobState::Writing);
            let t = Instant::now();
            for batch in agg.into_batches(job.reader.batch_size) {
                self.check_cancelled()?;
                sink.write(&batch, &mut stats)?;
            }
            self.timings.writing += t.elapsed();
        }
        let t = Instant::now();
        let (staged, snapshot) = sink.finish(stats)?;
        self.timings.writing += t.elapsed();
        self.check_cancelled()?;

        self.advance(JobState::Validating);
        let t = Instant::now();
        let verdict = validate(job, &handle, staged.path(), &snapshot, &options.validation)?;
        self.timings.validating += t.elapsed();
        for report in verdict.tiers() {
            self.emit(JobEvent::TierFinished {
                job: job.name.clone(),
                report: report.clone(),
            });
        }

        let (state, output, rejected) = match verdict.failed_tier() {
            None => (JobState::Passed, Some(staged.publish()?), None),
            Some(tier) => {
                let rejected = if options.keep_rejected {
                    Some(staged.reject()?)
                } else {
                    staged.discard();
                    None
                };
                (JobState::Failed { tier }, None, rejected)
            }
        };
        self.advance(state);
        if let Some(failure) = verdict.failure() {
            warn!(job = %job.name, %failure, "output rejected");
            self.alert(&PipelineError::Validation(failure.clone()));
        }

        self.timings.total = self.started.elapsed();
        let report = JobReport {
            job: job.name.clone(),
            source: job.source.to_string(),
            output,
            rejected,
            rows_read,
            rows_qualifying,
            rows_written: snapshot.row_count,
            distinct_keys,
            stats: snapshot,
            verdict,
            state,
            timings: self.timings,
        };
        info!(
            job = %report.job,
            %state,
            rows_read,
            rows_written = report.rows_written,
            elapsed = ?report.timings.total,
            "job finished"
        );
        self.emit(JobEvent::JobFinished {
            job: report.job.clone(),
            state,
            rows_written: report.rows_written,
            stats: report.stats.clone(),
            elapsed: report.timings.total,
        });
        Ok(report)
    }

    /// Move to `state` if it is further along than the current one.
    fn advance(&mut self, state: JobState) {
        if self.state.is_some_and(|s| s >= state) {
            return;
        }
        self.state = Some(state);
        self.emit(JobEvent::StateChanged {
            job: self.job.name.clone(),
            state,
        });
    }

    fn check_cancelled(&self) -> PipelineResult<()> {
        if self.options.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                job: self.job.name.clone(),
            });
        }
        Ok(())
    }

    fn fail(&self, error: &PipelineError) {
        let severity = error.severity();
        warn!(job = %self.job.name, ?severity, %error, "job failed");
        self.emit(JobEvent::JobFailed {
            job: self.job.name.clone(),
            severity,
            error: error.to_string(),
        });
        self.alert(error);
    }

    fn alert(&self, error: &PipelineError) {
        let severity = error.severity();
        if let Some(obs) = &self.options.observer {
            if severity >= self.options.alert_at_or_above {
                obs.on_alert(&self.job.name, severity, error);
            }
        }
    }

    fn emit(&self, event: JobEvent) {
        if let Some(obs) = &self.options.observer {
            obs.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Reducer;
    use crate::types::{DataType, Field};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(
            "t",
            vec![
                Field::new("rid", DataType::Utf8).from_source("bonica.rid"),
                Field::new("amount", DataType::Float64),
            ],
        ))
    }

    #[test]
    fn required_columns_include_filter_only_columns() {
        let job = JobSpec::pass_through("t", SourceLocator::local("in.csv"), "out.parquet", schema())
            .with_filter(Predicate::not_equals("contributor.type", "I"))
            .with_filter(Predicate::not_null("bonica.rid"));
        assert_eq!(
            job.required_source_columns(),
            vec!["bonica.rid".to_string(), "amount".to_string(), "contributor.type".to_string()]
        );
        assert!(matches!(job.filter, Some(Predicate::All(ref parts)) if parts.len() == 2));
    }

    #[test]
    fn check_rejects_unknown_columns() {
        let job = JobSpec::pass_through("t", SourceLocator::local("in.csv"), "out.parquet", schema())
            .with_sum_column("total");
        assert!(matches!(job.check(), Err(PipelineError::Config { .. })));

        let group = GroupSpec::new("by_rid", &["rid"]).column("total", Reducer::Sum("amount".into()));
        let job = JobSpec::aggregate("t", SourceLocator::local("in.csv"), "out.parquet", schema(), group)
            .with_sum_column("total");
        let output = job.check().unwrap();
        assert_eq!(output.field_names().collect::<Vec<_>>(), vec!["rid", "total"]);
        assert_eq!(job.output_key(), vec!["rid".to_string()]);
        assert_eq!(job.tracked_columns, vec!["rid".to_string()]);

        let job = job.with_primary_key(&["rid"]);
        assert!(job.check().is_err());
    }

    #[test]
    fn states_only_move_forward() {
        assert!(JobState::Reading < JobState::Coercing);
        assert!(JobState::Writing < JobState::Validating);
        assert!(JobState::Failed { tier: Tier::Structural }.is_terminal());
        assert_eq!(
            JobState::Failed { tier: Tier::SampleExact }.to_string(),
            "failed (sample-exact)"
        );
    }
}
