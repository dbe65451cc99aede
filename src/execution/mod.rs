//! Job execution: the per-job state machine and an engine that runs many jobs in parallel.
//!
//! This module sits "above" [`crate::source`], [`crate::processing`], [`crate::sink`] and
//! [`crate::validate`] and provides:
//!
//! - [`run_job`]: one job from source to verdict
//! - [`ExecutionEngine`]: a bounded worker pool running independent jobs concurrently
//! - resource limits (concurrently running jobs), real-time metrics and observer hooks

pub mod job;
mod observer;
mod semaphore;

use std::sync::Arc;
use std::time::Duration;

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

pub use job::{CancelToken, JobKind, JobOptions, JobReport, JobSpec, JobState, StageTimings, run_job};
pub use observer::{
    CompositeObserver, ExecutionMetrics, ExecutionMetricsSnapshot, FileObserver, JobEvent, JobObserver, Severity,
    TracingObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on concurrently running jobs.
    ///
    /// This is an additional throttle on top of `num_threads`; each running job holds one
    /// batch (or one set of group accumulators) in memory.
    pub max_in_flight_jobs: usize,
    /// Cancel the remaining jobs after the first job that errors or fails validation.
    pub stop_on_failure: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_jobs: n.max(1),
            stop_on_failure: false,
        }
    }
}

/// Result of one job in [`ExecutionEngine::run_all`].
#[derive(Debug)]
pub struct JobOutcome {
    pub job: String,
    pub result: PipelineResult<JobReport>,
}

impl JobOutcome {
    /// True when the job ran to a passing verdict.
    pub fn passed(&self) -> bool {
        self.result.as_ref().is_ok_and(JobReport::passed)
    }
}

/// Runs independent jobs on a dedicated thread pool.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn JobObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// Fails with [`PipelineError::Config`] if `max_in_flight_jobs == 0`, `num_threads == Some(0)`
    /// or the thread pool cannot be built.
    pub fn new(opts: ExecutionOptions) -> PipelineResult<Self> {
        if opts.max_in_flight_jobs == 0 {
            return Err(PipelineError::config("max_in_flight_jobs must be > 0"));
        }
        if opts.num_threads == Some(0) {
            return Err(PipelineError::config("num_threads must be > 0 when set"));
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("tabular-certify-{i}"))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer. It receives engine events and, for jobs whose options carry no
    /// observer of their own, every job event.
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run every job and return one outcome per job, in input order.
    ///
    /// Jobs share nothing but `options`. With [`ExecutionOptions::stop_on_failure`], the first
    /// failure cancels `options.cancel`, so running jobs stop at their next batch and jobs not
    /// yet started end with [`PipelineError::Cancelled`].
    pub fn run_all(&self, jobs: &[JobSpec], options: &JobOptions) -> Vec<JobOutcome> {
        let mut options = options.clone();
        if options.observer.is_none() {
            options.observer = self.observer.clone();
        }
        let sem = Semaphore::new(self.opts.max_in_flight_jobs);

        let outcomes: Vec<JobOutcome> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let (_permit, waited) = sem.acquire();
                    if waited > Duration::ZERO {
                        self.metrics.on_throttle_wait(waited);
                        if let Some(obs) = &options.observer {
                            obs.on_event(&JobEvent::ThrottleWaited {
                                job: job.name.clone(),
                                duration: waited,
                            });
                        }
                    }

                    self.metrics.on_job_start();
                    let result = run_job(job, &options);
                    let (passed, rows, batches) = match &result {
                        Ok(report) => (report.passed(), report.rows_written, report.stats.batches),
                        Err(_) => (false, 0, 0),
                    };
                    self.metrics.on_job_end(passed, rows, batches);
                    if !passed && self.opts.stop_on_failure {
                        options.cancel.cancel();
                    }
                    JobOutcome {
                        job: job.name.clone(),
                        result,
                    }
                })
                .collect()
        });

        info!(metrics = %self.metrics.snapshot(), "run finished");
        outcomes
    }
}
