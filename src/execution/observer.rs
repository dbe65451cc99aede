use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::sink::StatsSnapshot;
use crate::validate::TierReport;

use super::job::JobState;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal, e.g. cancellation).
    Warning,
    /// Error-level event (job failed or output rejected).
    Error,
    /// Critical error (source or output I/O failures).
    Critical,
}

/// Events emitted while a job runs.
#[derive(Debug, Clone)]
pub enum JobEvent {
    JobStarted { job: String, source: String },
    StateChanged { job: String, state: JobState },
    /// One source batch read, filtered and handed downstream.
    BatchProcessed { job: String, rows_read: u64, rows_qualifying: u64 },
    TierFinished { job: String, report: TierReport },
    JobFinished {
        job: String,
        state: JobState,
        rows_written: u64,
        stats: StatsSnapshot,
        elapsed: Duration,
    },
    JobFailed { job: String, severity: Severity, error: String },
    /// A job waited for an execution slot.
    ThrottleWaited { job: String, duration: Duration },
}

impl JobEvent {
    pub fn job(&self) -> &str {
        match self {
            Self::JobStarted { job, .. }
            | Self::StateChanged { job, .. }
            | Self::BatchProcessed { job, .. }
            | Self::TierFinished { job, .. }
            | Self::JobFinished { job, .. }
            | Self::JobFailed { job, .. }
            | Self::ThrottleWaited { job, .. } => job,
        }
    }
}

/// Observer hook for job events.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait JobObserver: Send + Sync {
    fn on_event(&self, _event: &JobEvent) {}

    /// Called when a failure meets the alert threshold.
    fn on_alert(&self, _job: &str, _severity: Severity, _error: &PipelineError) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn JobObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn JobObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl JobObserver for CompositeObserver {
    fn on_event(&self, event: &JobEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }

    fn on_alert(&self, job: &str, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(job, severity, error);
        }
    }
}

/// Forwards job events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_event(&self, event: &JobEvent) {
        match event {
            JobEvent::JobStarted { job, source } => info!(%job, %source, "job started"),
            JobEvent::StateChanged { job, state } => debug!(%job, %state, "job state"),
            JobEvent::BatchProcessed {
                job,
                rows_read,
                rows_qualifying,
            } => debug!(%job, rows_read, rows_qualifying, "batch processed"),
            JobEvent::TierFinished { job, report } => {
                info!(%job, tier = %report.tier, status = ?report.status, "validation tier finished");
            }
            JobEvent::JobFinished {
                job,
                state,
                rows_written,
                elapsed,
                ..
            } => info!(%job, %state, rows_written, ?elapsed, "job finished"),
            JobEvent::JobFailed { job, severity, error } => warn!(%job, ?severity, %error, "job failed"),
            JobEvent::ThrottleWaited { job, duration } => debug!(%job, ?duration, "job throttled"),
        }
    }

    fn on_alert(&self, job: &str, severity: Severity, err: &PipelineError) {
        error!(%job, ?severity, error = %err, "ALERT");
    }
}

/// Appends job events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl JobObserver for FileObserver {
    fn on_event(&self, event: &JobEvent) {
        let line = match event {
            JobEvent::JobStarted { job, source } => format!("{} start job={job} source={source}", unix_ts()),
            JobEvent::TierFinished { job, report } => format!(
                "{} tier job={job} tier={} status={:?} checks={}",
                unix_ts(),
                report.tier,
                report.status,
                report.checks
            ),
            JobEvent::JobFinished {
                job,
                state,
                rows_written,
                stats,
                elapsed,
            } => format!(
                "{} finish job={job} state={state} rows={rows_written} elapsed_ms={} stats={}",
                unix_ts(),
                elapsed.as_millis(),
                serde_json::to_string(stats).unwrap_or_default()
            ),
            JobEvent::JobFailed { job, severity, error } => {
                format!("{} fail job={job} severity={severity:?} err={error}", unix_ts())
            }
            // Per-batch and per-state events are too chatty for the log file.
            _ => return,
        };
        self.append_line(&line);
    }

    fn on_alert(&self, job: &str, severity: Severity, error: &PipelineError) {
        self.append_line(&format!("{} ALERT severity={severity:?} job={job} err={error}", unix_ts()));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Real-time counters for an [`super::ExecutionEngine`].
///
/// The engine updates these during `run_all`; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    jobs_started: AtomicU64,
    jobs_passed: AtomicU64,
    jobs_failed: AtomicU64,
    rows_written: AtomicU64,
    batches_written: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_jobs: AtomicUsize,
    max_active_jobs: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            jobs_started: AtomicU64::new(0),
            jobs_passed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_jobs: AtomicUsize::new(0),
            max_active_jobs: AtomicUsize::new(0),
        }
    }

    pub fn on_job_start(&self) {
        let _ = self.jobs_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_jobs, now);
    }

    /// Record a finished job. Jobs that errored or whose output was rejected count as failed.
    pub fn on_job_end(&self, passed: bool, rows_written: u64, batches_written: u64) {
        if passed {
            let _ = self.jobs_passed.fetch_add(1, Ordering::SeqCst);
        } else {
            let _ = self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        }
        let _ = self.rows_written.fetch_add(rows_written, Ordering::SeqCst);
        let _ = self.batches_written.fetch_add(batches_written, Ordering::SeqCst);
        let _ = self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let add = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        ExecutionMetricsSnapshot {
            jobs_started: self.jobs_started.load(Ordering::SeqCst),
            jobs_passed: self.jobs_passed.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            rows_written: self.rows_written.load(Ordering::SeqCst),
            batches_written: self.batches_written.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_jobs: self.max_active_jobs.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_passed: u64,
    pub jobs_failed: u64,
    pub rows_written: u64,
    pub batches_written: u64,
    pub throttle_wait: Duration,
    pub max_active_jobs: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "jobs={}/{} passed, failed={}, rows_written={}, batches_written={}, max_active_jobs={}, throttle_wait={:?}",
            self.jobs_passed,
            self.jobs_started,
            self.jobs_failed,
            self.rows_written,
            self.batches_written,
            self.max_active_jobs,
            self.throttle_wait
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_for_thresholds() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn file_observer_appends_failures_and_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("jobs.log");
        let obs = FileObserver::new(&log);
        obs.on_event(&JobEvent::JobFailed {
            job: "members".into(),
            severity: Severity::Critical,
            error: "disk full".into(),
        });
        obs.on_event(&JobEvent::BatchProcessed {
            job: "members".into(),
            rows_read: 10,
            rows_qualifying: 10,
        });
        obs.on_alert("members", Severity::Critical, &PipelineError::config("bad"));

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("fail job=members severity=Critical err=disk full"));
        assert!(lines[1].contains("ALERT severity=Critical job=members"));
    }

    #[test]
    fn metrics_track_peak_concurrency() {
        let m = ExecutionMetrics::new();
        m.on_job_start();
        m.on_job_start();
        m.on_job_end(true, 5, 1);
        m.on_job_start();
        m.on_job_end(false, 0, 0);
        m.on_job_end(true, 7, 2);
        let snap = m.snapshot();
        assert_eq!(snap.jobs_started, 3);
        assert_eq!(snap.jobs_passed, 2);
        assert_eq!(snap.jobs_failed, 1);
        assert_eq!(snap.rows_written, 12);
        assert_eq!(snap.batches_written, 3);
        assert_eq!(snap.max_active_jobs, 2);
    }
}
