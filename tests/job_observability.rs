use std::path::Path;
use std::sync::{Arc, Mutex};

use tabular_certify::PipelineError;
use tabular_certify::execution::{
    CompositeObserver, FileObserver, JobEvent, JobObserver, JobOptions, JobSpec, JobState, Severity, run_job,
};
use tabular_certify::processing::{GroupSpec, Reducer};
use tabular_certify::source::{SourceLocator, SourcePolicy};
use tabular_certify::types::{DataType, Field, Schema};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    alerts: Mutex<Vec<(String, Severity, String)>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn alerts(&self) -> Vec<(String, Severity, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl JobObserver for Recorder {
    fn on_event(&self, event: &JobEvent) {
        let label = match event {
            JobEvent::JobStarted { .. } => "started".to_owned(),
            JobEvent::StateChanged { state, .. } => format!("state:{state}"),
            JobEvent::BatchProcessed { .. } => "batch".to_owned(),
            JobEvent::TierFinished { report, .. } => format!("tier:{}", report.tier),
            JobEvent::JobFinished { .. } => "finished".to_owned(),
            JobEvent::JobFailed { severity, .. } => format!("failed:{severity:?}"),
            JobEvent::ThrottleWaited { .. } => "throttled".to_owned(),
        };
        self.events.lock().unwrap().push(label);
    }

    fn on_alert(&self, job: &str, severity: Severity, error: &PipelineError) {
        self.alerts
            .lock()
            .unwrap()
            .push((job.to_owned(), severity, error.to_string()));
    }
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        "gifts",
        vec![Field::new("id", DataType::Utf8), Field::new("amount", DataType::Float64)],
    ))
}

fn write_input(dir: &Path, body: &str) -> SourceLocator {
    let path = dir.join("gifts.csv");
    std::fs::write(&path, format!("id,amount\n{body}")).unwrap();
    SourceLocator::local(path)
}

fn options(dir: &Path, observer: Arc<dyn JobObserver>) -> JobOptions {
    let mut options = JobOptions {
        policy: SourcePolicy::deny_all().allow_path_prefix(dir),
        observer: Some(observer),
        alert_at_or_above: Severity::Error,
        ..JobOptions::default()
    };
    options.validation.seed = Some(5);
    options
}

#[test]
fn pass_through_job_emits_states_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_input(dir.path(), "a,1\nb,2\n");
    let recorder = Arc::new(Recorder::default());
    let job = JobSpec::pass_through("gifts", source, dir.path().join("gifts.parquet"), schema());

    let report = run_job(&job, &options(dir.path(), recorder.clone())).unwrap();
    assert_eq!(report.state, JobState::Passed);
    assert_eq!(
        recorder.events(),
        [
            "started",
            "state:reading",
            "state:coercing",
            "state:writing",
            "batch",
            "state:validating",
            "tier:structural",
            "tier:statistical",
            "tier:sample-exact",
            "state:passed",
            "finished",
        ]
    );
    assert!(recorder.alerts().is_empty());
}

#[test]
fn aggregate_job_passes_through_the_aggregating_state() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_input(dir.path(), "a,1\nb,2\na,3\n");
    let recorder = Arc::new(Recorder::default());
    let group = GroupSpec::new("totals", &["id"])
        .column("total", Reducer::Sum("amount".into()))
        .column("gifts", Reducer::Count);
    let job = JobSpec::aggregate("totals", source, dir.path().join("totals.parquet"), schema(), group)
        .with_sum_column("total");

    let report = run_job(&job, &options(dir.path(), recorder.clone())).unwrap();
    assert!(report.passed(), "{:?}", report.verdict);
    assert_eq!(report.distinct_keys, Some(2));
    let states: Vec<String> = recorder
        .events()
        .into_iter()
        .filter(|e| e.starts_with("state:"))
        .collect();
    assert_eq!(
        states,
        [
            "state:reading",
            "state:coercing",
            "state:aggregating",
            "state:writing",
            "state:validating",
            "state:passed",
        ]
    );
}

#[test]
fn rejected_output_raises_an_alert_but_returns_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_input(dir.path(), "a,1\na,2\n");
    let recorder = Arc::new(Recorder::default());
    let job = JobSpec::pass_through("dupes", source, dir.path().join("dupes.parquet"), schema()).with_unique_key(&["id"]);

    let report = run_job(&job, &options(dir.path(), recorder.clone())).unwrap();
    assert!(!report.passed());

    let alerts = recorder.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].0, "dupes");
    assert_eq!(alerts[0].1, Severity::Error);
    assert!(alerts[0].2.contains("duplicate keys on (id)"), "{}", alerts[0].2);

    let events = recorder.events();
    assert!(!events.iter().any(|e| e.starts_with("failed:")));
    assert_eq!(events[events.len() - 2], "state:failed (statistical)");
}

#[test]
fn stage_errors_emit_job_failed_and_respect_the_alert_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_input(dir.path(), "a,oops\n");
    let job = JobSpec::pass_through("bad", source, dir.path().join("bad.parquet"), schema());

    let recorder = Arc::new(Recorder::default());
    let err = run_job(&job, &options(dir.path(), recorder.clone())).unwrap_err();
    assert!(matches!(err, PipelineError::Coercion { .. }));
    assert_eq!(recorder.events().last().map(String::as_str), Some("failed:Error"));
    assert_eq!(recorder.alerts().len(), 1);

    let quiet = Arc::new(Recorder::default());
    let mut critical_only = options(dir.path(), quiet.clone());
    critical_only.alert_at_or_above = Severity::Critical;
    run_job(&job, &critical_only).unwrap_err();
    assert!(quiet.alerts().is_empty());
}

#[test]
fn file_observer_appends_summary_lines() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_input(dir.path(), "a,1.5\nb,2.5\n");
    let log = dir.path().join("jobs.log");
    let recorder = Arc::new(Recorder::default());
    let observers: Vec<Arc<dyn JobObserver>> = vec![recorder.clone(), Arc::new(FileObserver::new(&log))];
    let composite = CompositeObserver::new(observers);
    let job = JobSpec::pass_through("gifts", source, dir.path().join("gifts.parquet"), schema())
        .with_tracked_columns(&["amount"])
        .with_sum_column("amount");

    run_job(&job, &options(dir.path(), Arc::new(composite))).unwrap();

    let text = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5, "{text}");
    assert!(lines[0].contains("start job=gifts source="));
    assert!(lines[1].contains("tier job=gifts tier=structural status=Passed checks=1"));
    assert!(lines[4].contains("finish job=gifts state=passed rows=2"));
    assert!(lines[4].contains(r#""row_count":2"#));
    assert!(lines[4].contains(r#""sum":{"column":"amount","value":4.0}"#), "{}", lines[4]);
    assert!(!recorder.events().is_empty());
}
