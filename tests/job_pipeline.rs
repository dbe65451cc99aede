use std::path::Path;
use std::sync::Arc;

use tabular_certify::PipelineError;
use tabular_certify::catalog::distinct_legislators_job;
use tabular_certify::execution::{JobOptions, JobSpec, JobState, run_job};
use tabular_certify::source::{SourceLocator, SourcePolicy};
use tabular_certify::types::{DataType, Field, Schema, Transform, Value};
use tabular_certify::validate::{OutputFile, Tier, TierStatus};

fn options(dir: &Path) -> JobOptions {
    let mut options = JobOptions {
        policy: SourcePolicy::deny_all().allow_path_prefix(dir),
        ..JobOptions::default()
    };
    options.validation.seed = Some(42);
    options
}

fn contributions_schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        "contributions",
        vec![
            Field::new("transaction_id", DataType::Utf8).from_source("transaction.id"),
            Field::new("contributor_name", DataType::Utf8).from_source("contributor.name"),
            Field::new("cycle", DataType::Int32),
            Field::new("amount", DataType::Float64),
        ],
    ))
}

fn read_all(path: &Path) -> Vec<Vec<Value>> {
    let file = OutputFile::open(path).unwrap();
    let columns = file.column_names().to_vec();
    file.rows(&columns, 1024)
        .unwrap()
        .flat_map(|batch| batch.unwrap())
        .collect()
}

#[test]
fn pass_through_job_publishes_certified_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("contribDB_2020.csv");
    std::fs::write(
        &input,
        "transaction.id,cycle,contributor.name,amount,extra\n\
         t1,2020,SMITH JOHN,10.00,x\n\
         t2,2020,\\N,20.005,y\n\
         t3,2020.0,DOE JANE,0.001,z\n",
    )
    .unwrap();
    let output = dir.path().join("contributions.parquet");
    let job = JobSpec::pass_through(
        "contributions",
        SourceLocator::local(&input),
        &output,
        contributions_schema(),
    )
    .with_unique_key(&["transaction_id"])
    .with_tracked_columns(&["transaction_id", "contributor_name"])
    .with_sum_column("amount");

    let report = run_job(&job, &options(dir.path())).unwrap();

    assert!(report.passed(), "{:?}", report.verdict);
    assert_eq!(report.state, JobState::Passed);
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
    assert_eq!((report.rows_read, report.rows_qualifying, report.rows_written), (3, 3, 3));
    assert_eq!(report.stats.non_null_count("contributor_name"), Some(2));
    assert_eq!(report.stats.non_null_count("transaction_id"), Some(3));
    let sum = report.stats.sum.as_ref().unwrap();
    assert!((sum.value - 30.006).abs() < 1e-9);
    assert!(report.verdict.tiers().iter().all(|t| t.status == TierStatus::Passed));
    assert!(!dir.path().join("contributions.parquet.part").exists());

    let rows = read_all(&output);
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1],
        vec![
            Value::Utf8("t2".into()),
            Value::Null,
            Value::Int32(2020),
            Value::Float64(20.005)
        ]
    );
    assert_eq!(rows[2][2], Value::Int32(2020));
}

#[test]
fn null_sentinel_in_numeric_columns_is_excluded_from_counts() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("contribDB_2022.csv");
    std::fs::write(
        &input,
        "transaction.id,cycle,contributor.name,amount\n\
         t1,2022,A,10.00\n\
         t2,\\N,B,\\N\n\
         t3,2022,C,20.005\n",
    )
    .unwrap();
    let output = dir.path().join("sentinels.parquet");
    let job = JobSpec::pass_through("sentinels", SourceLocator::local(&input), &output, contributions_schema())
        .with_tracked_columns(&["cycle", "amount"])
        .with_sum_column("amount");

    let report = run_job(&job, &options(dir.path())).unwrap().into_result().unwrap();

    assert_eq!(report.rows_written, 3);
    assert_eq!(report.stats.non_null_count("amount"), Some(2));
    assert_eq!(report.stats.non_null_count("cycle"), Some(2));
    assert!((report.stats.sum.as_ref().unwrap().value - 30.005).abs() < 1e-9);
    let statistical = report.verdict.tier(Tier::Statistical).unwrap();
    assert_eq!(statistical.status, TierStatus::Passed);

    let rows = read_all(&output);
    assert_eq!(
        rows[1],
        vec![Value::Utf8("t2".into()), Value::Utf8("B".into()), Value::Null, Value::Null]
    );
}

#[test]
fn coercion_error_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    std::fs::write(
        &input,
        "transaction.id,cycle,contributor.name,amount\nt1,2020,A,1.5\nt2,2020,B,abc\n",
    )
    .unwrap();
    let output = dir.path().join("bad.parquet");
    let job = JobSpec::pass_through("bad", SourceLocator::local(&input), &output, contributions_schema());

    let err = run_job(&job, &options(dir.path())).unwrap_err();
    match &err {
        PipelineError::Coercion { row, column, raw, .. } => {
            assert_eq!(*row, 1);
            assert_eq!(column, "amount");
            assert_eq!(raw, "abc");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
    assert!(!dir.path().join("bad.parquet.part").exists());
}

#[test]
fn transform_rejects_values_too_short_to_strip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("recipients.csv");
    std::fs::write(&input, "ICPSR,bonica.rid\n100751980,cand1\n1980,cand2\n").unwrap();
    let schema = Arc::new(Schema::new(
        "crosswalk",
        vec![
            Field::new("icpsr", DataType::Utf8)
                .from_source("ICPSR")
                .with_transform(Transform::StripSuffix { len: 4 }),
            Field::new("bonica_rid", DataType::Utf8).from_source("bonica.rid"),
        ],
    ));
    let output = dir.path().join("crosswalk.parquet");
    let job = JobSpec::pass_through("crosswalk", SourceLocator::local(&input), &output, schema);

    let err = run_job(&job, &options(dir.path())).unwrap_err();
    assert!(
        matches!(&err, PipelineError::Transform { row: 1, column, .. } if column == "icpsr"),
        "{err}"
    );
    assert!(!output.exists());
}

#[test]
fn cancelled_job_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    std::fs::write(&input, "transaction.id,cycle,contributor.name,amount\nt1,2020,A,1\n").unwrap();
    let output = dir.path().join("out.parquet");
    let job = JobSpec::pass_through("cancelled", SourceLocator::local(&input), &output, contributions_schema());
    let options = options(dir.path());
    options.cancel.cancel();

    let err = run_job(&job, &options).unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { ref job } if job == "cancelled"));
    assert!(!output.exists());
    assert!(!dir.path().join("out.parquet.part").exists());
}

#[test]
fn duplicate_keys_fail_statistical_tier_and_can_be_kept() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("dupes.csv");
    std::fs::write(
        &input,
        "transaction.id,cycle,contributor.name,amount\nt1,2020,A,1\nt1,2020,B,2\nt2,2020,C,3\n",
    )
    .unwrap();
    let output = dir.path().join("dupes.parquet");
    let job = JobSpec::pass_through("dupes", SourceLocator::local(&input), &output, contributions_schema())
        .with_unique_key(&["transaction_id"]);
    let mut options = options(dir.path());
    options.keep_rejected = true;

    let report = run_job(&job, &options).unwrap();

    assert_eq!(report.state, JobState::Failed { tier: Tier::Statistical });
    assert_eq!(report.verdict.tier(Tier::Structural).unwrap().status, TierStatus::Passed);
    assert_eq!(report.verdict.tier(Tier::SampleExact).unwrap().status, TierStatus::NotRun);
    assert!(report.output.is_none());
    assert!(!output.exists());
    let rejected = report.rejected.clone().unwrap();
    assert!(rejected.ends_with("dupes.parquet.rejected"));
    assert!(rejected.exists());

    let err = report.into_result().unwrap_err();
    assert!(err.to_string().contains("(\"t1\") x2"), "{err}");
}

#[test]
fn distinct_legislators_aggregate_by_latest_congress() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("HSall_members.csv");
    std::fs::write(
        &input,
        "congress,chamber,bioname,bioguide_id,state_abbrev,party_code,nominate_dim1,nominate_dim2\n\
         95,House,OLD NAME,A000001,NY,100.0,-0.3,0.1\n\
         97,House,NEW NAME,A000001,NJ,200.0,0.4,0.2\n\
         96,House,MID NAME,A000001,NY,100.0,-0.2,0.1\n\
         100,Senate,OTHER,B000002,CA,100.0,-0.5,N/A\n\
         101,President,NOBODY,N/A,US,200.0,0.1,0.1\n",
    )
    .unwrap();
    let output = dir.path().join("distinct_legislators.parquet");
    let job = distinct_legislators_job(SourceLocator::local(&input), &output);

    let report = run_job(&job, &options(dir.path())).unwrap();
    assert!(report.passed(), "{:?}", report.verdict);
    assert_eq!(report.rows_read, 5);
    assert_eq!(report.rows_qualifying, 3);
    assert_eq!(report.distinct_keys, Some(2));

    let rows = read_all(&output);
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Utf8("A000001".into()),
                Value::Utf8("NEW NAME".into()),
                Value::Utf8("NJ".into()),
                Value::Float64(200.0),
                Value::List(vec![Value::Int16(96), Value::Int16(97)]),
                Value::Int16(96),
                Value::Int16(97),
                Value::Float64(0.4),
                Value::Float64(0.2),
            ],
            vec![
                Value::Utf8("B000002".into()),
                Value::Utf8("OTHER".into()),
                Value::Utf8("CA".into()),
                Value::Float64(100.0),
                Value::List(vec![Value::Int16(100)]),
                Value::Int16(100),
                Value::Int16(100),
                Value::Float64(-0.5),
                Value::Null,
            ],
        ]
    );
}

#[cfg(feature = "deep_tests")]
#[test]
fn large_source_streams_in_many_batches() {
    use std::fmt::Write as _;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("contribDB_big.csv");
    let mut body = String::from("transaction.id,cycle,contributor.name,amount\n");
    for i in 0..250_000u32 {
        let _ = writeln!(body, "t{i},{},NAME {},{}.25", 1980 + 2 * (i % 23), i % 997, i % 500);
    }
    std::fs::write(&input, body).unwrap();
    let output = dir.path().join("big.parquet");
    let job = JobSpec::pass_through("big", SourceLocator::local(&input), &output, contributions_schema())
        .with_unique_key(&["transaction_id"])
        .with_sum_column("amount")
        .with_reader(tabular_certify::source::ReaderOptions {
            batch_size: 10_000,
            ..Default::default()
        });

    let report = run_job(&job, &options(dir.path())).unwrap().into_result().unwrap();
    assert_eq!(report.rows_written, 250_000);
    assert!(report.stats.batches >= 25);
}
