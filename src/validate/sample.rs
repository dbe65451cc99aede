use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult, ValidationFailure};
use crate::execution::JobKind;
use crate::processing::{Coercer, GroupSpec, Reducer};
use crate::types::{Cell, GroupKey, RawRow, Schema, Value};

use super::compare::{source_matches, values_match};
use super::source_scan::QualifyingRows;
use super::{SampleOverflow, TierCheck, ValidationContext};

pub(crate) fn run(ctx: &ValidationContext<'_>) -> PipelineResult<TierCheck> {
    let total = ctx.output.row_count()?;
    let drawn = draw(total, ctx.options.sample_size, ctx.options.overflow, ctx.options.seed);
    if drawn.is_empty() {
        return Ok(TierCheck {
            checks: 0,
            summary: format!("nothing to sample ({total} output rows, sample size {})", ctx.options.sample_size),
        });
    }
    let indices: BTreeSet<u64> = drawn.iter().copied().collect();
    debug!(job = %ctx.job.name, draws = drawn.len(), distinct = indices.len(), "sampled output rows");
    let rows = sampled_rows(ctx, &indices)?;

    let checks = match &ctx.job.kind {
        JobKind::PassThrough if ctx.job.primary_key.is_empty() => by_position(ctx, rows)?,
        JobKind::PassThrough => by_primary_key(ctx, rows)?,
        JobKind::Aggregate(group) => by_group(ctx, group, rows)?,
    };
    Ok(TierCheck {
        checks,
        summary: format!("{} sampled rows, {checks} fields compared", indices.len()),
    })
}

/// Sorted output row indices to compare.
///
/// Clipping compares each row at most once; with replacement, `requested` draws are made when
/// the output is smaller than the request.
fn draw(total: u64, requested: usize, overflow: SampleOverflow, seed: Option<u64>) -> Vec<u64> {
    if total == 0 || requested == 0 {
        return Vec::new();
    }
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };
    let population = usize::try_from(total).unwrap_or(usize::MAX);
    let mut picked: Vec<u64> = if requested > population && overflow == SampleOverflow::WithReplacement {
        (0..requested).map(|_| rng.random_range(0..total)).collect()
    } else {
        rand::seq::index::sample(&mut rng, population, requested.min(population))
            .into_iter()
            .map(|i| i as u64)
            .collect()
    };
    picked.sort_unstable();
    picked
}

/// The sampled output rows with values in output schema order.
fn sampled_rows(ctx: &ValidationContext<'_>, indices: &BTreeSet<u64>) -> PipelineResult<Vec<(u64, Vec<Value>)>> {
    let file_columns = ctx.output.column_names();
    let positions = ctx
        .output_schema
        .fields
        .iter()
        .map(|f| {
            file_columns
                .iter()
                .position(|c| *c == f.name)
                .ok_or_else(|| PipelineError::output_read(ctx.output.path(), format!("output has no column '{}'", f.name)))
        })
        .collect::<PipelineResult<Vec<_>>>()?;
    Ok(ctx
        .output
        .rows_at(indices, ctx.options.batch_size)?
        .into_iter()
        .map(|(i, row)| (i, positions.iter().map(|&p| row[p].clone()).collect()))
        .collect())
}

fn missing(identity: String, column: String) -> PipelineError {
    ValidationFailure::SampleMismatch {
        identity,
        column,
        expected: "a qualifying source row".to_owned(),
        actual: "none".to_owned(),
    }
    .into()
}

/// Compare every field of an output row against the source row it came from.
fn compare_row(
    ctx: &ValidationContext<'_>,
    source_positions: &[usize],
    identity: impl Fn() -> String,
    source: &RawRow,
    output: &[Value],
) -> PipelineResult<u64> {
    let schema = &ctx.job.schema;
    for ((field, &pos), actual) in schema.fields.iter().zip(source_positions).zip(output) {
        if let Err(expected) = source_matches(schema, field, &source.values[pos], actual, ctx.options.float_tolerance) {
            return Err(ValidationFailure::SampleMismatch {
                identity: identity(),
                column: field.name.clone(),
                expected,
                actual: actual.to_string(),
            }
            .into());
        }
    }
    Ok(schema.fields.len() as u64)
}

fn source_positions(schema: &Schema, columns: &[String]) -> PipelineResult<Vec<usize>> {
    schema
        .fields
        .iter()
        .map(|f| {
            columns
                .iter()
                .position(|c| c == f.source_name())
                .ok_or_else(|| PipelineError::config(format!("source does not provide column '{}'", f.source_name())))
        })
        .collect()
}

/// Pass-through output row `i` is the `i`-th qualifying source row.
fn by_position(ctx: &ValidationContext<'_>, rows: Vec<(u64, Vec<Value>)>) -> PipelineResult<u64> {
    let mut pending: BTreeMap<u64, Vec<Value>> = rows.into_iter().collect();
    let source = QualifyingRows::open(ctx.job, ctx.source, ctx.options.batch_size)?;
    let positions = source_positions(&ctx.job.schema, source.columns())?;

    let mut checks = 0;
    for item in source {
        let (ordinal, row) = item?;
        if let Some(output) = pending.remove(&ordinal) {
            let identity = || format!("output row {ordinal} (source row {})", row.position);
            checks += compare_row(ctx, &positions, identity, &row, &output)?;
        }
        if pending.is_empty() {
            break;
        }
    }
    match pending.into_keys().next() {
        Some(i) => Err(missing(format!("output row {i}"), "*".to_owned())),
        None => Ok(checks),
    }
}

/// Pass-through output rows located in the source by their primary key.
fn by_primary_key(ctx: &ValidationContext<'_>, rows: Vec<(u64, Vec<Value>)>) -> PipelineResult<u64> {
    let pk = &ctx.job.primary_key;
    let key_schema = ctx
        .job
        .schema
        .project(pk)
        .ok_or_else(|| PipelineError::config(format!("primary key ({}) is not in the schema", pk.join(", "))))?;
    let output_key_positions = pk
        .iter()
        .map(|k| ctx.output_schema.index_of(k).unwrap_or_default())
        .collect::<Vec<_>>();

    let mut pending: HashMap<GroupKey, Vec<(u64, Vec<Value>)>> = HashMap::new();
    for (i, row) in rows {
        pending
            .entry(GroupKey::from_row(&row, &output_key_positions))
            .or_default()
            .push((i, row));
    }

    let source = QualifyingRows::open(ctx.job, ctx.source, ctx.options.batch_size)?;
    let positions = source_positions(&ctx.job.schema, source.columns())?;
    let key_coercer = Coercer::new(Arc::new(key_schema), source.columns())?;
    let key_positions: Vec<usize> = (0..pk.len()).collect();

    let mut checks = 0;
    for item in source {
        let (_, row) = item?;
        let key = GroupKey::from_row(&key_coercer.coerce_row(&row)?, &key_positions);
        if let Some(outputs) = pending.remove(&key) {
            for (i, output) in outputs {
                let identity = || format!("output row {i} key {key}");
                checks += compare_row(ctx, &positions, identity, &row, &output)?;
            }
        }
        if pending.is_empty() {
            break;
        }
    }
    match pending.into_iter().flat_map(|(k, rows)| rows.into_iter().map(move |(i, _)| (i, k.clone()))).min() {
        Some((i, key)) => Err(missing(format!("output row {i} key {key}"), pk.join(", "))),
        None => Ok(checks),
    }
}

/// Aggregated output rows recomputed from every qualifying source row sharing their key.
fn by_group(ctx: &ValidationContext<'_>, group: &GroupSpec, rows: Vec<(u64, Vec<Value>)>) -> PipelineResult<u64> {
    let input = &ctx.job.schema;
    let output_key_positions: Vec<usize> = (0..group.key.len()).collect();
    let input_key_positions = group
        .key
        .iter()
        .map(|k| {
            input
                .index_of(k)
                .ok_or_else(|| PipelineError::config(format!("group key column '{k}' is not in the input schema")))
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let mut members: BTreeMap<GroupKey, Vec<Vec<Value>>> = BTreeMap::new();
    let mut sampled = Vec::with_capacity(rows.len());
    for (i, row) in rows {
        let key = GroupKey::from_row(&row, &output_key_positions);
        members.entry(key.clone()).or_default();
        sampled.push((i, key, row));
    }

    let source = QualifyingRows::open(ctx.job, ctx.source, ctx.options.batch_size)?;
    let coercer = Coercer::new(Arc::clone(input), source.columns())?;
    for item in source {
        let (_, raw) = item?;
        let row = coercer.coerce_row(&raw)?;
        if let Some(found) = members.get_mut(&GroupKey::from_row(&row, &input_key_positions)) {
            found.push(row);
        }
    }

    let mut checks = 0;
    for (i, key, output) in sampled {
        let group_rows = members.get(&key).map(Vec::as_slice).unwrap_or_default();
        if group_rows.is_empty() {
            return Err(missing(format!("output row {i} key {key}"), group.key.join(", ")));
        }
        for (column, actual) in group.columns.iter().zip(&output[group.key.len()..]) {
            let expected = recompute(&column.reducer, input, group_rows).map_err(|message| PipelineError::Aggregation {
                column: column.name.clone(),
                message,
            })?;
            checks += 1;
            if !values_match(&expected, actual, ctx.options.float_tolerance) {
                return Err(ValidationFailure::SampleMismatch {
                    identity: format!("output row {i} key {key}"),
                    column: column.name.clone(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                }
                .into());
            }
        }
    }
    Ok(checks)
}

/// Recompute one reducer over a group's rows in source order.
fn recompute(reducer: &Reducer, input: &Schema, rows: &[Vec<Value>]) -> Result<Value, String> {
    let col = |name: &str| input.index_of(name).ok_or_else(|| format!("unknown input column '{name}'"));
    let non_null = move |idx: usize| rows.iter().map(move |r| &r[idx]).filter(|v| !v.is_null());
    let qualifies = |predicate: &crate::processing::Predicate, row: &[Value]| {
        let lookup = |name: &str| input.index_of(name).map_or(Cell::Null, |i| row[i].cell());
        predicate.matches(&lookup)
    };

    let value = match reducer {
        Reducer::LastBy { column, order_by } => {
            let (v, o) = (col(column)?, col(order_by)?);
            rows.iter()
                .enumerate()
                .max_by(|(i, a), (j, b)| a[o].total_cmp(&b[o]).then(i.cmp(j)))
                .map_or(Value::Null, |(_, r)| r[v].clone())
        }
        Reducer::Max(c) => non_null(col(c)?).max_by(|a, b| a.total_cmp(b)).cloned().unwrap_or(Value::Null),
        Reducer::Min(c) => non_null(col(c)?).min_by(|a, b| a.total_cmp(b)).cloned().unwrap_or(Value::Null),
        Reducer::Sum(c) => {
            let idx = col(c)?;
            let values: Vec<&Value> = non_null(idx).collect();
            if values.is_empty() {
                Value::Null
            } else {
                sum_of(input.fields[idx].data_type.is_integer(), values)
            }
        }
        Reducer::SumIf { column, predicate } => {
            let idx = col(column)?;
            let values: Vec<&Value> = rows
                .iter()
                .filter(|r| qualifies(predicate, r.as_slice()))
                .map(|r| &r[idx])
                .filter(|v| !v.is_null())
                .collect();
            sum_of(input.fields[idx].data_type.is_integer(), values)
        }
        Reducer::Avg(c) => {
            let values: Vec<f64> = non_null(col(c)?).filter_map(Value::as_f64).collect();
            if values.is_empty() {
                Value::Null
            } else {
                #[allow(clippy::cast_precision_loss)]
                let n = values.len() as f64;
                Value::Float64(values.iter().sum::<f64>() / n)
            }
        }
        Reducer::Count => Value::Int64(i64::try_from(rows.len()).unwrap_or(i64::MAX)),
        Reducer::CountIf(predicate) => {
            Value::Int64(i64::try_from(rows.iter().filter(|r| qualifies(predicate, r.as_slice())).count()).unwrap_or(i64::MAX))
        }
        Reducer::ListOrdered { column, order_by } => {
            let (v, o) = (col(column)?, col(order_by)?);
            let mut keyed: Vec<(usize, &Vec<Value>)> = rows.iter().enumerate().collect();
            keyed.sort_by(|(i, a), (j, b)| a[o].total_cmp(&b[o]).then(i.cmp(j)));
            Value::List(keyed.into_iter().map(|(_, r)| r[v].clone()).collect())
        }
        Reducer::CollectArray(c) => {
            let idx = col(c)?;
            Value::List(rows.iter().map(|r| r[idx].clone()).collect())
        }
    };
    Ok(value)
}

/// Plain sum; integer columns give Int64, float columns Float64. Empty input sums to zero.
#[allow(clippy::cast_precision_loss)]
fn sum_of(integer: bool, values: Vec<&Value>) -> Value {
    if integer {
        let total: i128 = values.iter().filter_map(|v| v.as_i64()).map(i128::from).sum();
        i64::try_from(total).map_or(Value::Float64(total as f64), Value::Int64)
    } else {
        Value::Float64(values.iter().filter_map(|v| v.as_f64()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field};

    #[test]
    fn draw_is_reproducible_with_a_seed() {
        let a = draw(1_000, 10, SampleOverflow::Clip, Some(7));
        let b = draw(1_000, 10, SampleOverflow::Clip, Some(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn oversized_requests_clip_or_draw_with_replacement() {
        assert_eq!(draw(3, 10, SampleOverflow::Clip, Some(1)), vec![0, 1, 2]);
        let drawn = draw(3, 10, SampleOverflow::WithReplacement, Some(1));
        assert_eq!(drawn.len(), 10);
        assert!(drawn.iter().all(|&i| i < 3));
    }

    #[test]
    fn empty_output_or_zero_sample_draws_nothing() {
        assert!(draw(0, 10, SampleOverflow::Clip, None).is_empty());
        assert!(draw(10, 0, SampleOverflow::WithReplacement, None).is_empty());
    }

    fn input() -> Schema {
        Schema::new(
            "t",
            vec![
                Field::new("id", DataType::Utf8),
                Field::new("congress", DataType::Int16),
                Field::new("party", DataType::Utf8),
                Field::new("amount", DataType::Float64),
            ],
        )
    }

    fn row(congress: i16, party: &str, amount: Option<f64>) -> Vec<Value> {
        vec![
            Value::Utf8("X".into()),
            Value::Int16(congress),
            Value::Utf8(party.into()),
            amount.map_or(Value::Null, Value::Float64),
        ]
    }

    #[test]
    fn recompute_last_by_prefers_the_later_row_on_ties() {
        let rows = vec![row(97, "D", None), row(98, "R", None), row(98, "I", None)];
        let v = recompute(&Reducer::last_by("party", "congress"), &input(), &rows).unwrap();
        assert_eq!(v, Value::Utf8("I".into()));
    }

    #[test]
    fn recompute_sums_skip_nulls_and_conditional_sums_default_to_zero() {
        let rows = vec![row(97, "D", Some(10.0)), row(98, "R", None), row(99, "D", Some(20.0))];
        let schema = input();
        assert_eq!(recompute(&Reducer::Sum("amount".into()), &schema, &rows).unwrap(), Value::Float64(30.0));
        assert_eq!(recompute(&Reducer::Count, &schema, &rows).unwrap(), Value::Int64(3));
        let none = Reducer::sum_if("amount", crate::processing::Predicate::equals("party", "G"));
        assert_eq!(recompute(&none, &schema, &rows).unwrap(), Value::Float64(0.0));
    }

    #[test]
    fn recompute_list_ordered_sorts_stably() {
        let rows = vec![row(99, "a", None), row(97, "b", None), row(99, "c", None)];
        let v = recompute(&Reducer::list_ordered("party", "congress"), &input(), &rows).unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Utf8("b".into()), Value::Utf8("a".into()), Value::Utf8("c".into())])
        );
    }
}
