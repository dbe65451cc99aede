//! Grouped aggregation with declared reducers.
//!
//! One output row is produced per distinct grouping key, emitted in ascending key order so
//! that re-running a job on the same input yields identical output. Rows are folded into
//! per-key accumulators as batches arrive; input order is the source order, which is what
//! `LAST_BY` and `LIST_ORDERED` use to break ties (the later row wins / sorts later).
//!
//! Null handling:
//!
//! - `MAX`/`MIN`/`SUM`/`AVG` ignore nulls and yield null when a group has no non-null value.
//! - `SUM_IF` yields a typed zero when no row qualifies (non-qualifying rows contribute zero).
//! - `COUNT` counts rows; `COUNT_IF` counts qualifying rows.
//! - `LIST_ORDERED`/`COLLECT_ARRAY` keep null elements.
//! - `LAST_BY` orders nulls in the ordering column first.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::sink::CompensatedSum;
use crate::types::{Batch, Cell, DataType, Field, GroupKey, Schema, Value};

use super::filter::Predicate;

/// How one output column is derived from the rows of a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Reducer {
    /// Value of `column` from the row with the greatest `order_by`; ties go to the later row.
    LastBy { column: String, order_by: String },
    Max(String),
    Min(String),
    Sum(String),
    Avg(String),
    /// Number of rows in the group.
    Count,
    /// Sum of `column` over rows matching `predicate`.
    SumIf { column: String, predicate: Predicate },
    /// Number of rows matching the predicate.
    CountIf(Predicate),
    /// Values of `column` sorted by `order_by` (stable).
    ListOrdered { column: String, order_by: String },
    /// Values of `column` in input order.
    CollectArray(String),
}

impl Reducer {
    pub fn last_by(column: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self::LastBy {
            column: column.into(),
            order_by: order_by.into(),
        }
    }

    pub fn list_ordered(column: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self::ListOrdered {
            column: column.into(),
            order_by: order_by.into(),
        }
    }

    pub fn sum_if(column: impl Into<String>, predicate: Predicate) -> Self {
        Self::SumIf {
            column: column.into(),
            predicate,
        }
    }

    /// Input columns read by the reducer.
    pub fn input_columns(&self) -> Vec<&str> {
        match self {
            Self::LastBy { column, order_by } | Self::ListOrdered { column, order_by } => {
                vec![column.as_str(), order_by.as_str()]
            }
            Self::Max(c) | Self::Min(c) | Self::Sum(c) | Self::Avg(c) | Self::CollectArray(c) => vec![c.as_str()],
            Self::Count => Vec::new(),
            Self::SumIf { column, predicate } => {
                let mut cols = vec![column.as_str()];
                cols.extend(predicate.columns());
                cols
            }
            Self::CountIf(predicate) => predicate.columns(),
        }
    }

    /// Output type for this reducer over `input`, or why the combination is invalid.
    pub fn output_type(&self, input: &Schema) -> Result<DataType, String> {
        let column_type = |name: &str| {
            input
                .field(name)
                .map(|f| f.data_type)
                .ok_or_else(|| format!("unknown input column '{name}'"))
        };
        for name in self.input_columns() {
            column_type(name)?;
        }
        match self {
            Self::LastBy { column, order_by } => {
                if column_type(order_by)?.is_list() {
                    return Err(format!("cannot order by list column '{order_by}'"));
                }
                column_type(column)
            }
            Self::Max(c) | Self::Min(c) => {
                let dt = column_type(c)?;
                if dt.is_list() {
                    Err(format!("MAX/MIN is not defined for list column '{c}'"))
                } else {
                    Ok(dt)
                }
            }
            Self::Sum(c) | Self::SumIf { column: c, .. } => match column_type(c)? {
                DataType::Float64 => Ok(DataType::Float64),
                dt if dt.is_integer() => Ok(DataType::Int64),
                dt => Err(format!("SUM needs a numeric column; '{c}' is {dt}")),
            },
            Self::Avg(c) => match column_type(c)? {
                dt if dt.is_numeric() => Ok(DataType::Float64),
                dt => Err(format!("AVG needs a numeric column; '{c}' is {dt}")),
            },
            Self::Count | Self::CountIf(_) => Ok(DataType::Int64),
            Self::ListOrdered { column, order_by } => {
                if column_type(order_by)?.is_list() {
                    return Err(format!("cannot order by list column '{order_by}'"));
                }
                let dt = column_type(column)?;
                dt.list_of().ok_or_else(|| format!("no list type holds {dt} values of '{column}'"))
            }
            Self::CollectArray(c) => {
                let dt = column_type(c)?;
                dt.list_of().ok_or_else(|| format!("no list type holds {dt} values of '{c}'"))
            }
        }
    }
}

/// A named output column and its reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub reducer: Reducer,
}

/// Grouping key plus reducers: the declaration of an aggregation job.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    /// Output record type name.
    pub name: String,
    /// Key columns (input column names), emitted first and in this order.
    pub key: Vec<String>,
    pub columns: Vec<OutputColumn>,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>, key: &[&str]) -> Self {
        Self {
            name: name.into(),
            key: key.iter().map(|k| (*k).to_owned()).collect(),
            columns: Vec::new(),
        }
    }

    /// Add an output column.
    pub fn column(mut self, name: impl Into<String>, reducer: Reducer) -> Self {
        self.columns.push(OutputColumn {
            name: name.into(),
            reducer,
        });
        self
    }

    /// Derive the output schema from the input schema.
    pub fn output_schema(&self, input: &Schema) -> PipelineResult<Schema> {
        if self.key.is_empty() {
            return Err(PipelineError::config(format!("group '{}' has no key columns", self.name)));
        }
        let mut fields = Vec::with_capacity(self.key.len() + self.columns.len());
        for k in &self.key {
            let f = input
                .field(k)
                .ok_or_else(|| PipelineError::Aggregation {
                    column: k.clone(),
                    message: "key column is not in the input schema".to_owned(),
                })?;
            fields.push(Field::new(k.clone(), f.data_type));
        }
        for out in &self.columns {
            if fields.iter().any(|f| f.name == out.name) {
                return Err(PipelineError::config(format!("duplicate output column '{}'", out.name)));
            }
            let dt = out.reducer.output_type(input).map_err(|message| PipelineError::Aggregation {
                column: out.name.clone(),
                message,
            })?;
            fields.push(Field::new(out.name.clone(), dt));
        }
        Ok(Schema {
            name: self.name.clone(),
            fields,
            null_markers: input.null_markers.clone(),
        })
    }
}

/// A predicate resolved against a typed row layout.
#[derive(Debug, Clone)]
pub(crate) struct BoundPredicate {
    predicate: Predicate,
    positions: HashMap<String, usize>,
}

impl BoundPredicate {
    pub(crate) fn bind(predicate: &Predicate, schema: &Schema) -> Result<Self, String> {
        let mut positions = HashMap::new();
        for name in predicate.columns() {
            let idx = schema
                .index_of(name)
                .ok_or_else(|| format!("predicate references unknown column '{name}'"))?;
            positions.insert(name.to_owned(), idx);
        }
        Ok(Self {
            predicate: predicate.clone(),
            positions,
        })
    }

    pub(crate) fn matches(&self, row: &[Value]) -> bool {
        let lookup = |name: &str| match self.positions.get(name) {
            Some(&i) => row[i].cell(),
            None => Cell::Null,
        };
        self.predicate.matches(&lookup)
    }
}

#[derive(Debug, Clone)]
enum Plan {
    LastBy { value: usize, order: usize },
    Extreme { value: usize, max: bool },
    SumInt { value: usize, filter: Option<BoundPredicate>, conditional: bool },
    SumFloat { value: usize, filter: Option<BoundPredicate>, conditional: bool },
    Avg { value: usize },
    Count { filter: Option<BoundPredicate> },
    List { value: usize, order: Option<usize> },
}

#[derive(Debug, Clone)]
enum State {
    LastBy(Option<(Value, Value)>),
    Extreme(Option<Value>),
    SumInt(Option<i64>),
    SumFloat(Option<CompensatedSum>),
    Avg(CompensatedSum, u64),
    Count(u64),
    /// (order key, value) pairs in input order.
    List(Vec<(Value, Value)>),
}

impl Plan {
    fn initial(&self) -> State {
        match self {
            Self::LastBy { .. } => State::LastBy(None),
            Self::Extreme { .. } => State::Extreme(None),
            Self::SumInt { .. } => State::SumInt(None),
            Self::SumFloat { .. } => State::SumFloat(None),
            Self::Avg { .. } => State::Avg(CompensatedSum::new(), 0),
            Self::Count { .. } => State::Count(0),
            Self::List { .. } => State::List(Vec::new()),
        }
    }

    fn update(&self, state: &mut State, row: &[Value], column: &str) -> PipelineResult<()> {
        match (self, state) {
            (Self::LastBy { value, order }, State::LastBy(best)) => {
                let replace = match best {
                    None => true,
                    Some((best_order, _)) => row[*order].total_cmp(best_order).is_ge(),
                };
                if replace {
                    *best = Some((row[*order].clone(), row[*value].clone()));
                }
            }
            (Self::Extreme { value, max }, State::Extreme(best)) => {
                let v = &row[*value];
                if !v.is_null() {
                    let replace = match best {
                        None => true,
                        Some(b) if *max => v.total_cmp(b).is_gt(),
                        Some(b) => v.total_cmp(b).is_lt(),
                    };
                    if replace {
                        *best = Some(v.clone());
                    }
                }
            }
            (Self::SumInt { value, filter, conditional }, State::SumInt(total)) => {
                if *conditional && total.is_none() {
                    *total = Some(0);
                }
                if filter.as_ref().is_none_or(|f| f.matches(row)) {
                    if let Some(x) = row[*value].as_i64() {
                        let next = total.unwrap_or(0).checked_add(x).ok_or_else(|| PipelineError::Aggregation {
                            column: column.to_owned(),
                            message: "integer sum overflowed int64".to_owned(),
                        })?;
                        *total = Some(next);
                    }
                }
            }
            (Self::SumFloat { value, filter, conditional }, State::SumFloat(total)) => {
                if *conditional && total.is_none() {
                    *total = Some(CompensatedSum::new());
                }
                if filter.as_ref().is_none_or(|f| f.matches(row)) {
                    if let Some(x) = row[*value].as_f64() {
                        total.get_or_insert_with(CompensatedSum::new).add(x);
                    }
                }
            }
            (Self::Avg { value }, State::Avg(sum, n)) => {
                if let Some(x) = row[*value].as_f64() {
                    sum.add(x);
                    *n += 1;
                }
            }
            (Self::Count { filter }, State::Count(n)) => {
                if filter.as_ref().is_none_or(|f| f.matches(row)) {
                    *n += 1;
                }
            }
            (Self::List { value, order }, State::List(items)) => {
                let key = order.map_or(Value::Null, |o| row[o].clone());
                items.push((key, row[*value].clone()));
            }
            _ => unreachable!("accumulator state always matches its plan"),
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self, state: State) -> Value {
        match state {
            State::LastBy(best) => best.map_or(Value::Null, |(_, v)| v),
            State::Extreme(best) => best.unwrap_or(Value::Null),
            State::SumInt(total) => total.map_or(Value::Null, Value::Int64),
            State::SumFloat(total) => total.map_or(Value::Null, |s| Value::Float64(s.value())),
            State::Avg(_, 0) => Value::Null,
            State::Avg(sum, n) => Value::Float64(sum.value() / n as f64),
            State::Count(n) => Value::Int64(i64::try_from(n).unwrap_or(i64::MAX)),
            State::List(mut items) => {
                if matches!(self, Self::List { order: Some(_), .. }) {
                    // Stable: equal order keys keep input order.
                    items.sort_by(|a, b| a.0.total_cmp(&b.0));
                }
                Value::List(items.into_iter().map(|(_, v)| v).collect())
            }
        }
    }
}

#[derive(Debug)]
struct Group {
    key_values: Vec<Value>,
    states: Vec<State>,
}

/// Streaming group-by over typed batches.
#[derive(Debug)]
pub struct Aggregator {
    output: Arc<Schema>,
    key_positions: Vec<usize>,
    plans: Vec<(String, Plan)>,
    groups: BTreeMap<GroupKey, Group>,
    rows_seen: u64,
}

impl Aggregator {
    /// Validate `spec` against `input` and prepare the accumulators.
    pub fn new(input: &Schema, spec: &GroupSpec) -> PipelineResult<Self> {
        let output = spec.output_schema(input)?;
        let key_positions = spec
            .key
            .iter()
            .map(|k| input.index_of(k).unwrap_or_default())
            .collect();

        let idx = |name: &str| input.index_of(name).unwrap_or_default();
        let plans = spec
            .columns
            .iter()
            .map(|out| {
                let bind = |p: &Predicate| {
                    BoundPredicate::bind(p, input).map_err(|message| PipelineError::Aggregation {
                        column: out.name.clone(),
                        message,
                    })
                };
                let plan = match &out.reducer {
                    Reducer::LastBy { column, order_by } => Plan::LastBy {
                        value: idx(column),
                        order: idx(order_by),
                    },
                    Reducer::Max(c) => Plan::Extreme { value: idx(c), max: true },
                    Reducer::Min(c) => Plan::Extreme { value: idx(c), max: false },
                    Reducer::Sum(c) => sum_plan(input, idx(c), None, false),
                    Reducer::SumIf { column, predicate } => {
                        sum_plan(input, idx(column), Some(bind(predicate)?), true)
                    }
                    Reducer::Avg(c) => Plan::Avg { value: idx(c) },
                    Reducer::Count => Plan::Count { filter: None },
                    Reducer::CountIf(p) => Plan::Count {
                        filter: Some(bind(p)?),
                    },
                    Reducer::ListOrdered { column, order_by } => Plan::List {
                        value: idx(column),
                        order: Some(idx(order_by)),
                    },
                    Reducer::CollectArray(c) => Plan::List {
                        value: idx(c),
                        order: None,
                    },
                };
                Ok((out.name.clone(), plan))
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            output: Arc::new(output),
            key_positions,
            plans,
            groups: BTreeMap::new(),
            rows_seen: 0,
        })
    }

    pub fn output_schema(&self) -> &Arc<Schema> {
        &self.output
    }

    /// Fold a batch into the accumulators.
    pub fn push(&mut self, batch: &Batch) -> PipelineResult<()> {
        for row in &batch.rows {
            let key = GroupKey::from_row(row, &self.key_positions);
            let plans = &self.plans;
            let group = self.groups.entry(key).or_insert_with(|| Group {
                key_values: self.key_positions.iter().map(|&i| row[i].clone()).collect(),
                states: plans.iter().map(|(_, p)| p.initial()).collect(),
            });
            for ((name, plan), state) in plans.iter().zip(group.states.iter_mut()) {
                plan.update(state, row, name)?;
            }
            self.rows_seen += 1;
        }
        Ok(())
    }

    /// Rows folded so far.
    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    /// Distinct keys seen so far.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Finish all groups, yielding output batches of at most `batch_size` rows in key order.
    pub fn into_batches(self, batch_size: usize) -> GroupedBatches {
        GroupedBatches {
            schema: self.output,
            plans: self.plans.into_iter().map(|(_, p)| p).collect(),
            groups: self.groups.into_iter(),
            batch_size: batch_size.max(1),
        }
    }
}

fn sum_plan(input: &Schema, value: usize, filter: Option<BoundPredicate>, conditional: bool) -> Plan {
    if input.fields[value].data_type == DataType::Float64 {
        Plan::SumFloat {
            value,
            filter,
            conditional,
        }
    } else {
        Plan::SumInt {
            value,
            filter,
            conditional,
        }
    }
}

/// Lazily finished aggregation output.
pub struct GroupedBatches {
    schema: Arc<Schema>,
    plans: Vec<Plan>,
    groups: std::collections::btree_map::IntoIter<GroupKey, Group>,
    batch_size: usize,
}

impl GroupedBatches {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Iterator for GroupedBatches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let mut rows = Vec::new();
        for (_, group) in self.groups.by_ref().take(self.batch_size) {
            let mut row = group.key_values;
            row.extend(
                self.plans
                    .iter()
                    .zip(group.states)
                    .map(|(plan, state)| plan.finish(state)),
            );
            rows.push(row);
        }
        if rows.is_empty() {
            None
        } else {
            Some(Batch::new(Arc::clone(&self.schema), rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Schema {
        Schema::new(
            "contributions",
            vec![
                Field::new("rid", DataType::Utf8),
                Field::new("congress", DataType::Int16),
                Field::new("name", DataType::Utf8),
                Field::new("amount", DataType::Float64),
                Field::new("kind", DataType::Utf8),
            ],
        )
    }

    fn row(rid: &str, congress: i16, name: &str, amount: Option<f64>, kind: &str) -> Vec<Value> {
        vec![
            Value::Utf8(rid.into()),
            Value::Int16(congress),
            Value::Utf8(name.into()),
            amount.map_or(Value::Null, Value::Float64),
            Value::Utf8(kind.into()),
        ]
    }

    fn run(spec: &GroupSpec, rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
        let schema = Arc::new(input());
        let mut agg = Aggregator::new(&schema, spec).unwrap();
        for chunk in rows.chunks(2) {
            agg.push(&Batch::new(Arc::clone(&schema), chunk.to_vec())).unwrap();
        }
        agg.into_batches(3).flat_map(|b| b.rows).collect()
    }

    #[test]
    fn sum_and_count_per_key() {
        let spec = GroupSpec::new("g", &["rid"])
            .column("amount", Reducer::Sum("amount".into()))
            .column("contribution_count", Reducer::Count);
        let out = run(
            &spec,
            vec![
                row("X", 1, "a", Some(10.0), "I"),
                row("Y", 1, "b", Some(1.0), "I"),
                row("X", 1, "c", Some(20.0), "C"),
                row("Z", 1, "d", None, "I"),
                row("Y", 1, "e", Some(2.0), "I"),
            ],
        );
        assert_eq!(
            out,
            vec![
                vec![Value::Utf8("X".into()), Value::Float64(30.0), Value::Int64(2)],
                vec![Value::Utf8("Y".into()), Value::Float64(3.0), Value::Int64(2)],
                vec![Value::Utf8("Z".into()), Value::Null, Value::Int64(1)],
            ]
        );
    }

    #[test]
    fn last_by_ties_go_to_the_later_row() {
        let spec = GroupSpec::new("g", &["rid"]).column("name", Reducer::last_by("name", "congress"));
        let out = run(
            &spec,
            vec![
                row("X", 97, "early", None, ""),
                row("X", 99, "first-at-99", None, ""),
                row("X", 98, "middle", None, ""),
                row("X", 99, "second-at-99", None, ""),
            ],
        );
        assert_eq!(out[0][1], Value::Utf8("second-at-99".into()));
    }

    #[test]
    fn list_ordered_is_stable_and_collect_keeps_input_order() {
        let spec = GroupSpec::new("g", &["rid"])
            .column("served", Reducer::list_ordered("congress", "congress"))
            .column("names", Reducer::CollectArray("name".into()));
        let out = run(
            &spec,
            vec![
                row("X", 99, "c", None, ""),
                row("X", 97, "a", None, ""),
                row("X", 98, "b", None, ""),
            ],
        );
        assert_eq!(
            out[0][1],
            Value::List(vec![Value::Int16(97), Value::Int16(98), Value::Int16(99)])
        );
        assert_eq!(
            out[0][2],
            Value::List(vec![Value::Utf8("c".into()), Value::Utf8("a".into()), Value::Utf8("b".into())])
        );
    }

    #[test]
    fn conditional_reducers_split_by_predicate() {
        let individual = Predicate::equals("kind", "I");
        let organizational = Predicate::not_equals("kind", "I");
        let spec = GroupSpec::new("g", &["rid"])
            .column("individual_total", Reducer::sum_if("amount", individual.clone()))
            .column("individual_count", Reducer::CountIf(individual))
            .column("organizational_total", Reducer::sum_if("amount", organizational.clone()))
            .column("organizational_count", Reducer::CountIf(organizational))
            .column("avg_amount", Reducer::Avg("amount".into()));
        let out = run(
            &spec,
            vec![
                row("X", 1, "a", Some(10.0), "I"),
                row("X", 1, "b", Some(30.0), "I"),
                row("Y", 1, "c", Some(5.0), "C"),
            ],
        );
        assert_eq!(
            out[0][1..],
            [Value::Float64(40.0), Value::Int64(2), Value::Float64(0.0), Value::Int64(0), Value::Float64(20.0)]
        );
        assert_eq!(
            out[1][1..],
            [Value::Float64(0.0), Value::Int64(0), Value::Float64(5.0), Value::Int64(1), Value::Float64(5.0)]
        );
    }

    #[test]
    fn min_max_ignore_nulls() {
        let spec = GroupSpec::new("g", &["rid"])
            .column("first", Reducer::Min("congress".into()))
            .column("last", Reducer::Max("congress".into()))
            .column("top", Reducer::Max("amount".into()));
        let out = run(
            &spec,
            vec![row("X", 99, "", None, ""), row("X", 96, "", Some(1.5), ""), row("X", 97, "", None, "")],
        );
        assert_eq!(out[0][1..], [Value::Int16(96), Value::Int16(99), Value::Float64(1.5)]);
    }

    #[test]
    fn output_is_in_key_order_and_deterministic() {
        let spec = GroupSpec::new("g", &["rid", "congress"]).column("n", Reducer::Count);
        let rows = vec![
            row("b", 2, "", None, ""),
            row("a", 9, "", None, ""),
            row("b", 1, "", None, ""),
            row("a", 9, "", None, ""),
        ];
        let first = run(&spec, rows.clone());
        let second = run(&spec, rows);
        assert_eq!(first, second);
        let keys: Vec<(Value, Value)> = first.iter().map(|r| (r[0].clone(), r[1].clone())).collect();
        assert_eq!(
            keys,
            vec![
                (Value::Utf8("a".into()), Value::Int16(9)),
                (Value::Utf8("b".into()), Value::Int16(1)),
                (Value::Utf8("b".into()), Value::Int16(2)),
            ]
        );
    }

    #[test]
    fn incompatible_reducers_are_aggregation_errors() {
        let schema = input();
        let bad_sum = GroupSpec::new("g", &["rid"]).column("s", Reducer::Sum("name".into()));
        assert!(matches!(Aggregator::new(&schema, &bad_sum), Err(PipelineError::Aggregation { .. })));

        let bad_list = GroupSpec::new("g", &["rid"]).column("l", Reducer::CollectArray("amount".into()));
        assert!(matches!(Aggregator::new(&schema, &bad_list), Err(PipelineError::Aggregation { .. })));

        let unknown = GroupSpec::new("g", &["rid"]).column("m", Reducer::Max("missing".into()));
        assert!(matches!(Aggregator::new(&schema, &unknown), Err(PipelineError::Aggregation { .. })));

        let bad_key = GroupSpec::new("g", &["missing"]).column("n", Reducer::Count);
        assert!(matches!(Aggregator::new(&schema, &bad_key), Err(PipelineError::Aggregation { .. })));
    }

    #[test]
    fn integer_sum_overflow_is_reported() {
        let schema = Arc::new(Schema::new(
            "t",
            vec![Field::new("k", DataType::Utf8), Field::new("n", DataType::Int64)],
        ));
        let spec = GroupSpec::new("g", &["k"]).column("total", Reducer::Sum("n".into()));
        let mut agg = Aggregator::new(&schema, &spec).unwrap();
        let batch = Batch::new(
            Arc::clone(&schema),
            vec![
                vec![Value::Utf8("k".into()), Value::Int64(i64::MAX)],
                vec![Value::Utf8("k".into()), Value::Int64(1)],
            ],
        );
        let err = agg.push(&batch).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }
}
