//! Running statistics accumulated while batches are written.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Batch, DataType, Schema, Value};

/// Compensated (Neumaier) floating-point sum.
///
/// Accuracy does not depend on batch boundaries or on the magnitude spread of the addends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, v: f64) {
        let t = self.sum + v;
        if self.sum.abs() >= v.abs() {
            self.compensation += (self.sum - t) + v;
        } else {
            self.compensation += (v - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

impl FromIterator<f64> for CompensatedSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = Self::new();
        iter.into_iter().for_each(|v| s.add(v));
        s
    }
}

/// Sum of the designated sum column, as recorded at write time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSum {
    pub column: String,
    pub value: f64,
}

/// Frozen statistics for a written output; immutable once the writer closes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Rows written.
    pub row_count: u64,
    /// Batches written.
    pub batches: u64,
    /// Non-null counts for the tracked columns.
    pub non_null: BTreeMap<String, u64>,
    pub sum: Option<ColumnSum>,
}

impl StatsSnapshot {
    pub fn non_null_count(&self, column: &str) -> Option<u64> {
        self.non_null.get(column).copied()
    }
}

#[derive(Debug, Clone)]
enum SumAcc {
    Int(i128),
    Float(CompensatedSum),
}

/// Counters updated once per written batch.
///
/// Integer sums are exact; float sums are compensated.
#[derive(Debug, Clone)]
pub struct RunningStats {
    row_count: u64,
    batches: u64,
    tracked: Vec<(String, usize, u64)>,
    sum: Option<(String, usize, SumAcc)>,
}

impl RunningStats {
    /// Track non-null counts for `tracked` and the sum of `sum_column`, all by output column name.
    pub fn new(schema: &Schema, tracked: &[String], sum_column: Option<&str>) -> PipelineResult<Self> {
        let tracked = tracked
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .map(|idx| (name.clone(), idx, 0))
                    .ok_or_else(|| PipelineError::config(format!("tracked column '{name}' is not in the output schema")))
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        let sum = match sum_column {
            None => None,
            Some(name) => {
                let idx = schema
                    .index_of(name)
                    .ok_or_else(|| PipelineError::config(format!("sum column '{name}' is not in the output schema")))?;
                let acc = match schema.fields[idx].data_type {
                    DataType::Float64 => SumAcc::Float(CompensatedSum::new()),
                    dt if dt.is_integer() => SumAcc::Int(0),
                    dt => {
                        return Err(PipelineError::config(format!(
                            "sum column '{name}' has non-numeric type {dt}"
                        )));
                    }
                };
                Some((name.to_owned(), idx, acc))
            }
        };

        Ok(Self {
            row_count: 0,
            batches: 0,
            tracked,
            sum,
        })
    }

    /// Fold one written batch into the counters.
    pub fn observe(&mut self, batch: &Batch) {
        self.batches += 1;
        self.row_count += batch.row_count() as u64;
        for (_, idx, count) in &mut self.tracked {
            *count += batch.rows.iter().filter(|r| !r[*idx].is_null()).count() as u64;
        }
        if let Some((_, idx, acc)) = &mut self.sum {
            for row in &batch.rows {
                match (&mut *acc, &row[*idx]) {
                    (SumAcc::Int(total), v) => {
                        if let Some(x) = v.as_i64() {
                            *total += i128::from(x);
                        }
                    }
                    (SumAcc::Float(total), Value::Float64(x)) => total.add(*x),
                    _ => {}
                }
            }
        }
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Freeze into an immutable snapshot.
    #[allow(clippy::cast_precision_loss)]
    pub fn freeze(self) -> StatsSnapshot {
        StatsSnapshot {
            row_count: self.row_count,
            batches: self.batches,
            non_null: self.tracked.into_iter().map(|(name, _, n)| (name, n)).collect(),
            sum: self.sum.map(|(column, _, acc)| ColumnSum {
                column,
                value: match acc {
                    SumAcc::Int(total) => total as f64,
                    SumAcc::Float(total) => total.value(),
                },
            }),
        }
    }
}
