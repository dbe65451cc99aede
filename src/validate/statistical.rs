use std::collections::HashMap;

use crate::error::{Measure, PipelineResult, ValidationFailure};
use crate::sink::CompensatedSum;
use crate::types::GroupKey;

use super::{TierCheck, ValidationContext};

pub(crate) fn run(ctx: &ValidationContext<'_>) -> PipelineResult<TierCheck> {
    let key = ctx.job.output_key();
    let sum_column = ctx.stats.sum.as_ref().map(|s| s.column.clone());

    let mut columns: Vec<String> = Vec::new();
    for name in sum_column.iter().chain(ctx.stats.non_null.keys()).chain(&key) {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    if columns.is_empty() {
        return Ok(TierCheck {
            checks: 0,
            summary: "no statistics recorded".to_owned(),
        });
    }
    let position = |name: &str| columns.iter().position(|c| c == name).unwrap_or_default();
    let sum_pos = sum_column.as_deref().map(position);
    let counted: Vec<(&String, u64, usize)> = ctx
        .stats
        .non_null
        .iter()
        .map(|(name, expected)| (name, *expected, position(name.as_str())))
        .collect();
    let key_positions: Vec<usize> = key.iter().map(|k| position(k.as_str())).collect();

    let mut sum = CompensatedSum::new();
    let mut non_null = vec![0u64; counted.len()];
    let mut keys: HashMap<GroupKey, u64> = HashMap::new();
    for batch in ctx.output.rows(&columns, ctx.options.batch_size)? {
        for row in batch? {
            if let Some(v) = sum_pos.and_then(|p| row[p].as_f64()) {
                sum.add(v);
            }
            for (n, (_, _, p)) in non_null.iter_mut().zip(&counted) {
                if !row[*p].is_null() {
                    *n += 1;
                }
            }
            if !key_positions.is_empty() {
                *keys.entry(GroupKey::from_row(&row, &key_positions)).or_insert(0) += 1;
            }
        }
    }

    let mut checks = 0;
    let mut summary = Vec::new();
    if let Some(expected) = &ctx.stats.sum {
        checks += 1;
        let actual = sum.value();
        if (expected.value - actual).abs() > ctx.options.sum_tolerance {
            return Err(ValidationFailure::ChecksumMismatch {
                column: expected.column.clone(),
                expected: Measure::Sum(expected.value),
                actual: Measure::Sum(actual),
            }
            .into());
        }
        summary.push(format!("sum({}) = {actual}", expected.column));
    }

    for ((name, expected, _), actual) in counted.iter().zip(&non_null) {
        checks += 1;
        if expected != actual {
            return Err(ValidationFailure::ChecksumMismatch {
                column: (*name).clone(),
                expected: Measure::Count(*expected),
                actual: Measure::Count(*actual),
            }
            .into());
        }
    }
    if !counted.is_empty() {
        summary.push(format!("{} non-null counts", counted.len()));
    }

    if !key.is_empty() {
        checks += 1;
        let mut duplicates: Vec<(GroupKey, u64)> = keys.into_iter().filter(|(_, n)| *n > 1).collect();
        if !duplicates.is_empty() {
            duplicates.sort();
            let total = duplicates.len() as u64;
            return Err(ValidationFailure::DuplicateKey {
                key_columns: key,
                duplicates: duplicates
                    .into_iter()
                    .take(ctx.options.max_reported_duplicates)
                    .map(|(k, n)| (k.to_string(), n))
                    .collect(),
                total,
            }
            .into());
        }
        summary.push(format!("unique on ({})", key.join(", ")));
    }

    Ok(TierCheck {
        checks,
        summary: summary.join("; "),
    })
}
