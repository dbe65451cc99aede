use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult, ValidationFailure};
use crate::execution::JobKind;
use crate::processing::Coercer;
use crate::types::GroupKey;

use super::source_scan::QualifyingRows;
use super::{TierCheck, ValidationContext};

pub(crate) fn run(ctx: &ValidationContext<'_>) -> PipelineResult<TierCheck> {
    let actual = ctx.output.row_count()?;
    let (expected, summary) = match &ctx.job.kind {
        JobKind::PassThrough => (
            ctx.stats.row_count,
            format!("{actual} output rows, {} rows written", ctx.stats.row_count),
        ),
        JobKind::Aggregate(group) => {
            let distinct = distinct_source_keys(ctx, &group.key)?;
            (distinct, format!("{actual} output rows, {distinct} distinct source keys"))
        }
    };

    if expected != actual {
        return Err(ValidationFailure::RowCountMismatch { expected, actual }.into());
    }
    Ok(TierCheck { checks: 1, summary })
}

/// Distinct values of `key` among qualifying source rows, coercing only the key columns.
fn distinct_source_keys(ctx: &ValidationContext<'_>, key: &[String]) -> PipelineResult<u64> {
    let key_schema = ctx
        .job
        .schema
        .project(key)
        .ok_or_else(|| PipelineError::config(format!("group key ({}) is not in the input schema", key.join(", "))))?;
    let rows = QualifyingRows::open(ctx.job, ctx.source, ctx.options.batch_size)?;
    let coercer = Coercer::new(Arc::new(key_schema), rows.columns())?;
    let positions: Vec<usize> = (0..key.len()).collect();

    let mut seen = HashSet::new();
    for item in rows {
        let (_, row) = item?;
        let values = coercer.coerce_row(&row)?;
        seen.insert(GroupKey::from_row(&values, &positions));
    }
    Ok(seen.len() as u64)
}
