//! Declarative row predicates.
//!
//! Predicates run on raw source rows (with null normalization) to pick qualifying rows, and on
//! typed rows inside conditional reducers (`SUM_IF`, `COUNT_IF`). Comparisons against a null
//! cell are false, so `NotEquals("type", "I")` also drops rows whose type is missing.

use std::collections::HashMap;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Cell, RawBatch, RawRow, Schema};

/// A boolean expression over named columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column is not null.
    NotNull(String),
    /// Column text equals the literal.
    Equals(String, String),
    /// Column is not null and its text differs from the literal.
    NotEquals(String, String),
    /// Column text is strictly longer than `n` characters.
    LongerThan(String, usize),
    /// Column is numeric and `>=` the bound.
    AtLeast(String, f64),
    /// Column is numeric and `<=` the bound.
    AtMost(String, f64),
    /// Every predicate holds (true when empty).
    All(Vec<Predicate>),
    /// At least one predicate holds (false when empty).
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::NotNull(column.into())
    }

    pub fn equals(column: impl Into<String>, literal: impl Into<String>) -> Self {
        Self::Equals(column.into(), literal.into())
    }

    pub fn not_equals(column: impl Into<String>, literal: impl Into<String>) -> Self {
        Self::NotEquals(column.into(), literal.into())
    }

    pub fn longer_than(column: impl Into<String>, n: usize) -> Self {
        Self::LongerThan(column.into(), n)
    }

    pub fn at_least(column: impl Into<String>, bound: f64) -> Self {
        Self::AtLeast(column.into(), bound)
    }

    pub fn at_most(column: impl Into<String>, bound: f64) -> Self {
        Self::AtMost(column.into(), bound)
    }

    /// Conjunction, flattening nested `All`s.
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = match self {
            Self::All(parts) => parts,
            p => vec![p],
        };
        match other {
            Self::All(more) => parts.extend(more),
            p => parts.push(p),
        }
        Self::All(parts)
    }

    /// Column names referenced by the predicate, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::NotNull(c)
            | Self::Equals(c, _)
            | Self::NotEquals(c, _)
            | Self::LongerThan(c, _)
            | Self::AtLeast(c, _)
            | Self::AtMost(c, _) => {
                if !out.contains(&c.as_str()) {
                    out.push(c);
                }
            }
            Self::All(ps) | Self::Any(ps) => ps.iter().for_each(|p| p.collect_columns(out)),
            Self::Not(p) => p.collect_columns(out),
        }
    }

    /// Evaluate against a row, resolving columns through `cell`.
    pub fn matches<'a>(&self, cell: &dyn Fn(&str) -> Cell<'a>) -> bool {
        match self {
            Self::NotNull(c) => !cell(c.as_str()).is_null(),
            Self::Equals(c, lit) => cell(c.as_str()).as_text().is_some_and(|t| t == lit.as_str()),
            Self::NotEquals(c, lit) => cell(c.as_str()).as_text().is_some_and(|t| t != lit.as_str()),
            Self::LongerThan(c, n) => cell(c.as_str()).as_text().is_some_and(|t| t.chars().count() > *n),
            Self::AtLeast(c, bound) => cell(c.as_str()).as_f64().is_some_and(|v| v >= *bound),
            Self::AtMost(c, bound) => cell(c.as_str()).as_f64().is_some_and(|v| v <= *bound),
            Self::All(ps) => ps.iter().all(|p| p.matches(cell)),
            Self::Any(ps) => ps.iter().any(|p| p.matches(cell)),
            Self::Not(p) => !p.matches(cell),
        }
    }
}

/// A predicate bound to a raw column layout and a schema's null markers.
#[derive(Debug, Clone)]
pub struct RowFilter {
    predicate: Predicate,
    positions: HashMap<String, usize>,
    schema: Schema,
}

impl RowFilter {
    /// Bind `predicate` to `columns`. Every referenced column must be present.
    pub fn new(predicate: Predicate, columns: &[String], schema: &Schema) -> PipelineResult<Self> {
        let mut positions = HashMap::new();
        for name in predicate.columns() {
            let idx = columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| PipelineError::config(format!("filter references unknown column '{name}'")))?;
            positions.insert(name.to_owned(), idx);
        }
        Ok(Self {
            predicate,
            positions,
            schema: Schema {
                name: schema.name.clone(),
                fields: Vec::new(),
                null_markers: schema.null_markers.clone(),
            },
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Whether a raw row qualifies.
    pub fn keep(&self, row: &RawRow) -> bool {
        let lookup = |name: &str| match self.positions.get(name) {
            Some(&i) => self.schema.raw_cell(&row.values[i]),
            None => Cell::Null,
        };
        self.predicate.matches(&lookup)
    }

    /// Drop non-qualifying rows, keeping source order and positions.
    pub fn apply(&self, mut batch: RawBatch) -> RawBatch {
        batch.rows.retain(|row| self.keep(row));
        batch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{RawValue, Schema};

    fn batch(rows: &[(&str, &str)]) -> RawBatch {
        RawBatch {
            columns: Arc::from(vec!["type".to_string(), "icpsr".to_string()]),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, (t, id))| RawRow {
                    position: i as u64,
                    values: vec![RawValue::Text((*t).into()), RawValue::Text((*id).into())],
                })
                .collect(),
        }
    }

    #[test]
    fn not_equals_excludes_nulls() {
        let schema = Schema::new("s", vec![]);
        let cols = vec!["type".to_string(), "icpsr".to_string()];
        let f = RowFilter::new(Predicate::not_equals("type", "I"), &cols, &schema).unwrap();
        let out = f.apply(batch(&[("I", "1"), ("C", "2"), ("\\N", "3"), ("", "4")]));
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].position, 1);
    }

    #[test]
    fn longer_than_and_not_null_compose() {
        let schema = Schema::new("s", vec![]);
        let cols = vec!["type".to_string(), "icpsr".to_string()];
        let p = Predicate::not_null("icpsr").and(Predicate::longer_than("icpsr", 4));
        let f = RowFilter::new(p, &cols, &schema).unwrap();
        let out = f.apply(batch(&[("x", "100751980"), ("x", "1980"), ("x", "")]));
        assert_eq!(out.rows.iter().map(|r| r.position).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn numeric_bounds_parse_text() {
        let schema = Schema::new("s", vec![]);
        let cols = vec!["type".to_string(), "icpsr".to_string()];
        let f = RowFilter::new(Predicate::at_least("icpsr", 96.0), &cols, &schema).unwrap();
        let out = f.apply(batch(&[("x", "95"), ("x", "96"), ("x", "118"), ("x", "abc")]));
        assert_eq!(out.rows.iter().map(|r| r.position).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn unknown_column_is_a_config_error() {
        let schema = Schema::new("s", vec![]);
        let err = RowFilter::new(Predicate::not_null("nope"), &["a".to_string()], &schema).unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn columns_are_listed_once() {
        let p = Predicate::not_null("a")
            .and(Predicate::equals("b", "x"))
            .and(Predicate::Not(Box::new(Predicate::equals("a", "y"))));
        assert_eq!(p.columns(), vec!["a", "b"]);
    }
}
