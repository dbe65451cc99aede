//! Schema coercion: raw source values into typed [`Value`]s.
//!
//! Rules:
//!
//! - Null markers (per schema), `nan` and NaN floats become [`Value::Null`] before any parsing.
//! - The field's transform, if any, runs on the text form of non-null values.
//! - Strings are stored exactly as read (no trimming).
//! - Integers are exact and range-checked; integral float notation (`"1980.0"`) is accepted.
//! - Floats accept integers exactly representable as `f64`.
//! - Lists come from native list cells or JSON array text.
//!
//! No value is silently truncated, rounded, or dropped: anything that does not fit is an error
//! naming the source row, column and raw value.

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Batch, DataType, Field, RawBatch, RawRow, RawValue, Schema, Value};

/// Largest integer magnitude a `f64` holds exactly.
const MAX_EXACT_F64_INT: i64 = 1 << 53;

/// Converts raw batches laid out by `columns` into batches of `schema`.
#[derive(Debug, Clone)]
pub struct Coercer {
    schema: Arc<Schema>,
    positions: Vec<usize>,
}

impl Coercer {
    /// Resolve each field's source column in `columns`.
    pub fn new(schema: Arc<Schema>, columns: &[String]) -> PipelineResult<Self> {
        let positions = schema
            .fields
            .iter()
            .map(|f| {
                columns.iter().position(|c| c == f.source_name()).ok_or_else(|| {
                    PipelineError::config(format!(
                        "field '{}' reads source column '{}', which the source does not provide",
                        f.name,
                        f.source_name()
                    ))
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self { schema, positions })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Coerce every row; the first failure aborts with its row and column.
    pub fn coerce(&self, raw: &RawBatch) -> PipelineResult<Batch> {
        let rows = raw
            .rows
            .iter()
            .map(|row| self.coerce_row(row))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Batch::new(Arc::clone(&self.schema), rows))
    }

    pub fn coerce_row(&self, row: &RawRow) -> PipelineResult<Vec<Value>> {
        self.schema
            .fields
            .iter()
            .zip(&self.positions)
            .map(|(field, &idx)| coerce_value(&self.schema, field, row.position, &row.values[idx]))
            .collect()
    }
}

/// Coerce one source value for `field`.
pub fn coerce_value(schema: &Schema, field: &Field, row: u64, raw: &RawValue) -> PipelineResult<Value> {
    if schema.is_null_raw(raw) {
        return Ok(Value::Null);
    }

    let raw: Cow<'_, RawValue> = match &field.transform {
        Some(transform) => {
            let text = raw.render();
            let out = transform.apply(&text).map_err(|message| PipelineError::Transform {
                row,
                column: field.name.clone(),
                raw: text.clone(),
                message,
            })?;
            Cow::Owned(RawValue::Text(out))
        }
        None => Cow::Borrowed(raw),
    };
    if schema.is_null_raw(&raw) {
        return Ok(Value::Null);
    }

    coerce_scalar_or_list(schema, field.data_type, &raw).map_err(|message| PipelineError::Coercion {
        row,
        column: field.name.clone(),
        raw: raw.render(),
        message,
    })
}

fn coerce_scalar_or_list(schema: &Schema, data_type: DataType, raw: &RawValue) -> Result<Value, String> {
    match data_type.element_type() {
        Some(element) => {
            let items = list_items(raw)?;
            items
                .iter()
                .map(|item| {
                    if schema.is_null_raw(item) {
                        Ok(Value::Null)
                    } else {
                        coerce_scalar(element, item)
                    }
                })
                .collect::<Result<Vec<_>, String>>()
                .map(Value::List)
        }
        None => coerce_scalar(data_type, raw),
    }
}

/// Coerce a non-null scalar.
pub fn coerce_scalar(data_type: DataType, raw: &RawValue) -> Result<Value, String> {
    match data_type {
        DataType::Utf8 => match raw {
            RawValue::List(_) => Err("expected a scalar, found a list".to_owned()),
            other => Ok(Value::Utf8(other.render())),
        },
        DataType::Int16 => {
            let v = parse_integer(raw)?;
            i16::try_from(v)
                .map(Value::Int16)
                .map_err(|_| format!("{v} is out of range for int16"))
        }
        DataType::Int32 => {
            let v = parse_integer(raw)?;
            i32::try_from(v)
                .map(Value::Int32)
                .map_err(|_| format!("{v} is out of range for int32"))
        }
        DataType::Int64 => parse_integer(raw).map(Value::Int64),
        DataType::Float64 => parse_float(raw).map(Value::Float64),
        DataType::Bool => match raw {
            RawValue::Bool(b) => Ok(Value::Bool(*b)),
            RawValue::Int(0) => Ok(Value::Bool(false)),
            RawValue::Int(1) => Ok(Value::Bool(true)),
            RawValue::Text(s) => parse_bool(s.trim()).map(Value::Bool),
            _ => Err("expected bool (true/false/1/0/yes/no)".to_owned()),
        },
        DataType::ListUtf8 | DataType::ListInt16 => Err("expected a scalar element, found a list".to_owned()),
    }
}

/// Exact integer parse. Float notation is accepted only for integral values.
pub fn parse_integer(raw: &RawValue) -> Result<i64, String> {
    match raw {
        RawValue::Int(v) => Ok(*v),
        RawValue::Float(v) => integral_float(*v),
        RawValue::Text(s) => integer_text(s.trim()),
        RawValue::Bool(_) => Err("expected integer, found a boolean".to_owned()),
        RawValue::List(_) => Err("expected integer, found a list".to_owned()),
        RawValue::Null => Err("expected integer, found null".to_owned()),
    }
}

/// Parse decimal text (`"1980"`, `"1980.00"`, `"1.98e3"`) as an integer on the digits
/// themselves, never through `f64`. Every digit left after the decimal point must be zero.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integer_text(t: &str) -> Result<i64, String> {
    if let Ok(v) = t.parse::<i64>() {
        return Ok(v);
    }

    let (sign, unsigned) = match t.as_bytes().first() {
        Some(b'-') => ("-", &t[1..]),
        Some(b'+') => ("", &t[1..]),
        _ => ("", t),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(i) => {
            let exp = unsigned[i + 1..]
                .parse::<i64>()
                .map_err(|_| format!("expected integer, found '{t}'"))?;
            (&unsigned[..i], exp)
        }
        None => (unsigned, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(format!("expected integer, found '{t}'"));
    }

    let digits = format!("{whole}{fraction}");
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    // Position of the decimal point within `significant`.
    let leading_zeros = (digits.len() - significant.len()) as i64;
    let point = (whole.len() as i64).saturating_add(exponent).saturating_sub(leading_zeros);
    if point > 19 {
        return Err(format!("'{t}' is out of range for int64"));
    }

    let (int_part, rest) = if point <= 0 {
        (String::new(), significant)
    } else if point as usize >= significant.len() {
        let zeros = "0".repeat(point as usize - significant.len());
        (format!("{significant}{zeros}"), "")
    } else {
        let (i, r) = significant.split_at(point as usize);
        (i.to_owned(), r)
    };
    if rest.bytes().any(|b| b != b'0') {
        return Err(format!("'{t}' is not an integer"));
    }
    if int_part.is_empty() {
        return Ok(0);
    }
    format!("{sign}{int_part}")
        .parse::<i64>()
        .map_err(|_| format!("'{t}' is out of range for int64"))
}

/// Native float cells are integers only below 2^53, where every integer is exact.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_float(v: f64) -> Result<i64, String> {
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(format!("{v} is not an integer"));
    }
    if v.abs() >= MAX_EXACT_F64_INT as f64 {
        return Err(format!("{v} is too large to be an exact integer"));
    }
    Ok(v as i64)
}

/// Float parse. Text that overflows `f64` (`"1e400"`) is an error, not infinity.
#[allow(clippy::cast_precision_loss)]
pub fn parse_float(raw: &RawValue) -> Result<f64, String> {
    match raw {
        RawValue::Float(v) => Ok(*v),
        RawValue::Int(v) if v.unsigned_abs() <= MAX_EXACT_F64_INT.unsigned_abs() => Ok(*v as f64),
        RawValue::Int(v) => Err(format!("{v} cannot be represented exactly as float64")),
        RawValue::Text(s) => {
            let t = s.trim();
            let v = t.parse::<f64>().map_err(|e| format!("expected number: {e}"))?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(format!("'{t}' is out of range for float64"))
            }
        }
        RawValue::Bool(_) => Err("expected number, found a boolean".to_owned()),
        RawValue::List(_) => Err("expected number, found a list".to_owned()),
        RawValue::Null => Err("expected number, found null".to_owned()),
    }
}

pub fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

/// Elements of a native list cell or of a JSON array in text.
pub fn list_items(raw: &RawValue) -> Result<Vec<RawValue>, String> {
    match raw {
        RawValue::List(items) => Ok(items.clone()),
        RawValue::Text(s) => {
            let parsed: serde_json::Value =
                serde_json::from_str(s.trim()).map_err(|e| format!("expected a JSON array: {e}"))?;
            match parsed {
                serde_json::Value::Array(items) => items.into_iter().map(json_item).collect(),
                _ => Err("expected a JSON array".to_owned()),
            }
        }
        _ => Err("expected a list".to_owned()),
    }
}

fn json_item(v: serde_json::Value) -> Result<RawValue, String> {
    match v {
        serde_json::Value::Null => Ok(RawValue::Null),
        serde_json::Value::Bool(b) => Ok(RawValue::Bool(b)),
        serde_json::Value::String(s) => Ok(RawValue::Text(s)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(RawValue::Int(i)),
            None => n
                .as_f64()
                .map(RawValue::Float)
                .ok_or_else(|| format!("unsupported number {n}")),
        },
        other => Err(format!("nested value {other} is not a list element")),
    }
}
