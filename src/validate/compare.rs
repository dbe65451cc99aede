//! Value comparison for the sample tier.
//!
//! [`source_matches`] checks a decoded output value against the raw source value it should
//! have come from, without going through the coercion code: nulls are normalized from the
//! schema's markers, the field transform is applied again, and the raw text is parsed for the
//! comparison only. Integers are checked by scaling the decimal mantissa in `i128`, and float
//! text must parse to a finite value.

use crate::processing::coerce::{list_items, parse_bool};
use crate::types::{DataType, Field, RawValue, Schema, Value};

/// Whether two typed values are equal; floats within a relative `tolerance`.
///
/// Integer pairs compare exactly regardless of width. Lists compare element-wise.
pub fn values_match(expected: &Value, actual: &Value, tolerance: f64) -> bool {
    match (expected, actual) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::List(e), Value::List(a)) => {
            e.len() == a.len() && e.iter().zip(a).all(|(x, y)| values_match(x, y, tolerance))
        }
        (e, a) => match (e.as_i64(), a.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (e.as_f64(), a.as_f64()) {
                (Some(x), Some(y)) => floats_close(x, y, tolerance),
                _ => e == a,
            },
        },
    }
}

fn floats_close(expected: f64, actual: f64, tolerance: f64) -> bool {
    expected == actual || (expected - actual).abs() <= tolerance * expected.abs().max(1.0)
}

/// Check that `actual` is what `raw` becomes under `field`.
///
/// On mismatch returns the expected value as text.
pub fn source_matches(schema: &Schema, field: &Field, raw: &RawValue, actual: &Value, tolerance: f64) -> Result<(), String> {
    if schema.is_null_raw(raw) {
        return if actual.is_null() { Ok(()) } else { Err("null".to_owned()) };
    }
    let transformed;
    let raw = match &field.transform {
        Some(t) => {
            let text = t.apply(&raw.render()).map_err(|m| format!("<transform rejects input: {m}>"))?;
            transformed = RawValue::Text(text);
            &transformed
        }
        None => raw,
    };
    if schema.is_null_raw(raw) {
        return if actual.is_null() { Ok(()) } else { Err("null".to_owned()) };
    }

    if raw_matches(schema, field.data_type, raw, actual, tolerance) {
        Ok(())
    } else {
        Err(raw.render())
    }
}

fn raw_matches(schema: &Schema, data_type: DataType, raw: &RawValue, actual: &Value, tolerance: f64) -> bool {
    match (data_type, actual) {
        (_, Value::Null) => false,
        (DataType::Utf8, Value::Utf8(s)) => !matches!(raw, RawValue::List(_)) && raw.render() == *s,
        (DataType::Bool, Value::Bool(b)) => match raw {
            RawValue::Bool(x) => x == b,
            RawValue::Int(i) => (*i == 1 && *b) || (*i == 0 && !*b),
            RawValue::Text(s) => parse_bool(s.trim()).is_ok_and(|x| x == *b),
            _ => false,
        },
        (DataType::Float64, Value::Float64(a)) => match raw {
            RawValue::Float(e) => floats_close(*e, *a, tolerance),
            RawValue::Int(e) => i64_to_f64_exact(*e).is_some_and(|e| floats_close(e, *a, tolerance)),
            RawValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .is_ok_and(|e| e.is_finite() && floats_close(e, *a, tolerance)),
            _ => false,
        },
        (dt, a) if dt.is_integer() => match (raw, a.as_i64()) {
            (RawValue::Int(e), Some(a)) => *e == a,
            (RawValue::Float(e), Some(a)) => i64_to_f64_exact(a).is_some_and(|a| *e == a),
            (RawValue::Text(s), Some(a)) => decimal_equals(s.trim(), a),
            _ => false,
        },
        (dt, Value::List(items)) => match (dt.element_type(), list_items(raw)) {
            (Some(element), Ok(raws)) => {
                raws.len() == items.len()
                    && raws.iter().zip(items).all(|(r, a)| {
                        if schema.is_null_raw(r) {
                            a.is_null()
                        } else {
                            raw_matches(schema, element, r, a, tolerance)
                        }
                    })
            }
            _ => false,
        },
        _ => false,
    }
}

/// `v` as `f64` when the conversion is exact (|v| < 2^53).
#[allow(clippy::cast_precision_loss)]
fn i64_to_f64_exact(v: i64) -> Option<f64> {
    (v.unsigned_abs() < 1u64 << 53).then_some(v as f64)
}

/// Whether decimal text (`"1980"`, `"1980.00"`, `"1.98e3"`) denotes exactly `actual`.
///
/// The text is read as `mantissa * 10^scale` and compared by cross-multiplying in `i128`.
fn decimal_equals(text: &str, actual: i64) -> bool {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => match e.parse::<i64>() {
            Ok(e) => (m, e),
            Err(_) => return false,
        },
        None => (unsigned, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return false;
    }

    let fraction = fraction.trim_end_matches('0');
    let digits = format!("{whole}{fraction}");
    let digits = digits.trim_start_matches('0');
    let magnitude = if digits.is_empty() {
        0
    } else {
        match digits.parse::<i128>() {
            Ok(m) => m,
            Err(_) => return false,
        }
    };
    let mantissa = if negative { -magnitude } else { magnitude };
    let Ok(fraction_len) = i64::try_from(fraction.len()) else {
        return false;
    };
    let scale = exponent.saturating_sub(fraction_len);
    let actual = i128::from(actual);
    if mantissa == 0 || actual == 0 {
        return mantissa == actual;
    }
    if scale >= 0 {
        pow10(scale).and_then(|p| mantissa.checked_mul(p)) == Some(actual)
    } else {
        pow10(-scale).and_then(|p| actual.checked_mul(p)) == Some(mantissa)
    }
}

fn pow10(n: i64) -> Option<i128> {
    u32::try_from(n).ok().and_then(|n| 10i128.checked_pow(n))
}
