//! Core data model: schemas, untyped source values, typed values and record batches.
//!
//! A conversion job reads [`RawBatch`]es (values exactly as the source produced them), coerces
//! them into [`Batch`]es whose values match a declared [`Schema`], and writes those to Parquet.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use ordered_float::OrderedFloat;

/// Null markers every schema starts with: the empty string and the MySQL-export `\N`.
pub const DEFAULT_NULL_MARKERS: &[&str] = &["", "\\N"];

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// UTF-8 string.
    Utf8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// List of nullable strings.
    ListUtf8,
    /// List of nullable 16-bit integers.
    ListInt16,
}

impl DataType {
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == Self::Float64
    }

    pub fn is_list(self) -> bool {
        matches!(self, Self::ListUtf8 | Self::ListInt16)
    }

    /// Element type of a list type.
    pub fn element_type(self) -> Option<Self> {
        match self {
            Self::ListUtf8 => Some(Self::Utf8),
            Self::ListInt16 => Some(Self::Int16),
            _ => None,
        }
    }

    /// List type whose elements are `self`, if one exists.
    pub fn list_of(self) -> Option<Self> {
        match self {
            Self::Utf8 => Some(Self::ListUtf8),
            Self::Int16 => Some(Self::ListInt16),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "string",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "boolean",
            Self::ListUtf8 => "list<string>",
            Self::ListInt16 => "list<int16>",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A deterministic rewrite applied to a source value before type coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Strip leading/trailing whitespace.
    Trim,
    /// Drop a fixed number of trailing characters, e.g. the 4-digit year glued onto an ICPSR id
    /// (`"100751980"` -> `"10075"`).
    ///
    /// Inputs not strictly longer than `len` are rejected rather than truncated to nothing.
    StripSuffix { len: usize },
}

impl Transform {
    /// Apply the transform, returning a message describing why the input is outside its domain.
    pub fn apply(&self, input: &str) -> Result<String, String> {
        match self {
            Self::Trim => Ok(input.trim().to_owned()),
            Self::StripSuffix { len } => {
                let chars = input.chars().count();
                if chars <= *len {
                    return Err(format!(
                        "value has {chars} characters; stripping a {len}-character suffix requires more"
                    ));
                }
                Ok(input.chars().take(chars - len).collect())
            }
        }
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Output column name.
    pub name: String,
    /// Declared target type.
    pub data_type: DataType,
    /// Source column name when it differs from `name`.
    pub source: Option<String>,
    /// Rewrite applied to non-null source values before coercion.
    pub transform: Option<Transform>,
}

impl Field {
    /// Create a new field read from a source column of the same name.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            source: None,
            transform: None,
        }
    }

    /// Read this field from a differently named source column.
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Name of the source column this field is read from.
    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered, immutable description of one logical record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Record type name (e.g. `dime_contributions`).
    pub name: String,
    /// Ordered list of fields.
    pub fields: Vec<Field>,
    /// Source strings that mean "missing". Matched exactly; `nan` (any case) is always null.
    pub null_markers: Vec<String>,
}

impl Schema {
    /// Create a new schema using [`DEFAULT_NULL_MARKERS`].
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            null_markers: DEFAULT_NULL_MARKERS.iter().map(|m| (*m).to_owned()).collect(),
        }
    }

    /// Replace the null markers. The empty string is always kept.
    pub fn with_null_markers(mut self, markers: &[&str]) -> Self {
        self.null_markers = std::iter::once("")
            .chain(markers.iter().copied().filter(|m| !m.is_empty()))
            .map(str::to_owned)
            .collect();
        self
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Source column names in field order, without duplicates.
    pub fn source_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            if !out.iter().any(|c| c == f.source_name()) {
                out.push(f.source_name().to_owned());
            }
        }
        out
    }

    /// A schema holding only the named fields, in the order given.
    pub fn project(&self, names: &[String]) -> Option<Schema> {
        let fields = names
            .iter()
            .map(|n| self.field(n).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Schema {
            name: self.name.clone(),
            fields,
            null_markers: self.null_markers.clone(),
        })
    }

    /// Whether a source string is one of the null representations.
    pub fn is_null_text(&self, s: &str) -> bool {
        self.null_markers.iter().any(|m| m == s) || s.trim().eq_ignore_ascii_case("nan")
    }

    /// Whether a source value normalizes to null.
    pub fn is_null_raw(&self, raw: &RawValue) -> bool {
        match raw {
            RawValue::Null => true,
            RawValue::Text(s) => self.is_null_text(s),
            RawValue::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// View a source value with null normalization applied.
    pub fn raw_cell<'a>(&self, raw: &'a RawValue) -> Cell<'a> {
        if self.is_null_raw(raw) {
            Cell::Null
        } else {
            raw.cell()
        }
    }
}

/// A value as the source produced it, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<RawValue>),
}

impl RawValue {
    /// Text form used for transforms, string targets and error messages.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::render).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    pub fn cell(&self) -> Cell<'_> {
        match self {
            Self::Null => Cell::Null,
            Self::Text(s) => Cell::Text(s),
            Self::Int(v) => Cell::Int(*v),
            Self::Float(v) => Cell::Float(*v),
            Self::Bool(v) => Cell::Bool(*v),
            Self::List(items) => Cell::List(items.len()),
        }
    }
}

/// A single typed value in a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value (after null normalization).
    Null,
    Utf8(String),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    /// Elements share the list field's element type; elements may be `Null`.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Text form of the value; the inverse of coercing canonical source text.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Utf8(s) => s.clone(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::render).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    pub fn cell(&self) -> Cell<'_> {
        match self {
            Self::Null => Cell::Null,
            Self::Utf8(s) => Cell::Text(s),
            Self::Float64(v) => Cell::Float(*v),
            Self::Bool(v) => Cell::Bool(*v),
            Self::List(items) => Cell::List(items.len()),
            other => other.as_i64().map_or(Cell::Null, Cell::Int),
        }
    }

    /// Total order used by MIN/MAX/LAST_BY: nulls first, numbers by value, then strings,
    /// booleans and lists.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => a.rank().cmp(&b.rank()),
                },
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int16(_) | Self::Int32(_) | Self::Int64(_) | Self::Float64(_) => 1,
            Self::Utf8(_) => 2,
            Self::Bool(_) => 3,
            Self::List(_) => 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            other => f.write_str(&other.render()),
        }
    }
}

/// Borrowed, type-erased view of a value used by row predicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Null,
    Text(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A list cell; only its length is visible.
    List(usize),
}

impl Cell<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view; text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Text view; numbers and booleans are rendered.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null | Self::List(_) => None,
            Self::Text(s) => Some(Cow::Borrowed(s)),
            Self::Int(v) => Some(Cow::Owned(v.to_string())),
            Self::Float(v) => Some(Cow::Owned(v.to_string())),
            Self::Bool(v) => Some(Cow::Owned(v.to_string())),
        }
    }
}

/// Hashable, totally ordered form of one grouping-key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    List(Vec<KeyPart>),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Utf8(s) => Self::Text(s.clone()),
            Value::Bool(b) => Self::Bool(*b),
            // -0.0 and 0.0 are one group.
            Value::Float64(v) => Self::Float(OrderedFloat(if *v == 0.0 { 0.0 } else { *v })),
            Value::List(items) => Self::List(items.iter().map(Self::from).collect()),
            other => other.as_i64().map_or(Self::Null, Self::Int),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{}", v.0),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", inner.join(", "))
            }
        }
    }
}

/// Ordered tuple of key column values identifying one output row of an aggregation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<KeyPart>);

impl GroupKey {
    /// Build a key from a row and the positions of the key columns.
    pub fn from_row(row: &[Value], key_positions: &[usize]) -> Self {
        Self(key_positions.iter().map(|&i| KeyPart::from(&row[i])).collect())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// One source row: its 0-based position among the source's data rows plus its values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub position: u64,
    pub values: Vec<RawValue>,
}

/// A bounded chunk of untyped source rows, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    /// Column names, matching each row's `values`.
    pub columns: Arc<[String]>,
    pub rows: Vec<RawRow>,
}

impl RawBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A bounded chunk of typed rows conforming to one [`Schema`].
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the schema fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub schema: Arc<Schema>,
    pub rows: Vec<Vec<Value>>,
}

impl Batch {
    pub fn new(schema: Arc<Schema>, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the batch.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_suffix_recovers_embedded_identifier() {
        let t = Transform::StripSuffix { len: 4 };
        assert_eq!(t.apply("100751980").unwrap(), "10075");
        assert!(t.apply("1980").is_err());
        assert!(t.apply("").is_err());
    }

    #[test]
    fn null_markers_always_keep_empty_string() {
        let schema = Schema::new("s", vec![]).with_null_markers(&["N/A"]);
        assert!(schema.is_null_text(""));
        assert!(schema.is_null_text("N/A"));
        assert!(schema.is_null_text("NaN"));
        assert!(schema.is_null_text("nan"));
        assert!(!schema.is_null_text("\\N"));
        assert!(!schema.is_null_text("n/a"));
    }

    #[test]
    fn nan_float_is_null() {
        let schema = Schema::new("s", vec![]);
        assert!(schema.is_null_raw(&RawValue::Float(f64::NAN)));
        assert!(!schema.is_null_raw(&RawValue::Float(0.0)));
    }

    #[test]
    fn total_cmp_orders_nulls_first_and_mixes_integer_widths() {
        assert_eq!(Value::Null.total_cmp(&Value::Int16(0)), Ordering::Less);
        assert_eq!(Value::Int16(7).total_cmp(&Value::Int64(7)), Ordering::Equal);
        assert_eq!(Value::Float64(1.5).total_cmp(&Value::Int32(2)), Ordering::Less);
        assert_eq!(
            Value::Utf8("b".into()).total_cmp(&Value::Utf8("a".into())),
            Ordering::Greater
        );
    }

    #[test]
    fn source_columns_are_deduplicated_in_field_order() {
        let schema = Schema::new(
            "s",
            vec![
                Field::new("icpsr", DataType::Utf8).from_source("ICPSR"),
                Field::new("raw_icpsr", DataType::Utf8).from_source("ICPSR"),
                Field::new("name", DataType::Utf8),
            ],
        );
        assert_eq!(schema.source_columns(), vec!["ICPSR".to_string(), "name".to_string()]);
    }
}
