//! Row-level transformations between the source reader and the sink.
//!
//! - [`filter`]: declarative predicates selecting the qualifying rows
//! - [`coerce`]: raw source values into schema-typed values
//! - [`aggregate`]: grouped reduction with declared reducers
//!
//! ## Example: filter → coerce → aggregate
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tabular_certify::processing::{Aggregator, Coercer, GroupSpec, Predicate, Reducer, RowFilter};
//! use tabular_certify::types::{DataType, Field, RawBatch, RawRow, RawValue, Schema, Value};
//!
//! let schema = Arc::new(Schema::new(
//!     "contributions",
//!     vec![Field::new("rid", DataType::Utf8), Field::new("amount", DataType::Float64)],
//! ));
//! let columns = vec!["rid".to_string(), "amount".to_string()];
//! let raw = RawBatch {
//!     columns: Arc::from(columns.clone()),
//!     rows: vec![
//!         RawRow { position: 0, values: vec![RawValue::Text("X".into()), RawValue::Text("10".into())] },
//!         RawRow { position: 1, values: vec![RawValue::Text("\\N".into()), RawValue::Text("5".into())] },
//!         RawRow { position: 2, values: vec![RawValue::Text("X".into()), RawValue::Text("20".into())] },
//!     ],
//! };
//!
//! let filter = RowFilter::new(Predicate::not_null("rid"), &columns, &schema).unwrap();
//! let coercer = Coercer::new(Arc::clone(&schema), &columns).unwrap();
//! let batch = coercer.coerce(&filter.apply(raw)).unwrap();
//!
//! let spec = GroupSpec::new("by_rid", &["rid"])
//!     .column("amount", Reducer::Sum("amount".into()))
//!     .column("contribution_count", Reducer::Count);
//! let mut agg = Aggregator::new(&schema, &spec).unwrap();
//! agg.push(&batch).unwrap();
//!
//! let rows: Vec<Vec<Value>> = agg.into_batches(1024).flat_map(|b| b.rows).collect();
//! assert_eq!(
//!     rows,
//!     vec![vec![Value::Utf8("X".into()), Value::Float64(30.0), Value::Int64(2)]]
//! );
//! ```

pub mod aggregate;
pub mod coerce;
pub mod filter;

pub use aggregate::{Aggregator, GroupSpec, GroupedBatches, OutputColumn, Reducer};
pub use coerce::{Coercer, coerce_value};
pub use filter::{Predicate, RowFilter};
