//! Lazy record producers for files on disk.
//!
//! Most callers should use [`producer_from_path`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`IngestionOptions`])
//! - checks the schema against the input before any record is pulled
//! - yields one `(row index, record)` item per pull
//!
//! A record is a [`Value::Map`] of `(field name, typed value)` entries in schema order.
//! Per-record parse failures are yielded as errors, so the consuming stream's error policy
//! decides whether a bad row aborts the run or is skipped.
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]

pub mod csv;
pub mod json;
pub mod unified;

pub use unified::{
    producer_from_path, stream_from_path, IngestionFormat, IngestionOptions, IngestionRequest,
};

use crate::types::{Schema, Value};

/// Pair each parsed value with its schema field name.
pub(crate) fn record(schema: &Schema, values: Vec<Value>) -> Value {
    Value::Map(
        schema
            .fields
            .iter()
            .zip(values)
            .map(|(field, value)| (Value::Utf8(field.name.clone()), value))
            .collect(),
    )
}
