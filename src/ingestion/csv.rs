//! CSV records as a lazy [`Producer`].

use std::io::Read;
use std::path::Path;

use crate::error::{StreamError, StreamResult};
use crate::producer::Producer;
use crate::signal::Item;
use crate::types::{DataType, Schema, Value};

use super::record;

/// Stream the records of a CSV file.
///
/// Rules:
///
/// - CSV must have headers.
/// - Headers must contain all schema fields (order can differ); checked before any record is
///   read.
/// - Each value is parsed according to the schema field type, one record per pull. A value
///   that does not parse is a per-record [`StreamError::ParseError`].
pub fn csv_producer_from_path(path: impl AsRef<Path>, schema: &Schema) -> StreamResult<Producer> {
    let rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    csv_producer(rdr, schema)
}

/// Stream CSV records from any reader.
pub fn csv_producer_from_reader<R: Read + 'static>(
    reader: R,
    schema: &Schema,
) -> StreamResult<Producer> {
    let rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    csv_producer(rdr, schema)
}

fn csv_producer<R: Read + 'static>(
    mut rdr: csv::Reader<R>,
    schema: &Schema,
) -> StreamResult<Producer> {
    let headers = rdr.headers()?.clone();

    // Map schema fields -> CSV column indexes (allows re-ordered CSV columns).
    let mut col_idxs = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        match headers.iter().position(|h| h == field.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(StreamError::SchemaMismatch {
                    message: format!(
                        "missing required column '{field}'. headers={:?}",
                        headers.iter().collect::<Vec<_>>(),
                        field = field.name
                    ),
                });
            }
        }
    }

    let schema = schema.clone();
    let records = rdr
        .into_records()
        .enumerate()
        .map(move |(row_idx0, result)| -> StreamResult<Item> {
            // Report 1-based row number for users; +1 again because header is row 1.
            let user_row = row_idx0 + 2;
            let record_fields = result?;
            let mut values = Vec::with_capacity(schema.fields.len());
            for (field, &csv_idx) in schema.fields.iter().zip(col_idxs.iter()) {
                let raw = record_fields.get(csv_idx).unwrap_or("");
                values.push(parse_typed_value(user_row, &field.name, &field.data_type, raw)?);
            }
            Ok((Value::from(row_idx0), record(&schema, values)))
        });
    Ok(Producer::new(records))
}

pub(crate) fn parse_typed_value(
    row: usize,
    column: &str,
    data_type: &DataType,
    raw: &str,
) -> StreamResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let parse_error = |message: String| StreamError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_error),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}
