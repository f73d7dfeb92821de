//! JSON records as a lazy [`Producer`].
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single JSON object (one record)
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Nested fields are supported using dot paths in schema field names (e.g. `user.name`).

use std::fs;
use std::path::Path;

use serde_json::Map as JsonMap;
use serde_json::Value as Json;

use crate::error::{StreamError, StreamResult};
use crate::producer::Producer;
use crate::signal::Item;
use crate::types::{DataType, Schema, Value};

use super::record;

/// Stream the records of a JSON or NDJSON file.
pub fn json_producer_from_path(path: impl AsRef<Path>, schema: &Schema) -> StreamResult<Producer> {
    let text = fs::read_to_string(path)?;
    json_producer_from_str(&text, schema)
}

/// Stream JSON records from an in-memory string.
///
/// A document that parses as one JSON value is decoded up front; anything else is treated as
/// NDJSON and decoded one line per pull.
pub fn json_producer_from_str(input: &str, schema: &Schema) -> StreamResult<Producer> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(StreamError::SchemaMismatch {
            message: "json input is empty".to_string(),
        });
    }

    let schema = schema.clone();
    if let Ok(v) = serde_json::from_str::<Json>(trimmed) {
        let items = match v {
            Json::Array(items) => items,
            Json::Object(_) => vec![v],
            _ => {
                return Err(StreamError::SchemaMismatch {
                    message: "json must be an object, an array of objects, or NDJSON".to_string(),
                });
            }
        };
        let records = items
            .into_iter()
            .enumerate()
            .map(move |(idx0, v)| -> StreamResult<Item> {
                Ok((Value::from(idx0), convert_record(idx0 + 1, &v, &schema)?))
            });
        return Ok(Producer::new(records));
    }

    // Fall back to NDJSON.
    let lines: Vec<(usize, String)> = trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, line.trim().to_owned()))
        .collect();
    let records = lines
        .into_iter()
        .enumerate()
        .map(move |(idx0, (line_no, line))| -> StreamResult<Item> {
            let v = serde_json::from_str::<Json>(&line).map_err(|e| StreamError::SchemaMismatch {
                message: format!("invalid ndjson at line {line_no}: {e}"),
            })?;
            Ok((Value::from(idx0), convert_record(idx0 + 1, &v, &schema)?))
        });
    Ok(Producer::new(records))
}

fn convert_record(row_num: usize, v: &Json, schema: &Schema) -> StreamResult<Value> {
    let obj = v.as_object().ok_or_else(|| StreamError::SchemaMismatch {
        message: format!("row {row_num} is not a json object"),
    })?;

    let mut values = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let jv = get_by_dot_path(obj, &field.name).ok_or_else(|| StreamError::SchemaMismatch {
            message: format!("row {row_num} missing required field '{}'", field.name),
        })?;
        values.push(convert_json_value(row_num, &field.name, &field.data_type, jv)?);
    }
    Ok(record(schema, values))
}

fn get_by_dot_path<'a>(root: &'a JsonMap<String, Json>, path: &str) -> Option<&'a Json> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        match current {
            Json::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn convert_json_value(
    row: usize,
    column: &str,
    data_type: &DataType,
    v: &Json,
) -> StreamResult<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }

    let parse_error = |message: &str| StreamError::ParseError {
        row,
        column: column.to_string(),
        raw: v.to_string(),
        message: message.to_string(),
    };

    match data_type {
        DataType::Utf8 => v
            .as_str()
            .map(|s| Value::Utf8(s.to_string()))
            .ok_or_else(|| parse_error("expected string")),
        DataType::Bool => v.as_bool().map(Value::Bool).ok_or_else(|| parse_error("expected bool")),
        DataType::Int64 => {
            if let Some(n) = v.as_i64() {
                Ok(Value::Int64(n))
            } else if let Some(n) = v.as_u64() {
                i64::try_from(n)
                    .map(Value::Int64)
                    .map_err(|_| parse_error("u64 out of range for i64"))
            } else {
                Err(parse_error("expected integer number"))
            }
        }
        DataType::Float64 => v
            .as_f64()
            .map(Value::Float64)
            .ok_or_else(|| parse_error("expected number")),
    }
}

#[cfg(test)]
mod tests {
    use super::json_producer_from_str;
    use crate::error::StreamError;
    use crate::types::{DataType, Field, Schema, Value};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("user.name", DataType::Utf8),
        ])
    }

    #[test]
    fn array_with_nested_fields() {
        let input = r#"[{"id":1,"user":{"name":"ada"}},{"id":2,"user":{"name":null}}]"#;
        let rows: Vec<_> = json_producer_from_str(input, &schema())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.field("user.name"), Some(&Value::from("ada")));
        assert_eq!(rows[1].1.field("user.name"), Some(&Value::Null));
    }

    #[test]
    fn ndjson_errors_are_per_record() {
        let input = concat!(
            "{\"id\":1,\"user\":{\"name\":\"a\"}}\n\n",
            "{\"id\":\"x\",\"user\":{\"name\":\"b\"}}\n",
            "{\"id\":3,\"user\":{\"name\":\"c\"}}\n",
        );
        let rows: Vec<_> = json_producer_from_str(input, &schema()).unwrap().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        match &rows[1] {
            Err(StreamError::ParseError { row, column, .. }) => {
                assert_eq!((*row, column.as_str()), (2, "id"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rows[2].as_ref().unwrap().0, Value::Int64(2));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            json_producer_from_str("  \n", &schema()),
            Err(StreamError::SchemaMismatch { .. })
        ));
    }
}
