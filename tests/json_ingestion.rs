use rust_data_stream::ingestion::json::{json_producer_from_path, json_producer_from_str};
use rust_data_stream::ingestion::{
    producer_from_path, stream_from_path, IngestionFormat, IngestionOptions, IngestionRequest,
};
use rust_data_stream::types::{DataType, Field, Schema};
use rust_data_stream::{ErrorPolicy, Stream, StreamError, Value};

fn people_schema_nested() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("user.name", DataType::Utf8),
        Field::new("score", DataType::Float64),
        Field::new("active", DataType::Bool),
    ])
}

#[test]
fn json_array_from_path_happy_path() {
    let schema = people_schema_nested();
    let rows = Stream::new(json_producer_from_path("tests/fixtures/people.json", &schema).unwrap())
        .to_list()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].field("id"), Some(&Value::Int64(1)));
    assert_eq!(rows[0].field("user.name"), Some(&Value::from("Ada")));
    assert_eq!(rows[1].field("user.name"), Some(&Value::from("Grace")));
}

#[test]
fn json_missing_field_is_a_schema_mismatch() {
    let schema = people_schema_nested();
    let input = r#"[{"id":1,"user":{"name":"Ada"},"score":98.5}]"#;
    let err = Stream::new(json_producer_from_str(input, &schema).unwrap())
        .to_list()
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("schema mismatch"));
    assert!(msg.contains("missing required field 'active'"));
}

#[test]
fn json_type_mismatch_is_a_parse_error() {
    let schema = people_schema_nested();
    let input = r#"[{"id":"nope","user":{"name":"Ada"},"score":98.5,"active":true}]"#;
    let err = Stream::new(json_producer_from_str(input, &schema).unwrap())
        .to_list()
        .unwrap_err();
    assert!(matches!(err, StreamError::ParseError { row: 1, .. }));
}

#[test]
fn ndjson_with_bad_row_under_skip_policy() {
    let schema = people_schema_nested();
    let options = IngestionOptions::default();
    let ids = stream_from_path("tests/fixtures/people.ndjson", &schema, &options)
        .unwrap()
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .to_pairs()
        .unwrap();
    let keys: Vec<Value> = ids.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![Value::Int64(0), Value::Int64(2)]);
    assert_eq!(ids[1].1.field("score"), Some(&Value::Null));
}

#[test]
fn explicit_format_overrides_extension() {
    let schema = Schema::new(vec![Field::new("id", DataType::Int64)]);
    let opts = IngestionOptions {
        format: Some(IngestionFormat::Json),
    };
    let producer = producer_from_path("tests/fixtures/people.json", &schema, &opts).unwrap();
    let count = Stream::new(producer)
        .count()
        .unwrap()
        .get()
        .unwrap();
    assert_eq!(count, Value::Int64(2));
}

#[test]
fn request_can_be_opened_repeatedly() {
    let request = IngestionRequest {
        path: "tests/fixtures/people.csv".into(),
        schema: Schema::new(vec![Field::new("name", DataType::Utf8)]),
        options: IngestionOptions::default(),
    };
    for _ in 0..2 {
        let n = request.stream().unwrap().count().unwrap().get().unwrap();
        assert_eq!(n, Value::Int64(3));
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let schema = people_schema_nested();
    let options = IngestionOptions::default();
    let err = producer_from_path("tests/fixtures/nope.json", &schema, &options).unwrap_err();
    assert!(matches!(err, StreamError::Io(_)));
}
