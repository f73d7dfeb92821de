//! Unified ingestion entrypoint.
//!
//! - If [`IngestionOptions::format`] is `None`, the ingestion format is inferred from the file
//!   extension.
//! - Schema problems (missing CSV column, empty JSON document, unreadable file) fail when the
//!   producer is built; bad values fail the record they belong to.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StreamError, StreamResult};
use crate::producer::Producer;
use crate::stream::Stream;
use crate::types::Schema;

use super::{csv, json};

/// Supported ingestion formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// JSON array-of-objects, single object, or NDJSON.
    Json,
}

impl IngestionFormat {
    /// Parse an ingestion format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" | "jsonl" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Options controlling unified ingestion behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone, Default)]
pub struct IngestionOptions {
    /// If `None`, auto-detect format from file extension.
    pub format: Option<IngestionFormat>,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("format", &self.format.map_or("auto", |format| match format {
                IngestionFormat::Csv => "csv",
                IngestionFormat::Json => "json",
            }))
            .finish()
    }
}

/// Build a lazy producer over the records of a file.
///
/// # Examples
///
/// ```no_run
/// use rust_data_stream::ingestion::{producer_from_path, IngestionOptions};
/// use rust_data_stream::types::{DataType, Field, Schema};
/// use rust_data_stream::Stream;
///
/// # fn main() -> Result<(), rust_data_stream::StreamError> {
/// let schema = Schema::new(vec![
///     Field::new("id", DataType::Int64),
///     Field::new("user.name", DataType::Utf8),
/// ]);
///
/// let producer = producer_from_path("events.ndjson", &schema, &IngestionOptions::default())?;
/// let rows = Stream::new(producer).count()?.get()?;
/// println!("rows={rows}");
/// # Ok(())
/// # }
/// ```
pub fn producer_from_path(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &IngestionOptions,
) -> StreamResult<Producer> {
    let path = path.as_ref();
    let format = match options.format {
        Some(f) => f,
        None => infer_format_from_path(path)?,
    };
    debug!(
        path = %path.display(),
        ?format,
        fields = schema.fields.len(),
        "opening ingestion source"
    );

    match format {
        IngestionFormat::Csv => csv::csv_producer_from_path(path, schema),
        IngestionFormat::Json => json::json_producer_from_path(path, schema),
    }
}

/// [`producer_from_path`] wrapped in a [`Stream`] with default options.
pub fn stream_from_path(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &IngestionOptions,
) -> StreamResult<Stream> {
    producer_from_path(path, schema, options).map(Stream::new)
}

fn infer_format_from_path(path: &Path) -> StreamResult<IngestionFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StreamError::SchemaMismatch {
            message: format!("cannot infer format: path has no extension ({})", path.display()),
        })?;

    IngestionFormat::from_extension(ext).ok_or_else(|| StreamError::SchemaMismatch {
        message: format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ),
    })
}

/// An owned description of an ingestion source.
///
/// Unlike a [`Producer`], a request can be opened any number of times, e.g. once per run of
/// a pipeline that is rebuilt for each pass.
#[derive(Clone)]
pub struct IngestionRequest {
    /// Path to the input file.
    pub path: PathBuf,
    /// Schema to validate/parse values into.
    pub schema: Schema,
    /// Options controlling ingestion.
    pub options: IngestionOptions,
}

impl fmt::Debug for IngestionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionRequest")
            .field("path", &self.path)
            .field("schema_fields", &self.schema.fields.len())
            .field("options", &self.options)
            .finish()
    }
}

impl IngestionRequest {
    /// Open the source by calling [`producer_from_path`].
    pub fn open(&self) -> StreamResult<Producer> {
        producer_from_path(&self.path, &self.schema, &self.options)
    }

    /// Open the source as a fresh [`Stream`].
    pub fn stream(&self) -> StreamResult<Stream> {
        self.open().map(Stream::new)
    }
}
