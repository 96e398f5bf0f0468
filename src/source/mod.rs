//! Record sources.
//!
//! A source produces one batch of [`RawRecord`]s per run. Records are opaque
//! JSON objects upstream; only the identifier and text fields are lifted out.
//! Any failure here is fatal to the run: no partial batch is processed.

pub mod http;

pub use http::HttpSource;

use crate::core::error::{ProbeError, ProbeResult};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Boxed future returned by [`SourceFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = ProbeResult<Vec<RawRecord>>> + Send + 'a>>;

/// One upstream record, reduced to the two fields the probe uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Stable record identifier.
    pub identifier: Option<String>,
    /// Payload written as the entry value.
    pub text: Option<String>,
}

impl RawRecord {
    /// A well-formed record.
    pub fn new(identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            text: Some(text.into()),
        }
    }

    /// Lift identifier and text out of a JSON object.
    ///
    /// Strings are taken verbatim; numbers and booleans are rendered. Missing,
    /// null or structured fields leave the corresponding side empty.
    pub fn from_json(value: &Value, fields: &RecordFields) -> Self {
        Self {
            identifier: value.get(&fields.id_field).and_then(scalar_to_string),
            text: value.get(&fields.text_field).and_then(scalar_to_string),
        }
    }

    /// Both fields present and non-empty.
    ///
    /// Empty text is rejected because an empty value reads back
    /// indistinguishably from a missing key on some clients.
    pub fn is_well_formed(&self) -> bool {
        matches!(
            (&self.identifier, &self.text),
            (Some(id), Some(text)) if !id.is_empty() && !text.is_empty()
        )
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// JSON field names holding the identifier and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    /// Identifier field.
    pub id_field: String,
    /// Text field.
    pub text_field: String,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self {
            id_field: "_id".to_string(),
            text_field: "text".to_string(),
        }
    }
}

impl RecordFields {
    /// Field names from explicit values.
    pub fn new(id_field: impl Into<String>, text_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            text_field: text_field.into(),
        }
    }
}

/// Decode a response body into records.
///
/// An array yields one record per element; a lone object is a batch of one.
pub fn decode_batch(body: Value, fields: &RecordFields) -> ProbeResult<Vec<RawRecord>> {
    match body {
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| RawRecord::from_json(item, fields))
            .collect()),
        object @ Value::Object(_) => Ok(vec![RawRecord::from_json(&object, fields)]),
        other => Err(ProbeError::SourceDecode {
            message: format!("expected a JSON array or object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Producer of record batches.
pub trait SourceFetcher: Send + Sync {
    /// Name used in reports.
    fn name(&self) -> &str;

    /// Fetch up to `count` records.
    fn fetch(&self, count: usize) -> FetchFuture<'_>;
}

impl<T: SourceFetcher + ?Sized> SourceFetcher for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, count: usize) -> FetchFuture<'_> {
        (**self).fetch(count)
    }
}

/// Source serving a fixed list of records.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    records: Vec<RawRecord>,
}

impl StaticSource {
    /// Serve `records` under `name`.
    pub fn new(name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// Decode records from a JSON document.
    pub fn from_json_str(
        name: impl Into<String>,
        content: &str,
        fields: &RecordFields,
    ) -> ProbeResult<Self> {
        let body: Value = serde_json::from_str(content).map_err(|e| ProbeError::SourceDecode {
            message: e.to_string(),
        })?;
        Ok(Self::new(name, decode_batch(body, fields)?))
    }

    /// Decode records from a JSON file.
    pub fn from_file(path: &Path, fields: &RecordFields) -> ProbeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProbeError::SourceFetch {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(path.display().to_string(), &content, fields)
    }
}

impl SourceFetcher for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, count: usize) -> FetchFuture<'_> {
        let batch: Vec<RawRecord> = self.records.iter().take(count).cloned().collect();
        Box::pin(async move { Ok(batch) })
    }
}
