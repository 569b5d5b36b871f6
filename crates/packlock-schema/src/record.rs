//! Loading untyped records (manifests, candidate lists, policies) from disk.
//!
//! Files ending in `.toml` are parsed as TOML, everything else as JSON. Both
//! end up as the same `serde_json` record shape.

use crate::types::Record;
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse JSON in '{path}': {source}")]
    ParseJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to parse TOML in '{path}': {source}")]
    ParseToml {
        path: String,
        source: toml::de::Error,
    },
    #[error("'{path}': {reason}")]
    Shape { path: String, reason: String },
}

/// Read a single record (a JSON object or a TOML document).
pub fn read_record_file(path: impl AsRef<Path>) -> Result<Record, RecordError> {
    let path = path.as_ref();
    match read_value(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(shape(path, "expected an object at the top level")),
    }
}

/// Read a list of records: a JSON array of objects, or a TOML document with
/// a `[[packs]]` array of tables. A JSON object with a `packs` array is
/// accepted too.
pub fn read_record_list_file(path: impl AsRef<Path>) -> Result<Vec<Value>, RecordError> {
    let path = path.as_ref();
    match read_value(path)? {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("packs") {
            Some(Value::Array(items)) => Ok(items),
            None => Ok(Vec::new()),
            Some(_) => Err(shape(path, "'packs' must be an array")),
        },
        _ => Err(shape(path, "expected an array of records or a 'packs' table")),
    }
}

fn read_value(path: &Path) -> Result<Value, RecordError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: display.clone(),
        source,
    })?;
    if is_toml(path) {
        let doc: toml::Value =
            toml::from_str(&content).map_err(|source| RecordError::ParseToml {
                path: display.clone(),
                source,
            })?;
        serde_json::to_value(doc).map_err(|e| RecordError::Shape {
            path: display,
            reason: e.to_string(),
        })
    } else {
        serde_json::from_str(&content).map_err(|source| RecordError::ParseJson {
            path: display,
            source,
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn shape(path: &Path, reason: &str) -> RecordError {
    RecordError::Shape {
        path: path.display().to_string(),
        reason: reason.to_owned(),
    }
}
