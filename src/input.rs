//! Input decoding
//!
//! Files are read whole and parsed with SIMD-accelerated JSON when they hold
//! a top-level array, falling back to serde_json for anything else
//! (including newline-delimited JSON).

use crate::error::TranscodeError;
use crate::types::Record;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read and decode every record in `path`
pub fn read_records(path: &Path) -> Result<Vec<Record>, TranscodeError> {
    let content = fs::read(path).map_err(|source| TranscodeError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    let values = decode_values(content).map_err(|source| TranscodeError::DecodeInput {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(to_records(values, path))
}

/// Decode raw bytes into top-level JSON values
///
/// A top-level array yields its elements; a single value or NDJSON stream
/// yields each value in turn.
pub fn decode_values(mut content: Vec<u8>) -> Result<Vec<Value>, serde_json::Error> {
    // simd-json parses in place, so keep the original for the fallback
    let original = content.clone();
    if let Ok(values) = simd_json::serde::from_slice::<Vec<Value>>(&mut content) {
        return Ok(values);
    }

    let mut values = Vec::new();
    for value in serde_json::Deserializer::from_slice(&original).into_iter::<Value>() {
        match value? {
            Value::Array(items) => values.extend(items),
            other => values.push(other),
        }
    }
    Ok(values)
}

fn to_records(values: Vec<Value>, path: &Path) -> Vec<Record> {
    let mut records = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        match Record::from_value(value) {
            Some(record) => records.push(record),
            None => log::warn!("skipping element {idx} of {}: not a JSON object", path.display()),
        }
    }
    records
}
