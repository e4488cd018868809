//! Conversions between JSON documents and SQLite values.

use catalog_core::storage::{StorageError, StorageResult};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Converts a JSON filter value to the value `json_extract` yields for it.
///
/// Booleans come back from `json_extract` as integers.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Parses a stored document.
pub fn parse_document(data: &str) -> StorageResult<Value> {
    serde_json::from_str(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encodes a document for storage.
pub fn encode_document(row: &Value) -> StorageResult<String> {
    serde_json::to_string(row).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Formats a timestamp exactly as serde writes it into documents.
pub fn format_timestamp(at: &chrono::DateTime<chrono::Utc>) -> StorageResult<String> {
    match serde_json::to_value(at) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Err(StorageError::Serialization(format!(
            "timestamp encoded as {other}"
        ))),
        Err(e) => Err(StorageError::Serialization(e.to_string())),
    }
}
