//! Storage engine implementations.
//!
//! Concrete implementations of `catalog_core::storage::StorageEngine`. The
//! in-memory engine is always compiled; SQLite sits behind the `sqlite`
//! feature.
//!
//! Both engines store one JSON document per row and agree on the helpers
//! below for table checks and soft-delete markers.

use chrono::{DateTime, Utc};
use serde_json::Value;

use catalog_core::catalog::{DELETED_AT_FIELD, ID_FIELD, TABLES};
use catalog_core::storage::{StorageError, StorageResult};

pub mod inmemory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use inmemory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

const UPDATED_AT_FIELD: &str = "updated_at";

/// Rejects tables no entity maps to.
pub(crate) fn check_table(table: &str) -> StorageResult<()> {
    if TABLES.contains(&table) {
        Ok(())
    } else {
        Err(StorageError::InvalidData(format!("unknown table '{table}'")))
    }
}

/// Returns `row` as a JSON object with its `id` set.
pub(crate) fn with_id(row: Value, id: i64) -> StorageResult<Value> {
    let Value::Object(mut map) = row else {
        return Err(StorageError::InvalidData(
            "row must be a JSON object".to_string(),
        ));
    };
    map.insert(ID_FIELD.to_string(), Value::from(id));
    Ok(Value::Object(map))
}

/// Sets or clears the soft-delete marker of a row.
pub(crate) fn mark_deleted(row: &mut Value, at: Option<DateTime<Utc>>) -> StorageResult<()> {
    let Some(map) = row.as_object_mut() else {
        return Err(StorageError::InvalidData(
            "row must be a JSON object".to_string(),
        ));
    };
    let marker = serde_json::to_value(at).map_err(|e| StorageError::Serialization(e.to_string()))?;
    map.insert(DELETED_AT_FIELD.to_string(), marker);
    if let Some(at) = at {
        let stamp =
            serde_json::to_value(at).map_err(|e| StorageError::Serialization(e.to_string()))?;
        map.insert(UPDATED_AT_FIELD.to_string(), stamp);
    }
    Ok(())
}
