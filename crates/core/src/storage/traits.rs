use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::catalog::EntityId;
use crate::query::Query;

use super::StorageResult;

/// A relational store holding one table of JSON rows per entity type.
///
/// Reads outside a transaction see committed data only. Every row returned
/// carries its `id`, and `fetch` returns soft-deleted rows as well.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Opens a write transaction.
    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>>;

    /// Gets a row by id, trashed or not.
    async fn fetch(&self, table: &str, id: EntityId) -> StorageResult<Option<Value>>;

    /// Gets the rows selected by `query`.
    async fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Value>>;

    /// Counts the rows matched by `query`, ignoring its window.
    async fn count(&self, table: &str, query: &Query) -> StorageResult<u64>;
}

/// An open storage transaction.
///
/// Writes are visible to reads through the same transaction and to nobody
/// else until [`commit`](StorageTransaction::commit) returns `Ok`. Dropping a
/// transaction without finishing it rolls it back.
#[async_trait]
pub trait StorageTransaction: Send {
    async fn fetch(&mut self, table: &str, id: EntityId) -> StorageResult<Option<Value>>;

    async fn select(&mut self, table: &str, query: &Query) -> StorageResult<Vec<Value>>;

    async fn count(&mut self, table: &str, query: &Query) -> StorageResult<u64>;

    /// Inserts a row and returns the id assigned to it. Any `id` field in
    /// `row` is ignored.
    async fn insert(&mut self, table: &str, row: Value) -> StorageResult<EntityId>;

    /// Replaces a row. Returns false if no row has this id.
    async fn update(&mut self, table: &str, id: EntityId, row: Value) -> StorageResult<bool>;

    /// Sets `deleted_at` (and `updated_at`) to `at`. Returns false if no row
    /// has this id.
    async fn soft_delete(&mut self, table: &str, id: EntityId, at: DateTime<Utc>)
        -> StorageResult<bool>;

    /// Clears `deleted_at`. Returns false if no row has this id.
    async fn restore(&mut self, table: &str, id: EntityId) -> StorageResult<bool>;

    /// Physically removes a row. Returns false if no row has this id.
    async fn hard_delete(&mut self, table: &str, id: EntityId) -> StorageResult<bool>;

    /// Makes every write of this transaction durable.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards every write of this transaction.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
