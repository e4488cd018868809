use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use catalog_core::catalog::EntityId;
use catalog_core::query::{apply_query, Query};
use catalog_core::storage::{StorageEngine, StorageError, StorageResult, StorageTransaction};

use crate::storage::{check_table, mark_deleted, with_id};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<EntityId, Value>,
    last_id: EntityId,
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: HashMap<String, Table>,
}

impl State {
    fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables.entry(name.to_string()).or_default()
    }

    fn fetch(&self, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
        check_table(table)?;
        Ok(self.table(table).and_then(|t| t.rows.get(&id)).cloned())
    }

    fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
        check_table(table)?;
        Ok(match self.table(table) {
            Some(t) => apply_query(t.rows.values(), query),
            None => Vec::new(),
        })
    }

    fn count(&self, table: &str, query: &Query) -> StorageResult<u64> {
        let rows = self.select(table, &query.unbounded())?;
        Ok(rows.len() as u64)
    }
}

/// In-memory storage engine for tests and single-process demos.
///
/// Data is not persisted and is lost when the last clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    committed: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStorage {
    /// Creates a new empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction to commit fail with a conflict, as a
    /// database would on a serialization failure.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        let guard = self.writer.clone().lock_owned().await;
        let staged = self.committed.read().await.clone();
        Ok(Box::new(InMemoryTransaction {
            _guard: guard,
            committed: self.committed.clone(),
            fail_commit: self.fail_next_commit.clone(),
            staged,
        }))
    }

    async fn fetch(&self, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
        self.committed.read().await.fetch(table, id)
    }

    async fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
        self.committed.read().await.select(table, query)
    }

    async fn count(&self, table: &str, query: &Query) -> StorageResult<u64> {
        self.committed.read().await.count(table, query)
    }
}

/// A transaction over a private copy of the committed state.
///
/// Holding the writer guard keeps other transactions out until this one is
/// committed, rolled back or dropped.
struct InMemoryTransaction {
    _guard: OwnedMutexGuard<()>,
    committed: Arc<RwLock<State>>,
    fail_commit: Arc<AtomicBool>,
    staged: State,
}

impl InMemoryTransaction {
    fn row_mut(&mut self, table: &str, id: EntityId) -> StorageResult<Option<&mut Value>> {
        check_table(table)?;
        Ok(self.staged.table_mut(table).rows.get_mut(&id))
    }
}

#[async_trait]
impl StorageTransaction for InMemoryTransaction {
    async fn fetch(&mut self, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
        self.staged.fetch(table, id)
    }

    async fn select(&mut self, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
        self.staged.select(table, query)
    }

    async fn count(&mut self, table: &str, query: &Query) -> StorageResult<u64> {
        self.staged.count(table, query)
    }

    async fn insert(&mut self, table: &str, row: Value) -> StorageResult<EntityId> {
        check_table(table)?;
        let table = self.staged.table_mut(table);
        let id = table.last_id + 1;
        let row = with_id(row, id)?;
        table.last_id = id;
        table.rows.insert(id, row);
        Ok(id)
    }

    async fn update(&mut self, table: &str, id: EntityId, row: Value) -> StorageResult<bool> {
        let row = with_id(row, id)?;
        match self.row_mut(table, id)? {
            Some(existing) => {
                *existing = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete(
        &mut self,
        table: &str,
        id: EntityId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        match self.row_mut(table, id)? {
            Some(row) => {
                mark_deleted(row, Some(at))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restore(&mut self, table: &str, id: EntityId) -> StorageResult<bool> {
        match self.row_mut(table, id)? {
            Some(row) => {
                mark_deleted(row, None)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hard_delete(&mut self, table: &str, id: EntityId) -> StorageResult<bool> {
        check_table(table)?;
        Ok(self.staged.table_mut(table).rows.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        let this = *self;
        *this.committed.write().await = this.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
