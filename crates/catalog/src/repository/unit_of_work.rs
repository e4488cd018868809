use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use catalog_core::cache::{Cache, InvalidationQueue, PendingInvalidation};
use catalog_core::catalog::{Entity, EntityId};
use catalog_core::query::Query;
use catalog_core::storage::{
    RepositoryError, Result, StorageEngine, StorageError, StorageTransaction,
};

use super::{from_row, from_rows, to_row};

/// A storage transaction plus the cache mutations it will cause.
///
/// Queued mutations run only after [`commit`](UnitOfWork::commit) succeeds.
/// Rolling back, failing to commit, or dropping the unit of work discards
/// them, so the cache never reflects a write that did not happen.
pub struct UnitOfWork {
    tx: Box<dyn StorageTransaction>,
    pending: InvalidationQueue,
    operation: String,
}

impl UnitOfWork {
    /// Opens a transaction. `operation` names the write in errors and logs.
    pub async fn begin<S>(storage: &S, operation: impl Into<String>) -> Result<Self>
    where
        S: StorageEngine + ?Sized,
    {
        let operation = operation.into();
        let tx = storage
            .begin()
            .await
            .map_err(RepositoryError::failed(operation.clone()))?;
        Ok(Self {
            tx,
            pending: InvalidationQueue::new(),
            operation,
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn failed(&self) -> impl FnOnce(StorageError) -> RepositoryError {
        RepositoryError::failed(self.operation.clone())
    }

    /// Gets an entity by id, including soft-deleted ones.
    pub async fn fetch<E: Entity>(&mut self, id: EntityId) -> Result<Option<E>> {
        let row = self.tx.fetch(E::TABLE, id).await.map_err(self.failed())?;
        row.map(from_row).transpose()
    }

    /// Gets an entity by id, ignoring soft-deleted ones.
    pub async fn fetch_live<E: Entity>(&mut self, id: EntityId) -> Result<Option<E>> {
        Ok(self.fetch::<E>(id).await?.filter(|e| !e.is_trashed()))
    }

    /// Like [`fetch_live`](Self::fetch_live), failing with `NotFound`.
    pub async fn fetch_live_or_fail<E: Entity>(&mut self, id: EntityId) -> Result<E> {
        self.fetch_live(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(E::ENTITY_TYPE, id))
    }

    pub async fn select<E: Entity>(&mut self, query: &Query) -> Result<Vec<E>> {
        let rows = self
            .tx
            .select(E::TABLE, query)
            .await
            .map_err(self.failed())?;
        from_rows(rows)
    }

    pub async fn count(&mut self, table: &str, query: &Query) -> Result<u64> {
        self.tx.count(table, query).await.map_err(self.failed())
    }

    /// Inserts an entity and returns the id storage assigned to it.
    pub async fn insert<E: Entity>(&mut self, entity: &E) -> Result<EntityId> {
        let row = to_row(entity)?;
        self.tx.insert(E::TABLE, row).await.map_err(self.failed())
    }

    /// Writes an entity over its stored row.
    pub async fn update<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let id = entity.id().ok_or_else(|| {
            RepositoryError::Serialization(format!("{} has no id", E::ENTITY_TYPE))
        })?;
        let row: Value = to_row(entity)?;
        let found = self
            .tx
            .update(E::TABLE, id, row)
            .await
            .map_err(self.failed())?;
        self.require::<E>(found, id)
    }

    pub async fn soft_delete<E: Entity>(&mut self, id: EntityId) -> Result<()> {
        let found = self
            .tx
            .soft_delete(E::TABLE, id, Utc::now())
            .await
            .map_err(self.failed())?;
        self.require::<E>(found, id)
    }

    pub async fn restore<E: Entity>(&mut self, id: EntityId) -> Result<()> {
        let found = self
            .tx
            .restore(E::TABLE, id)
            .await
            .map_err(self.failed())?;
        self.require::<E>(found, id)
    }

    pub async fn hard_delete<E: Entity>(&mut self, id: EntityId) -> Result<()> {
        let found = self
            .tx
            .hard_delete(E::TABLE, id)
            .await
            .map_err(self.failed())?;
        self.require::<E>(found, id)
    }

    fn require<E: Entity>(&self, found: bool, id: EntityId) -> Result<()> {
        if found {
            Ok(())
        } else {
            Err(RepositoryError::not_found(E::ENTITY_TYPE, id))
        }
    }

    /// Queues removal of one key after commit.
    pub fn invalidate(&mut self, key: impl Into<String>) {
        self.pending.delete(key);
    }

    /// Queues removal of every key matching `pattern` after commit.
    pub fn invalidate_pattern(&mut self, pattern: impl Into<String>) {
        self.pending.delete_pattern(pattern);
    }

    /// Queues a cache write of a committed value.
    pub fn populate(&mut self, key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) {
        self.pending.populate(key, value, ttl);
    }

    pub fn pending(&self) -> &InvalidationQueue {
        &self.pending
    }

    /// Commits, then runs the queued cache mutations against `cache`.
    pub async fn commit<C: Cache + ?Sized>(self, cache: &C) -> Result<()> {
        let UnitOfWork {
            tx,
            mut pending,
            operation,
        } = self;

        if let Err(err) = tx.commit().await {
            debug!(%operation, error = %err, dropped = pending.len(), "Commit failed; discarding cache invalidations");
            return Err(RepositoryError::failed(operation)(err));
        }

        debug!(%operation, invalidations = pending.len(), "Committed");
        flush(cache, pending.drain()).await;
        Ok(())
    }

    /// Rolls back and discards the queued cache mutations.
    pub async fn rollback(self) -> Result<()> {
        let UnitOfWork {
            tx,
            pending,
            operation,
        } = self;
        debug!(%operation, dropped = pending.len(), "Rolling back");
        tx.rollback().await.map_err(RepositoryError::failed(operation))
    }

    /// Commits on `Ok`, rolls back on `Err`, and returns the outcome.
    ///
    /// A rollback failure is logged; the original error is the one returned.
    pub async fn finish<T, C>(self, cache: &C, result: Result<T>) -> Result<T>
    where
        C: Cache + ?Sized,
    {
        match result {
            Ok(value) => {
                self.commit(cache).await?;
                Ok(value)
            }
            Err(err) => {
                let operation = self.operation.clone();
                if let Err(rollback_err) = self.rollback().await {
                    warn!(%operation, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Runs deferred cache mutations in order. Failures are logged, never raised.
///
/// A failed populate falls back to deleting the key so an older value
/// cannot outlive the commit.
pub(crate) async fn flush<C: Cache + ?Sized>(cache: &C, commands: Vec<PendingInvalidation>) {
    for command in commands {
        let outcome = match &command {
            PendingInvalidation::Delete(key) => cache.delete(key).await,
            PendingInvalidation::DeletePattern(pattern) => cache.delete_pattern(pattern).await,
            PendingInvalidation::Populate { key, value, ttl } => {
                match cache.set(key, value, *ttl).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        warn!(key = %key, error = %err, "Cache populate failed; deleting key");
                        cache.delete(key).await
                    }
                }
            }
        };

        if let Err(err) = outcome {
            warn!(command = ?command, error = %err, "Deferred cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{CacheCall, RecordingCache};
    use crate::storage::InMemoryStorage;
    use catalog_core::cache::entity_key;
    use catalog_core::catalog::Badge;

    #[tokio::test]
    async fn test_commit_flushes_in_order() {
        let storage = InMemoryStorage::new();
        let cache = RecordingCache::new();

        let mut uow = UnitOfWork::begin(&storage, "create Badge").await.unwrap();
        let id = uow.insert(&Badge::new("Deal", "#FF0000")).await.unwrap();
        uow.invalidate(entity_key("badges", id));
        uow.invalidate_pattern("badges:query:*");
        uow.commit(&cache).await.unwrap();

        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::Delete("badges:entity:1".to_string()),
                CacheCall::DeletePattern("badges:query:*".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_queue() {
        let storage = InMemoryStorage::new();
        let cache = RecordingCache::new();

        let mut uow = UnitOfWork::begin(&storage, "create Badge").await.unwrap();
        uow.insert(&Badge::new("Deal", "#FF0000")).await.unwrap();
        uow.invalidate("badges:entity:1");
        uow.invalidate("badges:entity:1");
        uow.invalidate_pattern("badges:query:*");
        assert_eq!(uow.pending().len(), 2);
        uow.rollback().await.unwrap();

        assert!(cache.calls().is_empty());
        assert!(storage.fetch("badges", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_discards_queue() {
        let storage = InMemoryStorage::new();
        let cache = RecordingCache::new();
        storage.fail_next_commit();

        let mut uow = UnitOfWork::begin(&storage, "create Badge").await.unwrap();
        uow.insert(&Badge::new("Deal", "#FF0000")).await.unwrap();
        uow.invalidate("badges:entity:1");
        let result = uow.commit(&cache).await;

        assert!(matches!(
            result,
            Err(RepositoryError::OperationFailed { ref operation, .. }) if operation == "create Badge"
        ));
        assert!(cache.calls().is_empty());
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_error() {
        let storage = InMemoryStorage::new();
        let cache = RecordingCache::new();

        let mut uow = UnitOfWork::begin(&storage, "delete Badge").await.unwrap();
        let result: Result<()> = async {
            uow.insert(&Badge::new("Deal", "#FF0000")).await?;
            uow.invalidate("badges:entity:1");
            uow.soft_delete::<Badge>(99).await
        }
        .await;
        let result = uow.finish(&cache, result).await;

        assert_eq!(result, Err(RepositoryError::not_found("Badge", 99)));
        assert!(cache.calls().is_empty());
        assert!(storage.fetch("badges", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_populate_falls_back_to_delete() {
        let storage = InMemoryStorage::new();
        let cache = RecordingCache::new();
        cache.fail_sets();

        let mut uow = UnitOfWork::begin(&storage, "status").await.unwrap();
        uow.populate("products:entity:5", b"{}".to_vec(), None);
        uow.commit(&cache).await.unwrap();

        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::Set("products:entity:5".to_string()),
                CacheCall::Delete("products:entity:5".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_live_hides_trashed() {
        let storage = InMemoryStorage::new();
        let cache = RecordingCache::new();

        let mut uow = UnitOfWork::begin(&storage, "seed").await.unwrap();
        let id = uow.insert(&Badge::new("Deal", "#FF0000")).await.unwrap();
        uow.soft_delete::<Badge>(id).await.unwrap();

        assert!(uow.fetch::<Badge>(id).await.unwrap().is_some());
        assert!(uow.fetch_live::<Badge>(id).await.unwrap().is_none());
        assert!(uow.fetch_live_or_fail::<Badge>(id).await.unwrap_err().is_not_found());
        uow.commit(&cache).await.unwrap();
    }
}
