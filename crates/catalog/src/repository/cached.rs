use std::collections::BTreeSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace, warn};

use catalog_core::cache::{
    deserialize_value, entity_key, namespace_pattern, query_key, query_pattern, serialize_value,
    Cache,
};
use catalog_core::catalog::{
    apply_field_updates, Entity, EntityId, FieldUpdates, Timestamps, ValidationError,
};
use catalog_core::query::{
    digest_params, is_valid_field_name, query_digest, Criteria, OrderBy, Page, Query,
};
use catalog_core::storage::{RepositoryError, Result, StorageEngine, StorageError};

use super::{from_row, from_rows, UnitOfWork};

/// Entity-specific checks that run inside a write transaction.
///
/// Hooks see the transaction through the [`UnitOfWork`], so their reads are
/// isolated with the write and anything they queue is flushed with it.
#[async_trait]
pub trait WriteHooks<E: Entity>: Send + Sync {
    /// Runs before `entity` is inserted (`previous` is `None`) or written
    /// over `previous`.
    async fn before_save(
        &self,
        _uow: &mut UnitOfWork,
        _entity: &mut E,
        _previous: Option<&E>,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs before `entity` is soft-deleted, or removed when `force` is set.
    async fn before_delete(&self, _uow: &mut UnitOfWork, _entity: &E, _force: bool) -> Result<()> {
        Ok(())
    }

    /// Runs before a soft-deleted `entity` is brought back.
    async fn before_restore(&self, _uow: &mut UnitOfWork, _entity: &E) -> Result<()> {
        Ok(())
    }
}

/// Hooks that accept every write.
pub struct NoHooks;

impl<E: Entity> WriteHooks<E> for NoHooks {}

/// Cache-aside repository over one entity type.
///
/// Reads try `{table}:entity:{id}` or `{table}:query:{digest}` first and fill
/// the cache on a miss. Writes run in a [`UnitOfWork`]; the keys they affect
/// are dropped only after the transaction commits. Cache failures are logged
/// and never surface to callers.
pub struct CachedRepository<E, S: ?Sized, C: ?Sized> {
    storage: Arc<S>,
    cache: Arc<C>,
    ttl: Duration,
    dependent_patterns: Vec<String>,
    hooks: Arc<dyn WriteHooks<E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S: ?Sized, C: ?Sized> Clone for CachedRepository<E, S, C> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            cache: self.cache.clone(),
            ttl: self.ttl,
            dependent_patterns: self.dependent_patterns.clone(),
            hooks: self.hooks.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E, S, C> CachedRepository<E, S, C>
where
    E: Entity,
    S: StorageEngine + ?Sized,
    C: Cache + ?Sized,
{
    pub fn new(storage: Arc<S>, cache: Arc<C>, ttl: Duration) -> Self {
        Self {
            storage,
            cache,
            ttl,
            dependent_patterns: Vec::new(),
            hooks: Arc::new(NoHooks),
            _entity: PhantomData,
        }
    }

    /// Installs write hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn WriteHooks<E>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Adds a pattern that every write to this entity must also drop, for
    /// cached views derived from it.
    pub fn invalidates(mut self, pattern: impl Into<String>) -> Self {
        self.dependent_patterns.push(pattern.into());
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // --- cache plumbing ---

    pub(crate) async fn read_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match deserialize_value(&bytes) {
                Ok(value) => {
                    trace!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                trace!(key = %key, "Cache miss");
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Cache read failed; using storage");
                None
            }
        }
    }

    pub(crate) async fn write_cache<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serialize_value(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %key, error = %err, "Cannot encode value for cache");
                return;
            }
        };
        if let Err(err) = self.cache.set(key, &bytes, Some(ttl)).await {
            warn!(key = %key, error = %err, "Cache write failed");
        }
    }

    async fn forget(&self, key: &str) {
        if let Err(err) = self.cache.delete(key).await {
            warn!(key = %key, error = %err, "Cache delete failed");
        }
    }

    /// Returns the cached value under `key`, or awaits `load` and caches its
    /// result for `ttl`.
    pub(crate) async fn remember<T, F>(&self, key: String, ttl: Duration, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.read_cache(&key).await {
            return Ok(hit);
        }
        let value = load.await?;
        self.write_cache(&key, &value, ttl).await;
        Ok(value)
    }

    fn failed(&self, verb: &str) -> impl FnOnce(StorageError) -> RepositoryError {
        RepositoryError::failed(format!("{verb} {}", E::ENTITY_TYPE))
    }

    pub(crate) async fn begin(&self, verb: &str) -> Result<UnitOfWork> {
        UnitOfWork::begin(&*self.storage, format!("{verb} {}", E::ENTITY_TYPE)).await
    }

    pub(crate) async fn finish<T>(&self, uow: UnitOfWork, result: Result<T>) -> Result<T> {
        uow.finish(&*self.cache, result).await
    }

    /// Queues removal of every cached query over this entity, plus the
    /// dependent patterns.
    pub(crate) fn invalidate_queries(&self, uow: &mut UnitOfWork) {
        uow.invalidate_pattern(query_pattern(E::TABLE));
        for pattern in &self.dependent_patterns {
            uow.invalidate_pattern(pattern.clone());
        }
    }

    pub(crate) fn invalidate_entity(&self, uow: &mut UnitOfWork, id: EntityId) {
        uow.invalidate(entity_key(E::TABLE, id));
    }

    // --- reads ---

    /// Gets a live entity by id.
    pub async fn find_by_id(&self, id: EntityId) -> Result<Option<E>> {
        Ok(self.find_with_trashed(id).await?.filter(|e| !e.is_trashed()))
    }

    /// Like [`find_by_id`](Self::find_by_id), failing with `NotFound`.
    pub async fn find_or_fail(&self, id: EntityId) -> Result<E> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(E::ENTITY_TYPE, id))
    }

    /// Gets an entity by id, soft-deleted or not.
    ///
    /// Missing ids are not cached.
    pub async fn find_with_trashed(&self, id: EntityId) -> Result<Option<E>> {
        let key = entity_key(E::TABLE, id);
        if let Some(entity) = self.read_cache::<E>(&key).await {
            return Ok(Some(entity));
        }

        let row = self
            .storage
            .fetch(E::TABLE, id)
            .await
            .map_err(self.failed("find"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let entity: E = from_row(row)?;
        self.write_cache(&key, &entity, self.ttl).await;
        Ok(Some(entity))
    }

    pub async fn exists(&self, id: EntityId) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Runs a parametric read, cached under the digest of `query`.
    pub async fn find_all(&self, query: &Query) -> Result<Vec<E>> {
        check_fields(query)?;
        let key = query_key(E::TABLE, &query_digest("find_all", query));
        self.remember(key, self.ttl, async {
            let rows = self
                .storage
                .select(E::TABLE, query)
                .await
                .map_err(self.failed("find_all"))?;
            from_rows(rows)
        })
        .await
    }

    pub async fn find_by(
        &self,
        criteria: Criteria,
        order: Vec<OrderBy>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<E>> {
        let query = Query {
            criteria,
            order,
            limit,
            offset,
            with_trashed: false,
        };
        self.find_all(&query).await
    }

    pub async fn find_one_by(&self, criteria: Criteria) -> Result<Option<E>> {
        let query = Query::filter(criteria).limit(1);
        Ok(self.find_all(&query).await?.into_iter().next())
    }

    /// Counts matching rows, ignoring any limit or offset.
    pub async fn count(&self, query: &Query) -> Result<u64> {
        check_fields(query)?;
        let query = query.unbounded();
        let key = query_key(E::TABLE, &query_digest("count", &query));
        self.remember(key, self.ttl, async {
            self.storage
                .count(E::TABLE, &query)
                .await
                .map_err(self.failed("count"))
        })
        .await
    }

    /// Returns one 1-based page of `query`, cached with its total.
    pub async fn paginate(&self, query: &Query, page: u64, per_page: u64) -> Result<Page<E>> {
        check_fields(query)?;
        let per_page = per_page.max(1);
        let page = page.max(1);
        let window = query
            .clone()
            .limit(per_page as usize)
            .offset(Page::<E>::offset_of(page, per_page) as usize);
        let key = query_key(E::TABLE, &query_digest("paginate", &window));

        self.remember(key, self.ttl, async {
            let rows = self
                .storage
                .select(E::TABLE, &window)
                .await
                .map_err(self.failed("paginate"))?;
            let total = self
                .storage
                .count(E::TABLE, &query.unbounded())
                .await
                .map_err(self.failed("paginate"))?;
            Ok(Page::new(from_rows(rows)?, total, page, per_page))
        })
        .await
    }

    // --- writes ---

    /// Inserts an entity without an id, or writes over the stored one.
    pub async fn save(&self, entity: E) -> Result<E> {
        match entity.id() {
            None => self.create(entity).await,
            Some(id) => self.replace(id, entity).await,
        }
    }

    /// Inserts a new entity and publishes it to the cache after commit.
    pub async fn create(&self, mut entity: E) -> Result<E> {
        entity.validate()?;

        let mut uow = self.begin("create").await?;
        let result: Result<E> = async {
            self.hooks.before_save(&mut uow, &mut entity, None).await?;
            *entity.timestamps_mut() = Timestamps::now();
            let id = uow.insert(&entity).await?;
            entity.set_id(id);

            let key = entity_key(E::TABLE, id);
            match serialize_value(&entity) {
                Ok(bytes) => uow.populate(key, bytes, Some(self.ttl)),
                Err(err) => {
                    warn!(key = %key, error = %err, "Cannot encode new entity for cache");
                    uow.invalidate(key);
                }
            }
            self.invalidate_queries(&mut uow);
            Ok(entity)
        }
        .await;

        let entity = self.finish(uow, result).await?;
        debug!(entity = E::TABLE, id = ?entity.id(), "Created");
        Ok(entity)
    }

    async fn replace(&self, id: EntityId, mut entity: E) -> Result<E> {
        entity.validate()?;

        let mut uow = self.begin("save").await?;
        let result: Result<E> = async {
            let previous: E = uow.fetch_live_or_fail(id).await?;
            let timestamps = entity.timestamps_mut();
            timestamps.created_at = previous.timestamps().created_at;
            timestamps.deleted_at = None;
            timestamps.touch();

            self.hooks
                .before_save(&mut uow, &mut entity, Some(&previous))
                .await?;
            uow.update(&entity).await?;
            self.invalidate_entity(&mut uow, id);
            self.invalidate_queries(&mut uow);
            Ok(entity)
        }
        .await;

        let entity = self.finish(uow, result).await?;
        debug!(entity = E::TABLE, id, "Saved");
        Ok(entity)
    }

    /// Applies field updates to a live entity.
    ///
    /// Unknown fields and values that break the entity's rules are rejected
    /// before a transaction is opened.
    pub async fn update(&self, id: EntityId, updates: FieldUpdates) -> Result<E> {
        check_updatable::<E>(&updates)?;
        let current = self.find_or_fail(id).await?;
        apply_field_updates(&current, &updates)?;

        let mut uow = self.begin("update").await?;
        let result: Result<E> = async {
            let previous: E = uow.fetch_live_or_fail(id).await?;
            let mut entity = apply_field_updates(&previous, &updates)?;
            entity.timestamps_mut().touch();

            self.hooks
                .before_save(&mut uow, &mut entity, Some(&previous))
                .await?;
            uow.update(&entity).await?;
            self.invalidate_entity(&mut uow, id);
            self.invalidate_queries(&mut uow);
            Ok(entity)
        }
        .await;

        let entity = self.finish(uow, result).await?;
        debug!(entity = E::TABLE, id, fields = updates.len(), "Updated");
        Ok(entity)
    }

    /// Soft-deletes a live entity.
    pub async fn delete(&self, id: EntityId) -> Result<()> {
        let mut uow = self.begin("delete").await?;
        let result: Result<()> = async {
            let entity: E = uow.fetch_live_or_fail(id).await?;
            self.hooks.before_delete(&mut uow, &entity, false).await?;
            uow.soft_delete::<E>(id).await?;
            self.invalidate_entity(&mut uow, id);
            self.invalidate_queries(&mut uow);
            Ok(())
        }
        .await;

        self.finish(uow, result).await?;
        debug!(entity = E::TABLE, id, "Deleted");
        Ok(())
    }

    /// Removes an entity, soft-deleted or not.
    pub async fn force_delete(&self, id: EntityId) -> Result<()> {
        let mut uow = self.begin("force_delete").await?;
        let result: Result<()> = async {
            let entity: E = uow
                .fetch(id)
                .await?
                .ok_or_else(|| RepositoryError::not_found(E::ENTITY_TYPE, id))?;
            self.hooks.before_delete(&mut uow, &entity, true).await?;
            uow.hard_delete::<E>(id).await?;
            self.invalidate_entity(&mut uow, id);
            self.invalidate_queries(&mut uow);
            Ok(())
        }
        .await;

        self.finish(uow, result).await?;
        debug!(entity = E::TABLE, id, "Force deleted");
        Ok(())
    }

    /// Clears the soft-delete marker. Restoring a live entity is a no-op.
    pub async fn restore(&self, id: EntityId) -> Result<E> {
        let mut uow = self.begin("restore").await?;
        let result: Result<E> = async {
            let mut entity: E = uow
                .fetch(id)
                .await?
                .ok_or_else(|| RepositoryError::not_found(E::ENTITY_TYPE, id))?;
            if entity.is_trashed() {
                self.hooks.before_restore(&mut uow, &entity).await?;
                uow.restore::<E>(id).await?;
                entity.timestamps_mut().deleted_at = None;
                self.invalidate_entity(&mut uow, id);
                self.invalidate_queries(&mut uow);
            }
            Ok(entity)
        }
        .await;

        let entity = self.finish(uow, result).await?;
        debug!(entity = E::TABLE, id, "Restored");
        Ok(entity)
    }

    /// Applies the same field updates to every id in one transaction.
    ///
    /// A missing or soft-deleted id aborts the whole batch.
    pub async fn bulk_update(&self, ids: &[EntityId], updates: FieldUpdates) -> Result<u64> {
        check_updatable::<E>(&updates)?;
        let ids: BTreeSet<EntityId> = ids.iter().copied().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut uow = self.begin("bulk_update").await?;
        let result: Result<u64> = async {
            for &id in &ids {
                let previous: E = uow.fetch_live_or_fail(id).await?;
                let mut entity = apply_field_updates(&previous, &updates)?;
                entity.timestamps_mut().touch();
                self.hooks
                    .before_save(&mut uow, &mut entity, Some(&previous))
                    .await?;
                uow.update(&entity).await?;
                self.invalidate_entity(&mut uow, id);
            }
            self.invalidate_queries(&mut uow);
            Ok(ids.len() as u64)
        }
        .await;

        let updated = self.finish(uow, result).await?;
        debug!(entity = E::TABLE, updated, "Bulk updated");
        Ok(updated)
    }

    /// Soft-deletes every id in one transaction.
    ///
    /// A missing or already deleted id aborts the whole batch.
    pub async fn bulk_delete(&self, ids: &[EntityId]) -> Result<u64> {
        let ids: BTreeSet<EntityId> = ids.iter().copied().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut uow = self.begin("bulk_delete").await?;
        let result: Result<u64> = async {
            for &id in &ids {
                let entity: E = uow.fetch_live_or_fail(id).await?;
                self.hooks.before_delete(&mut uow, &entity, false).await?;
                uow.soft_delete::<E>(id).await?;
                self.invalidate_entity(&mut uow, id);
            }
            self.invalidate_queries(&mut uow);
            Ok(ids.len() as u64)
        }
        .await;

        let deleted = self.finish(uow, result).await?;
        debug!(entity = E::TABLE, deleted, "Bulk deleted");
        Ok(deleted)
    }

    /// Runs `body` in a transaction and caches its result under `key`.
    ///
    /// The value is written to the cache only after the commit succeeds. If
    /// the body, the commit or anything before it fails, `key` is deleted so
    /// the next read goes to storage.
    pub async fn atomic_cache_operation<T, F>(&self, key: String, body: F) -> Result<T>
    where
        T: Serialize + Send,
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, Result<T>> + Send,
    {
        let mut uow = match self.begin("atomic_cache_operation").await {
            Ok(uow) => uow,
            Err(err) => {
                self.forget(&key).await;
                return Err(err);
            }
        };

        let outcome = body(&mut uow).await;
        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                let operation = uow.operation().to_string();
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(%operation, error = %rollback_err, "Rollback failed");
                }
                self.forget(&key).await;
                return Err(err);
            }
        };

        match serialize_value(&value) {
            Ok(bytes) => uow.populate(key.clone(), bytes, Some(self.ttl)),
            Err(err) => {
                warn!(key = %key, error = %err, "Cannot encode result for cache");
                uow.invalidate(key.clone());
            }
        }

        if let Err(err) = uow.commit(&*self.cache).await {
            self.forget(&key).await;
            return Err(err);
        }
        Ok(value)
    }

    /// Drops every cached value of this entity type and its dependents.
    pub async fn clear_cache(&self) {
        let patterns =
            std::iter::once(namespace_pattern(E::TABLE)).chain(self.dependent_patterns.iter().cloned());
        for pattern in patterns {
            if let Err(err) = self.cache.delete_pattern(&pattern).await {
                warn!(pattern = %pattern, error = %err, "Cache clear failed");
            }
        }
        debug!(entity = E::TABLE, "Cache cleared");
    }

    /// Caches a derived scalar or view under this entity's query namespace.
    pub(crate) fn derived_key(&self, operation: &str, params: &impl Serialize) -> String {
        query_key(E::TABLE, &digest_params(operation, params))
    }
}

/// Rejects field names that cannot be embedded in a storage query.
fn check_fields(query: &Query) -> Result<()> {
    match query.fields().find(|field| !is_valid_field_name(field)) {
        Some(field) => Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: "not a valid field name".to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

fn check_updatable<E: Entity>(updates: &FieldUpdates) -> Result<()> {
    match updates
        .fields()
        .find(|field| !E::UPDATABLE_FIELDS.contains(field))
    {
        Some(field) => Err(ValidationError::UnknownField {
            entity_type: E::ENTITY_TYPE,
            field: field.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{CacheCall, CountingStorage, RecordingCache};
    use catalog_core::catalog::{Badge, Category};

    type Repo<E> = CachedRepository<E, CountingStorage, RecordingCache>;

    fn setup<E: Entity>() -> (Repo<E>, CountingStorage, RecordingCache) {
        let storage = CountingStorage::new();
        let cache = RecordingCache::new();
        let repo = CachedRepository::new(
            Arc::new(storage.clone()),
            Arc::new(cache.clone()),
            Duration::from_secs(60),
        );
        (repo, storage, cache)
    }

    async fn seed_badges(repo: &Repo<Badge>, names: &[&str]) -> Vec<EntityId> {
        let mut ids = Vec::new();
        for name in names {
            let badge = repo.create(Badge::new(*name, "#FF0000")).await.unwrap();
            ids.push(badge.id.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_create_populates_after_commit() {
        let (repo, storage, cache) = setup::<Badge>();

        let badge = repo.create(Badge::new("Deal", "#FF0000")).await.unwrap();
        assert_eq!(badge.id, Some(1));
        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::Set("badges:entity:1".to_string()),
                CacheCall::DeletePattern("badges:query:*".to_string()),
            ]
        );

        // Served from the populated entry.
        let found = repo.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(found.name, "Deal");
        assert_eq!(storage.reads(), 0);
    }

    #[tokio::test]
    async fn test_invalid_entity_never_opens_transaction() {
        let (repo, storage, cache) = setup::<Badge>();

        let result = repo.create(Badge::new("Deal", "red")).await;
        assert!(matches!(result, Err(RepositoryError::Validation(_))));
        assert!(cache.all_calls().is_empty());
        assert!(storage.inner.fetch("badges", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_through_caches_hits_only() {
        let (repo, storage, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        cache.clear_entries().await;

        assert!(repo.find_by_id(1).await.unwrap().is_some());
        assert_eq!(storage.reads(), 1);
        assert!(repo.find_by_id(1).await.unwrap().is_some());
        assert_eq!(storage.reads(), 1);

        // Misses go to storage every time.
        assert!(repo.find_by_id(42).await.unwrap().is_none());
        assert!(repo.find_by_id(42).await.unwrap().is_none());
        assert_eq!(storage.reads(), 3);
        assert!(cache.raw("badges:entity:42").await.is_none());
    }

    #[tokio::test]
    async fn test_find_or_fail() {
        let (repo, _, _) = setup::<Badge>();
        let err = repo.find_or_fail(7).await.unwrap_err();
        assert_eq!(err, RepositoryError::not_found("Badge", 7));
    }

    #[tokio::test]
    async fn test_update_invalidates_after_commit() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        repo.find_all(&Query::new()).await.unwrap();
        cache.reset();

        let updated = repo
            .update(1, FieldUpdates::new().set("name", "Hot Deal"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Hot Deal");
        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::Delete("badges:entity:1".to_string()),
                CacheCall::DeletePattern("badges:query:*".to_string()),
            ]
        );
        assert_eq!(repo.find_or_fail(1).await.unwrap().name, "Hot Deal");
        assert_eq!(repo.find_all(&Query::new()).await.unwrap()[0].name, "Hot Deal");
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_field() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        cache.reset();

        let err = repo
            .update(1, FieldUpdates::new().set("created_at", "2020-01-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Validation(ValidationError::UnknownField {
                entity_type: "Badge",
                field: "created_at".to_string(),
            })
        );
        assert!(cache.all_calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_value_before_writing() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        cache.reset();

        let result = repo.update(1, FieldUpdates::new().set("color", "blue")).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Validation(ValidationError::InvalidColor(_)))
        ));
        assert!(cache.calls().is_empty());
        assert_eq!(repo.find_or_fail(1).await.unwrap().color, "#FF0000");
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let (repo, _, _) = setup::<Badge>();
        seed_badges(&repo, &["Deal", "New"]).await;
        assert_eq!(repo.count(&Query::new()).await.unwrap(), 2);

        repo.delete(1).await.unwrap();
        assert!(repo.find_by_id(1).await.unwrap().is_none());
        assert!(repo.find_with_trashed(1).await.unwrap().unwrap().is_trashed());
        assert!(!repo.exists(1).await.unwrap());
        assert_eq!(repo.count(&Query::new()).await.unwrap(), 1);
        assert_eq!(repo.count(&Query::new().with_trashed()).await.unwrap(), 2);

        // Deleting twice is a miss.
        assert!(repo.delete(1).await.unwrap_err().is_not_found());

        let restored = repo.restore(1).await.unwrap();
        assert!(!restored.is_trashed());
        assert!(repo.exists(1).await.unwrap());
        assert_eq!(repo.count(&Query::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_force_delete_removes_trashed_rows() {
        let (repo, _, _) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;

        repo.delete(1).await.unwrap();
        repo.force_delete(1).await.unwrap();
        assert!(repo.find_with_trashed(1).await.unwrap().is_none());
        assert!(repo.force_delete(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let (repo, _, _) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;

        let mut badge = repo.find_or_fail(1).await.unwrap();
        let created_at = badge.timestamps.created_at;
        badge.name = "Top Pick".to_string();
        let saved = repo.save(badge).await.unwrap();
        assert_eq!(saved.timestamps.created_at, created_at);
        assert_eq!(repo.find_or_fail(1).await.unwrap().name, "Top Pick");

        let mut ghost = Badge::new("Ghost", "#000000");
        ghost.id = Some(99);
        assert!(repo.save(ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_bulk_update_is_all_or_nothing() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["A", "B"]).await;
        cache.reset();

        let result = repo
            .bulk_update(&[1, 2, 3], FieldUpdates::new().set("active", false))
            .await;
        assert_eq!(result, Err(RepositoryError::not_found("Badge", 3)));
        assert!(cache.calls().is_empty());
        assert!(repo.find_or_fail(1).await.unwrap().active);

        let updated = repo
            .bulk_update(&[2, 1, 2], FieldUpdates::new().set("active", false))
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert!(!repo.find_or_fail(1).await.unwrap().active);
        assert!(!repo.find_or_fail(2).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_bulk_delete() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["A", "B", "C"]).await;
        cache.reset();

        assert_eq!(repo.bulk_delete(&[]).await.unwrap(), 0);
        assert!(cache.all_calls().is_empty());

        assert_eq!(repo.bulk_delete(&[1, 3]).await.unwrap(), 2);
        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::Delete("badges:entity:1".to_string()),
                CacheCall::Delete("badges:entity:3".to_string()),
                CacheCall::DeletePattern("badges:query:*".to_string()),
            ]
        );
        let names: Vec<_> = repo
            .find_all(&Query::new())
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["B"]);
    }

    #[tokio::test]
    async fn test_equivalent_queries_share_cache_entry() {
        let (repo, storage, _) = setup::<Badge>();
        seed_badges(&repo, &["A", "B"]).await;

        let first = Query::filter(Criteria::new().is_in("id", [1, 2]).eq("active", true));
        let second = Query::filter(Criteria::new().eq("active", true).is_in("id", [2, 1, 2]));

        assert_eq!(repo.find_all(&first).await.unwrap().len(), 2);
        assert_eq!(repo.find_all(&second).await.unwrap().len(), 2);
        assert_eq!(storage.reads(), 1);
    }

    #[tokio::test]
    async fn test_find_by_and_find_one_by() {
        let (repo, _, _) = setup::<Badge>();
        seed_badges(&repo, &["B", "A", "C"]).await;

        let names: Vec<_> = repo
            .find_by(Criteria::new(), vec![OrderBy::asc("name")], Some(2), Some(1))
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["B", "C"]);

        let found = repo.find_one_by(Criteria::new().eq("name", "C")).await.unwrap();
        assert_eq!(found.and_then(|b| b.id), Some(3));
        assert!(repo
            .find_one_by(Criteria::new().eq("name", "Z"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_field_names() {
        let (repo, _, _) = setup::<Badge>();
        let query = Query::filter(Criteria::new().eq("name') OR 1=1 --", 1));
        assert!(matches!(
            repo.find_all(&query).await,
            Err(RepositoryError::Validation(ValidationError::InvalidValue { .. }))
        ));
    }

    #[tokio::test]
    async fn test_paginate() {
        let (repo, storage, _) = setup::<Badge>();
        seed_badges(&repo, &["A", "B", "C", "D", "E"]).await;

        let query = Query::new().order_by(OrderBy::asc("name"));
        let page = repo.paginate(&query, 2, 2).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["C", "D"]);
        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
        assert!(page.has_more());

        let reads = storage.reads();
        repo.paginate(&query, 2, 2).await.unwrap();
        assert_eq!(storage.reads(), reads);
    }

    #[tokio::test]
    async fn test_cache_outage_degrades_to_storage() {
        let (repo, storage, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        cache.go_down();

        assert_eq!(repo.find_or_fail(1).await.unwrap().name, "Deal");
        assert_eq!(storage.reads(), 1);

        // Writes still commit; failed invalidations are only logged.
        repo.update(1, FieldUpdates::new().set("name", "Deal 2"))
            .await
            .unwrap();
        assert_eq!(
            storage.inner.fetch("badges", 1).await.unwrap().unwrap()["name"],
            "Deal 2"
        );
    }

    #[tokio::test]
    async fn test_atomic_cache_operation_publishes_after_commit() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        cache.reset();

        let key = entity_key("badges", 1);
        let badge = repo
            .atomic_cache_operation(key.clone(), |uow| {
                Box::pin(async move {
                    let mut badge: Badge = uow.fetch_live_or_fail(1).await?;
                    badge.active = false;
                    uow.update(&badge).await?;
                    Ok(badge)
                })
            })
            .await
            .unwrap();

        assert!(!badge.active);
        assert_eq!(cache.calls(), vec![CacheCall::Set(key.clone())]);
        let cached: Badge = deserialize_value(&cache.raw(&key).await.unwrap()).unwrap();
        assert!(!cached.active);
    }

    #[tokio::test]
    async fn test_atomic_cache_operation_deletes_key_on_failure() {
        let (repo, _, cache) = setup::<Badge>();
        seed_badges(&repo, &["Deal"]).await;
        repo.find_by_id(1).await.unwrap();
        cache.reset();

        let key = entity_key("badges", 1);
        let result: Result<Badge> = repo
            .atomic_cache_operation(key.clone(), |uow| {
                Box::pin(async move {
                    let mut badge: Badge = uow.fetch_live_or_fail(1).await?;
                    badge.active = false;
                    uow.update(&badge).await?;
                    Err(RepositoryError::not_found("Badge", 2))
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.calls(), vec![CacheCall::Delete(key.clone())]);
        assert!(cache.raw(&key).await.is_none());
        assert!(repo.find_or_fail(1).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_dependent_patterns_and_clear_cache() {
        let (repo, _, cache) = setup::<Category>();
        let repo = repo.invalidates("categories:tree:*");

        repo.create(Category::new("Shoes", "shoes")).await.unwrap();
        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::Set("categories:entity:1".to_string()),
                CacheCall::DeletePattern("categories:query:*".to_string()),
                CacheCall::DeletePattern("categories:tree:*".to_string()),
            ]
        );

        cache.reset();
        repo.clear_cache().await;
        assert_eq!(
            cache.calls(),
            vec![
                CacheCall::DeletePattern("categories:*".to_string()),
                CacheCall::DeletePattern("categories:tree:*".to_string()),
            ]
        );
        assert!(cache.raw("categories:entity:1").await.is_none());
    }
}
