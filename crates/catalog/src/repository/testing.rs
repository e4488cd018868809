//! Test doubles shared by the repository tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use catalog_core::cache::{Cache, CacheError, Result as CacheResult};
use catalog_core::catalog::EntityId;
use catalog_core::query::Query;
use catalog_core::storage::{StorageEngine, StorageResult, StorageTransaction};

use crate::cache::MemoryCache;
use crate::storage::InMemoryStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    Get(String),
    Set(String),
    Delete(String),
    DeletePattern(String),
}

/// A memory cache that records every call and can be told to fail.
#[derive(Clone)]
pub struct RecordingCache {
    inner: MemoryCache,
    calls: Arc<Mutex<Vec<CacheCall>>>,
    fail_sets: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCache::new(1_000),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_sets: Arc::new(AtomicBool::new(false)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes `set` fail from now on.
    pub fn fail_sets(&self) {
        self.fail_sets.store(true, Ordering::SeqCst);
    }

    /// Makes every operation fail from now on.
    pub fn go_down(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Every recorded call, reads included.
    pub fn all_calls(&self) -> Vec<CacheCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls that mutate the cache.
    pub fn calls(&self) -> Vec<CacheCall> {
        self.all_calls()
            .into_iter()
            .filter(|c| !matches!(c, CacheCall::Get(_)))
            .collect()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Empties the underlying cache without recording a call.
    pub async fn clear_entries(&self) {
        self.inner.clear().await;
    }

    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).await.unwrap()
    }

    fn record(&self, call: CacheCall) -> CacheResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionFailed("cache is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for RecordingCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.record(CacheCall::Get(key.to_string()))?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.record(CacheCall::Set(key.to_string()))?;
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(CacheError::OperationFailed("set rejected".to_string()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.record(CacheCall::Delete(key.to_string()))?;
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        self.record(CacheCall::DeletePattern(pattern.to_string()))?;
        self.inner.delete_pattern(pattern).await
    }
}

/// Counts engine-level reads made outside transactions.
#[derive(Clone, Default)]
pub struct CountingStorage {
    pub inner: InMemoryStorage,
    reads: Arc<AtomicUsize>,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for CountingStorage {
    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        self.inner.begin().await
    }

    async fn fetch(&self, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(table, id).await
    }

    async fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.select(table, query).await
    }

    async fn count(&self, table: &str, query: &Query) -> StorageResult<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.count(table, query).await
    }
}
