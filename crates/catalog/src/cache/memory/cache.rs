//! In-memory cache implementation with LRU eviction.
//!
//! Keys are tracked per namespace (the segment before the first `:`) so
//! pattern deletes such as `products:query:*` only inspect the keys of one
//! table. Patterns whose namespace is itself a wildcard fall back to a scan.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;

use catalog_core::cache::{key_namespace, pattern_matches, pattern_namespace, Cache, Result};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-memory cache with TTL and LRU eviction.
///
/// Expired entries are dropped lazily, on the next read of their key.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    store: Arc<RwLock<LruCache<String, CacheEntry>>>,
    /// namespace -> keys currently stored under it
    tracking: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl MemoryCache {
    /// Creates a cache holding at most `max_entries` values (at least one).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
            tracking: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored values, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Removes every value.
    pub async fn clear(&self) {
        self.store.write().await.clear();
        self.tracking.write().await.clear();
    }

    async fn untrack(&self, keys: &[String]) {
        let mut tracking = self.tracking.write().await;
        for key in keys {
            let namespace = key_namespace(key);
            if let Some(tracked) = tracking.get_mut(namespace) {
                tracked.remove(key);
                if tracked.is_empty() {
                    tracking.remove(namespace);
                }
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.store.write().await;
        let expired = match store.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            store.pop(key);
            drop(store);
            self.untrack(&[key.to_string()]).await;
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let evicted = {
            let mut store = self.store.write().await;
            store.push(key.to_string(), CacheEntry::new(value.to_vec(), ttl))
        };

        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.untrack(&[evicted_key]).await;
            }
        }

        let mut tracking = self.tracking.write().await;
        tracking
            .entry(key_namespace(key).to_string())
            .or_default()
            .insert(key.to_string());

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.write().await.pop(key);
        self.untrack(&[key.to_string()]).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let candidates: Vec<String> = match pattern_namespace(pattern) {
            Some(namespace) => {
                let tracking = self.tracking.read().await;
                tracking
                    .get(namespace)
                    .map(|keys| keys.iter().cloned().collect())
                    .unwrap_or_default()
            }
            None => {
                let store = self.store.read().await;
                store.iter().map(|(key, _)| key.clone()).collect()
            }
        };

        let matching: Vec<String> = candidates
            .into_iter()
            .filter(|key| pattern_matches(pattern, key))
            .collect();

        if matching.is_empty() {
            return Ok(());
        }

        {
            let mut store = self.store.write().await;
            for key in &matching {
                store.pop(key);
            }
        }
        self.untrack(&matching).await;

        Ok(())
    }
}
