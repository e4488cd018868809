//! Redis cache provider.
//!
//! Keys are grouped per namespace in a tracking set (`{namespace}:_keys`).
//! A value and its tracking entry are written in one `MULTI` pipeline, and
//! pattern deletes read the tracking set instead of scanning. Patterns whose
//! namespace is itself a wildcard fall back to `SCAN`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use catalog_core::cache::{
    is_tracking_key, key_namespace, pattern_matches, pattern_namespace, tracking_key, Cache,
    Result,
};

use super::error::cache_error;

/// Keys handled per pipeline when deleting or pruning.
const PIPELINE_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects and verifies the server answers.
    pub async fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        let conn = ConnectionManager::new(client).await.map_err(cache_error)?;
        debug!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }

    /// Tracked keys in `namespace` that match `pattern`.
    ///
    /// Members whose key already expired are dropped from the tracking set on
    /// the way, since TTL expiry never touches the set.
    async fn tracked(&self, namespace: &str, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let tracking = tracking_key(namespace);
        let members: Vec<String> = conn.smembers(&tracking).await.map_err(cache_error)?;
        let (matching, others): (Vec<String>, Vec<String>) = members
            .into_iter()
            .partition(|key| pattern_matches(pattern, key));

        self.prune(&tracking, &others).await?;
        Ok(matching)
    }

    /// Removes members of `tracking` whose key no longer exists.
    async fn prune(&self, tracking: &str, members: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        for batch in members.chunks(PIPELINE_BATCH) {
            let mut pipe = redis::pipe();
            for key in batch {
                pipe.exists(key);
            }
            let alive: Vec<bool> = pipe.query_async(&mut conn).await.map_err(cache_error)?;
            let dead: Vec<&String> = batch
                .iter()
                .zip(alive)
                .filter_map(|(key, alive)| (!alive).then_some(key))
                .collect();
            if !dead.is_empty() {
                conn.srem::<_, _, ()>(tracking, &dead)
                    .await
                    .map_err(cache_error)?;
                debug!(tracking = %tracking, pruned = dead.len(), "Pruned expired tracking members");
            }
        }
        Ok(())
    }

    async fn scanned(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .scan_match::<_, String>(pattern)
            .await
            .map_err(cache_error)?
            .collect()
            .await;
        Ok(keys.into_iter().filter(|key| !is_tracking_key(key)).collect())
    }

    /// Unlinks `keys` and drops them from their tracking sets.
    async fn unlink(&self, keys: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        for batch in keys.chunks(PIPELINE_BATCH) {
            let mut pipe = redis::pipe();
            pipe.atomic().unlink(batch).ignore();
            for key in batch {
                pipe.srem(tracking_key(key_namespace(key)), key).ignore();
            }
            let _: () = pipe.query_async(&mut conn).await.map_err(cache_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(cache_error)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        match ttl {
            // Redis rejects EX 0.
            Some(ttl) => pipe.set_ex(key, value, ttl.as_secs().max(1)).ignore(),
            None => pipe.set(key, value).ignore(),
        };
        pipe.sadd(tracking_key(key_namespace(key)), key).ignore();

        let _: () = pipe.query_async(&mut conn).await.map_err(cache_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .srem(tracking_key(key_namespace(key)), key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys = match pattern_namespace(pattern) {
            Some(namespace) => self.tracked(namespace, pattern).await?,
            None => self.scanned(pattern).await?,
        };
        if !keys.is_empty() {
            self.unlink(&keys).await?;
        }
        debug!(pattern = %pattern, removed = keys.len(), "Redis pattern delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `None` when no server is reachable, so the suite runs without Redis.
    async fn connect() -> Option<RedisCache> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        RedisCache::new(&url).await.ok()
    }

    fn namespace() -> String {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("catalogtest{}n{}", std::process::id(), nanos)
    }

    #[tokio::test]
    async fn test_set_is_tracked_and_delete_untracks() {
        let Some(cache) = connect().await else {
            eprintln!("Redis not reachable; skipping");
            return;
        };

        let ns = namespace();
        let key = format!("{ns}:entity:7");
        cache.set(&key, b"{\"id\":7}", Some(Duration::from_secs(30))).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(b"{\"id\":7}".to_vec()));

        let mut conn = cache.conn.clone();
        let tracked: Vec<String> = conn.smembers(tracking_key(&ns)).await.unwrap();
        assert_eq!(tracked, vec![key.clone()]);

        cache.delete(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        let tracked: Vec<String> = conn.smembers(tracking_key(&ns)).await.unwrap();
        assert!(tracked.is_empty());
    }

    #[tokio::test]
    async fn test_query_pattern_spares_entities() {
        let Some(cache) = connect().await else {
            eprintln!("Redis not reachable; skipping");
            return;
        };

        let ns = namespace();
        let queries: Vec<String> = (0..3).map(|n| format!("{ns}:query:{n}")).collect();
        let entity = format!("{ns}:entity:1");
        for key in queries.iter().chain([&entity]) {
            cache.set(key, b"[]", None).await.unwrap();
        }

        cache.delete_pattern(&format!("{ns}:query:*")).await.unwrap();

        for key in &queries {
            assert!(cache.get(key).await.unwrap().is_none());
        }
        assert!(cache.get(&entity).await.unwrap().is_some());
        cache.delete_pattern(&format!("{ns}:*")).await.unwrap();
        assert!(cache.get(&entity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pattern_delete_prunes_expired_members() {
        let Some(cache) = connect().await else {
            eprintln!("Redis not reachable; skipping");
            return;
        };

        let ns = namespace();
        let expiring = format!("{ns}:entity:1");
        let query = format!("{ns}:query:1");
        cache.set(&expiring, b"{}", Some(Duration::from_secs(1))).await.unwrap();
        cache.set(&query, b"[]", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cache.delete_pattern(&format!("{ns}:query:*")).await.unwrap();

        let mut conn = cache.conn.clone();
        let tracked: Vec<String> = conn.smembers(tracking_key(&ns)).await.unwrap();
        assert!(tracked.is_empty());
    }
}
