use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// A key/value side cache with TTL support and no transactional semantics.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets a value from the cache by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value with an optional TTL. `None` keeps the value until it is
    /// evicted or invalidated.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Deletes a value by key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes all values whose key matches a glob pattern (e.g. `products:query:*`).
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Stores a value without expiry.
    async fn forever(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set(key, value, None).await
    }
}
