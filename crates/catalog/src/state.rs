//! Repository wiring.
//!
//! Builds one repository per entity over a shared storage engine and cache,
//! both picked at runtime from the backends compiled into the crate.

use std::sync::Arc;

use clap::ValueEnum;

use catalog_core::cache::Cache;
use catalog_core::catalog::{Admin, AuditLog, Badge, Link, Marketplace};
use catalog_core::storage::StorageEngine;

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::repository::{CachedRepository, CategoryRepository, ProductRepository};
use crate::storage::InMemoryStorage;

/// Storage engine to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Process-local storage, lost on exit.
    Inmemory,
    /// SQLite file at `SQLITE_PATH` (requires the `sqlite` feature).
    Sqlite,
}

/// Cache provider to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    /// Process-local LRU cache.
    Memory,
    /// Redis at `REDIS_URL` (requires the `redis` feature).
    Redis,
}

pub type Repository<E> = CachedRepository<E, dyn StorageEngine, dyn Cache>;

/// Every catalog repository, sharing one storage engine and one cache.
#[derive(Clone)]
pub struct Catalog {
    pub categories: CategoryRepository<dyn StorageEngine, dyn Cache>,
    pub products: ProductRepository<dyn StorageEngine, dyn Cache>,
    pub marketplaces: Repository<Marketplace>,
    pub links: Repository<Link>,
    pub badges: Repository<Badge>,
    pub admins: Repository<Admin>,
    pub audit_logs: Repository<AuditLog>,
}

impl Catalog {
    pub fn new(storage: Arc<dyn StorageEngine>, cache: Arc<dyn Cache>, config: &Config) -> Self {
        let ttl = config.cache_ttl();
        Self {
            categories: CategoryRepository::new(
                storage.clone(),
                cache.clone(),
                ttl,
                config.tree_cache_ttl(),
            ),
            products: ProductRepository::new(storage.clone(), cache.clone(), ttl),
            marketplaces: CachedRepository::new(storage.clone(), cache.clone(), ttl),
            links: CachedRepository::new(storage.clone(), cache.clone(), ttl),
            badges: CachedRepository::new(storage.clone(), cache.clone(), ttl),
            admins: CachedRepository::new(storage.clone(), cache.clone(), ttl),
            audit_logs: CachedRepository::new(storage, cache, ttl),
        }
    }

    /// In-memory storage and cache.
    pub fn in_memory(config: &Config) -> Self {
        Self::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(MemoryCache::new(config.cache_max_entries)),
            config,
        )
    }

    /// Connects the requested backends.
    pub async fn connect(
        storage_backend: StorageBackend,
        cache_backend: CacheBackend,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let storage: Arc<dyn StorageEngine> = match storage_backend {
            StorageBackend::Inmemory => Arc::new(InMemoryStorage::new()),
            #[cfg(feature = "sqlite")]
            StorageBackend::Sqlite => {
                Arc::new(crate::storage::SqliteStorage::new(&config.sqlite_path).await?)
            }
            #[cfg(not(feature = "sqlite"))]
            StorageBackend::Sqlite => anyhow::bail!("built without the 'sqlite' feature"),
        };

        let cache: Arc<dyn Cache> = match cache_backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new(config.cache_max_entries)),
            #[cfg(feature = "redis")]
            CacheBackend::Redis => Arc::new(crate::cache::RedisCache::new(&config.redis_url).await?),
            #[cfg(not(feature = "redis"))]
            CacheBackend::Redis => anyhow::bail!("built without the 'redis' feature"),
        };

        tracing::info!(
            storage = ?storage_backend,
            cache = ?cache_backend,
            "Catalog backends connected"
        );
        Ok(Self::new(storage, cache, config))
    }
}
