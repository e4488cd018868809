//! Cache provider implementations.
//!
//! Concrete implementations of `catalog_core::cache::Cache`. The in-memory
//! LRU cache is always compiled; the Redis provider sits behind the `redis`
//! feature.

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use memory::MemoryCache;

#[cfg(feature = "redis")]
pub use redis_impl::RedisCache;
