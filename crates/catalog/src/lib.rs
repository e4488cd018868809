//! Transactional cache-consistent repositories for the affiliate catalog.
//!
//! This crate is the imperative shell around `catalog_core`: storage
//! engines, cache providers, and the repositories that keep the two
//! consistent across commits and rollbacks.

pub mod cache;
pub mod config;
pub mod repository;
pub mod seed;
pub mod state;
pub mod storage;

pub use config::{Config, ConfigError};
pub use state::{CacheBackend, Catalog, StorageBackend};
