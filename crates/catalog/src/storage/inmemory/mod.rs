//! In-memory storage engine.
//!
//! Holds committed rows in a shared map and stages each transaction's writes
//! on a private copy, swapped in on commit. One transaction runs at a time.
//!
//! ```rust,ignore
//! use catalog::storage::InMemoryStorage;
//!
//! let storage = InMemoryStorage::new();
//! let mut tx = storage.begin().await?;
//! ```

mod engine;

pub use engine::InMemoryStorage;
