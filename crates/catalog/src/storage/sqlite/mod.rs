//! SQLite storage engine.
//!
//! Each entity table holds one JSON document per row; filters and ordering
//! run through `json_extract`. Uses `rusqlite` on a single connection driven
//! by `tokio-rusqlite`.

mod conversions;
mod engine;
mod error;
mod schema;

pub use engine::SqliteStorage;
