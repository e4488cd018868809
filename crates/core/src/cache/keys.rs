//! Cache key construction.
//!
//! Every key starts with the owning table name, which keeps entity types in
//! separate namespaces:
//!
//! - `{table}:entity:{id}` for point lookups
//! - `{table}:query:{digest}` for parametric reads
//! - `categories:tree:{digest}` for rendered category trees

use crate::catalog::EntityId;

const TREE_PREFIX: &str = "categories:tree";

/// Returns the cache key for a single entity.
pub fn entity_key(table: &str, id: EntityId) -> String {
    format!("{table}:entity:{id}")
}

/// Returns the cache key for a parametric read identified by `digest`.
pub fn query_key(table: &str, digest: &str) -> String {
    format!("{table}:query:{digest}")
}

/// Returns the pattern matching every cached parametric read of a table.
pub fn query_pattern(table: &str) -> String {
    format!("{table}:query:*")
}

/// Returns the cache key for a category tree identified by `digest`.
pub fn tree_key(digest: &str) -> String {
    format!("{TREE_PREFIX}:{digest}")
}

/// Returns the pattern matching every cached category tree.
pub fn tree_pattern() -> String {
    format!("{TREE_PREFIX}:*")
}

/// Returns the pattern matching every key of a table.
pub fn namespace_pattern(table: &str) -> String {
    format!("{table}:*")
}

/// Returns the key of the set that tracks every live key under `namespace`.
///
/// Providers without native pattern deletion use these sets instead of
/// scanning the whole keyspace.
pub fn tracking_key(namespace: &str) -> String {
    format!("{namespace}:_keys")
}

/// Returns the first segment of a key (`products` for `products:entity:1`).
pub fn key_namespace(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

/// Returns the first segment of a pattern, or `None` if that segment
/// contains a wildcard and the pattern may span namespaces.
///
/// # Examples
///
/// ```
/// use catalog_core::cache::pattern_namespace;
///
/// assert_eq!(pattern_namespace("products:query:*"), Some("products"));
/// assert_eq!(pattern_namespace("*:query:*"), None);
/// ```
pub fn pattern_namespace(pattern: &str) -> Option<&str> {
    let first = pattern.split(':').next()?;
    if first.contains('*') || first == pattern {
        return None;
    }
    Some(first)
}

/// Returns true for the bookkeeping keys created by [`tracking_key`].
pub fn is_tracking_key(key: &str) -> bool {
    key.ends_with(":_keys")
}
