mod error;
mod invalidation;
mod keys;
mod patterns;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use invalidation::{InvalidationQueue, PendingInvalidation};
pub use keys::{
    entity_key, is_tracking_key, key_namespace, namespace_pattern, pattern_namespace, query_key,
    query_pattern, tracking_key, tree_key, tree_pattern,
};
pub use patterns::pattern_matches;
pub use serialization::{deserialize_value, serialize_value, SerializationError};
pub use traits::Cache;
