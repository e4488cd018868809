//! Canonical digests for parametric cache keys.
//!
//! Two queries that select the same rows in the same order must share a key,
//! so filters are keyed by field name and IN-lists are sorted and
//! de-duplicated before hashing. Ordering clauses keep their sequence.

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{Filter, Query};

fn canonical_filter(filter: &Filter) -> Value {
    match filter {
        Filter::Eq(value) => json!({ "eq": value }),
        Filter::In(values) => {
            let mut encoded: Vec<(String, &Value)> =
                values.iter().map(|v| (v.to_string(), v)).collect();
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            encoded.dedup_by(|a, b| a.0 == b.0);
            json!({ "in": encoded.into_iter().map(|(_, v)| v).collect::<Vec<_>>() })
        }
        Filter::IsNull => json!("null"),
        Filter::NotNull => json!("not_null"),
    }
}

/// Returns the canonical JSON document that identifies `query` under `operation`.
pub fn canonical_query(operation: &str, query: &Query) -> Value {
    let filters: serde_json::Map<String, Value> = query
        .criteria
        .iter()
        .map(|(field, filter)| (field.to_string(), canonical_filter(filter)))
        .collect();

    let order: Vec<Value> = query
        .order
        .iter()
        .map(|o| json!([o.field, o.direction]))
        .collect();

    json!({
        "op": operation,
        "filters": filters,
        "order": order,
        "limit": query.limit,
        "offset": query.offset,
        "trashed": query.with_trashed,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex sha256 of the canonical form of `query` under `operation`.
pub fn query_digest(operation: &str, query: &Query) -> String {
    sha256_hex(canonical_query(operation, query).to_string().as_bytes())
}

/// Hex sha256 of arbitrary serializable parameters under `operation`.
///
/// Maps serialize with sorted keys, so struct field order is irrelevant.
pub fn digest_params(operation: &str, params: &impl Serialize) -> String {
    let params = serde_json::to_value(params).unwrap_or(Value::Null);
    let document = json!({ "op": operation, "params": params });
    sha256_hex(document.to_string().as_bytes())
}
