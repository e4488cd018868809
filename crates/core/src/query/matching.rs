//! Row filtering and ordering over JSON documents.
//!
//! Storage engines without a query planner evaluate [`Query`] values with
//! these functions. Missing fields compare as `null`.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Direction, Filter, Query};
use crate::catalog::{DELETED_AT_FIELD, ID_FIELD};

fn field<'a>(row: &'a Value, name: &str) -> &'a Value {
    row.get(name).unwrap_or(&Value::Null)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => match type_rank(a).cmp(&type_rank(b)) {
            Ordering::Equal => a.to_string().cmp(&b.to_string()),
            other => other,
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Returns true if the row carries a soft-delete marker.
pub fn row_is_trashed(row: &Value) -> bool {
    !field(row, DELETED_AT_FIELD).is_null()
}

/// Returns true if the row satisfies every filter of the query, including
/// trash visibility.
pub fn row_matches(row: &Value, query: &Query) -> bool {
    if !query.with_trashed && row_is_trashed(row) {
        return false;
    }

    query.criteria.iter().all(|(name, filter)| {
        let value = field(row, name);
        match filter {
            Filter::Eq(expected) => values_equal(value, expected),
            Filter::In(candidates) => candidates.iter().any(|c| values_equal(value, c)),
            Filter::IsNull => value.is_null(),
            Filter::NotNull => !value.is_null(),
        }
    })
}

/// Orders two rows by the query's ordering clauses, then by id ascending.
pub fn compare_rows(a: &Value, b: &Value, query: &Query) -> Ordering {
    for order in &query.order {
        let ordering = compare_values(field(a, &order.field), field(b, &order.field));
        let ordering = match order.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    compare_values(field(a, ID_FIELD), field(b, ID_FIELD))
}

/// Filters, sorts and windows rows according to `query`.
pub fn apply_query<'a, I>(rows: I, query: &Query) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut selected: Vec<&Value> = rows
        .into_iter()
        .filter(|row| row_matches(row, query))
        .collect();
    selected.sort_by(|a, b| compare_rows(a, b, query));

    selected
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}
