use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::EntityId;

/// A condition on a single field of a stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
}

/// Field conditions combined with AND, keyed by field name.
///
/// Backed by a sorted map so two criteria built in different orders are
/// identical values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria(BTreeMap<String, Filter>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition. Comparing to `null` becomes [`Filter::IsNull`].
    pub fn eq(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        let filter = match serde_json::to_value(value).unwrap_or(Value::Null) {
            Value::Null => Filter::IsNull,
            value => Filter::Eq(value),
        };
        self.0.insert(field.into(), filter);
        self
    }

    /// Adds a membership condition.
    pub fn is_in<V: Serialize>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values
            .into_iter()
            .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
            .collect();
        self.0.insert(field.into(), Filter::In(values));
        self
    }

    /// Shorthand for `is_in("id", ids)`.
    pub fn ids(self, ids: &[EntityId]) -> Self {
        self.is_in("id", ids.iter().copied())
    }

    pub fn is_null(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), Filter::IsNull);
        self
    }

    pub fn not_null(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), Filter::NotNull);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Filter> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.0.iter().map(|(field, filter)| (field.as_str(), filter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// A parametric read: criteria, ordering, window, and trash visibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub criteria: Criteria,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub with_trashed: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(criteria: Criteria) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Includes soft-deleted rows.
    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    /// The same query without its window, used for totals.
    pub fn unbounded(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            order: Vec::new(),
            limit: None,
            offset: None,
            with_trashed: self.with_trashed,
        }
    }

    /// Every field name referenced by criteria or ordering.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.criteria
            .iter()
            .map(|(field, _)| field)
            .chain(self.order.iter().map(|o| o.field.as_str()))
    }
}

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub last_page: u64,
}

impl<T> Page<T> {
    /// Builds a page. `page` is 1-based; `last_page` is at least 1.
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            items,
            total,
            page: page.max(1),
            per_page,
            last_page,
        }
    }

    /// Zero-based row offset of a 1-based page.
    pub fn offset_of(page: u64, per_page: u64) -> u64 {
        page.max(1).saturating_sub(1) * per_page.max(1)
    }

    pub fn has_more(&self) -> bool {
        self.page < self.last_page
    }
}

/// Returns true for identifiers safe to embed in a storage query:
/// lowercase ASCII letters, digits and underscores, not starting with a digit.
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
