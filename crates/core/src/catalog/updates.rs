use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::{Entity, ValidationError};

/// A set of field-level changes to apply to an entity.
///
/// Keys are checked against [`Entity::UPDATABLE_FIELDS`] when applied, so the
/// same map can be built from untrusted input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldUpdates(BTreeMap<String, Value>);

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change. Values that fail to serialize are recorded as null.
    pub fn set(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.insert(field.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Value)> for FieldUpdates {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Returns a copy of `entity` with `updates` applied and validated.
///
/// Fails on the first field outside the allow-list, on values of the wrong
/// shape, and when the resulting entity breaks its own rules.
pub fn apply_field_updates<E: Entity>(entity: &E, updates: &FieldUpdates) -> Result<E, ValidationError> {
    let mut document = serde_json::to_value(entity).map_err(|e| ValidationError::InvalidValue {
        field: E::ENTITY_TYPE.to_string(),
        reason: e.to_string(),
    })?;

    let Some(map) = document.as_object_mut() else {
        return Err(ValidationError::InvalidValue {
            field: E::ENTITY_TYPE.to_string(),
            reason: "entity does not serialize to an object".to_string(),
        });
    };

    for (field, value) in &updates.0 {
        if !E::UPDATABLE_FIELDS.contains(&field.as_str()) {
            return Err(ValidationError::UnknownField {
                entity_type: E::ENTITY_TYPE,
                field: field.clone(),
            });
        }
        map.insert(field.clone(), value.clone());
    }

    let updated: E = serde_json::from_value(document).map_err(|e| ValidationError::InvalidValue {
        field: updates.fields().collect::<Vec<_>>().join(","),
        reason: e.to_string(),
    })?;

    updated.validate()?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Product};

    #[test]
    fn test_apply_allowed_fields() {
        let product = Product::new("Runner", "runner", 100);
        let updates = FieldUpdates::new()
            .set("name", "Trail Runner")
            .set("price_cents", 250);

        let updated = apply_field_updates(&product, &updates).unwrap();

        assert_eq!(updated.name, "Trail Runner");
        assert_eq!(updated.price_cents, 250);
        assert_eq!(updated.slug, "runner");
    }

    #[test]
    fn test_reject_field_outside_allow_list() {
        let product = Product::new("Runner", "runner", 100);
        let updates = FieldUpdates::new().set("view_count", 1_000);

        let result = apply_field_updates(&product, &updates);

        assert_eq!(
            result,
            Err(ValidationError::UnknownField {
                entity_type: "Product",
                field: "view_count".to_string()
            })
        );
    }

    #[test]
    fn test_reject_wrong_value_shape() {
        let category = Category::new("Shoes", "shoes");
        let updates = FieldUpdates::new().set("sort_order", "first");

        let result = apply_field_updates(&category, &updates);

        assert!(matches!(result, Err(ValidationError::InvalidValue { .. })));
    }

    #[test]
    fn test_updated_entity_is_validated() {
        let product = Product::new("Runner", "runner", 100);
        let updates = FieldUpdates::new().set("price_cents", -5);

        assert!(matches!(
            apply_field_updates(&product, &updates),
            Err(ValidationError::Negative { .. })
        ));
    }

    #[test]
    fn test_null_clears_optional_field() {
        let category = Category::new("Sneakers", "sneakers").with_parent(1);
        let updates = FieldUpdates::new().set("parent_id", Value::Null);

        let updated = apply_field_updates(&category, &updates).unwrap();

        assert!(updated.is_root());
    }
}
