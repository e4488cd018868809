//! Cache-consistent repositories.
//!
//! Reads go cache first and fall back to storage; writes run in a storage
//! transaction through a [`UnitOfWork`] whose queued cache invalidations only
//! execute after the commit succeeds.

mod cached;
mod category;
mod product;
mod unit_of_work;

#[cfg(test)]
pub(crate) mod testing;

use serde_json::Value;

use catalog_core::catalog::Entity;
use catalog_core::storage::{RepositoryError, Result};

pub use cached::{CachedRepository, NoHooks, WriteHooks};
pub use category::{CategoryRepository, DeletionCheck};
pub use product::ProductRepository;
pub use unit_of_work::UnitOfWork;

/// Encodes an entity as a storage row.
pub(crate) fn to_row<E: Entity>(entity: &E) -> Result<Value> {
    serde_json::to_value(entity).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Decodes a storage row into an entity.
pub(crate) fn from_row<E: Entity>(row: Value) -> Result<E> {
    serde_json::from_value(row).map_err(|e| {
        RepositoryError::Serialization(format!("invalid {} row: {e}", E::ENTITY_TYPE))
    })
}

/// Decodes a batch of storage rows.
pub(crate) fn from_rows<E: Entity>(rows: Vec<Value>) -> Result<Vec<E>> {
    rows.into_iter().map(from_row).collect()
}
