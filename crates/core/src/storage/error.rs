use thiserror::Error;

use crate::catalog::{EntityId, ProductStatus, ValidationError};

/// Errors raised by a storage engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Transaction conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by repositories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: EntityId,
    },
    #[error("{operation} failed: {source}")]
    OperationFailed {
        operation: String,
        #[source]
        source: StorageError,
    },
    #[error("Category {category_id} cannot be moved under {parent_id}: circular reference")]
    CircularReference {
        category_id: EntityId,
        parent_id: EntityId,
    },
    #[error("Category {id} is in use ({children} children, {products} products)")]
    CategoryInUse {
        id: EntityId,
        children: u64,
        products: u64,
    },
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ProductStatus,
        to: ProductStatus,
    },
    #[error("Category hierarchy corrupted: {0}")]
    HierarchyCorrupted(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// Returns a mapper that wraps a storage error as a failure of `operation`.
    pub fn failed(operation: impl Into<String>) -> impl FnOnce(StorageError) -> Self {
        let operation = operation.into();
        move |source| RepositoryError::OperationFailed { operation, source }
    }

    pub fn not_found(entity_type: &'static str, id: EntityId) -> Self {
        RepositoryError::NotFound { entity_type, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Result type for storage engine operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = RepositoryError::not_found("Product", 42);
        assert_eq!(error.to_string(), "Product not found: 42");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_operation_failed_keeps_source() {
        let error = RepositoryError::failed("update Product")(StorageError::QueryFailed(
            "disk I/O error".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "update Product failed: Query failed: disk I/O error"
        );
        assert!(error.source().is_some());
    }

    #[test]
    fn test_validation_from() {
        let error: RepositoryError = ValidationError::SelfParent.into();
        assert_eq!(
            error.to_string(),
            "Validation failed: A category cannot be its own parent"
        );
    }

    #[test]
    fn test_circular_reference_display() {
        let error = RepositoryError::CircularReference {
            category_id: 1,
            parent_id: 2,
        };
        assert_eq!(
            error.to_string(),
            "Category 1 cannot be moved under 2: circular reference"
        );
    }

    #[test]
    fn test_category_in_use_display() {
        let error = RepositoryError::CategoryInUse {
            id: 3,
            children: 2,
            products: 5,
        };
        assert_eq!(
            error.to_string(),
            "Category 3 is in use (2 children, 5 products)"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = RepositoryError::InvalidTransition {
            from: ProductStatus::Archived,
            to: ProductStatus::Published,
        };
        assert_eq!(
            error.to_string(),
            "Invalid status transition from archived to published"
        );
    }

    #[test]
    fn test_storage_error_display() {
        assert_eq!(
            StorageError::Conflict("database is locked".to_string()).to_string(),
            "Transaction conflict: database is locked"
        );
        assert_eq!(
            StorageError::ConnectionFailed("no such file".to_string()).to_string(),
            "Connection failed: no such file"
        );
    }
}
