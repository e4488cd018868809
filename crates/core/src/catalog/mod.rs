//! Catalog entities and their pure rules.

mod entity;
mod error;
mod operations;
mod types;
mod updates;

pub use entity::{Entity, EntityId, Timestamps, DELETED_AT_FIELD, ID_FIELD};
pub use error::ValidationError;
pub use operations::{
    is_valid_color, is_valid_email, is_valid_slug, is_valid_url, validate_admin,
    validate_audit_log, validate_badge, validate_category, validate_link, validate_marketplace,
    validate_product, validate_text,
};
pub use types::{
    Admin, AdminRole, AuditLog, Badge, Category, Link, Marketplace, Product, ProductStatus, TABLES,
};
pub use updates::{apply_field_updates, FieldUpdates};
