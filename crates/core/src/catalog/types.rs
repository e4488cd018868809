use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::entity_accessors;
use super::operations::{
    validate_admin, validate_audit_log, validate_badge, validate_category, validate_link,
    validate_marketplace, validate_product,
};
use super::{Entity, EntityId, Timestamps, ValidationError};

/// Publication state of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    PendingReview,
    Published,
    Archived,
}

impl ProductStatus {
    /// Returns true if a product in this state may move to `next`.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: ProductStatus) -> bool {
        use ProductStatus::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Draft, PendingReview)
                | (Draft, Published)
                | (Draft, Archived)
                | (PendingReview, Draft)
                | (PendingReview, Published)
                | (PendingReview, Archived)
                | (Published, Draft)
                | (Published, Archived)
                | (Archived, Draft)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::PendingReview => "pending_review",
            ProductStatus::Published => "published",
            ProductStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ProductStatus::Draft),
            "pending_review" | "pending" => Ok(ProductStatus::PendingReview),
            "published" => Ok(ProductStatus::Published),
            "archived" => Ok(ProductStatus::Archived),
            other => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// A product listed in the affiliate catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Option<EntityId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Reference price in minor currency units.
    pub price_cents: i64,
    pub category_id: Option<EntityId>,
    pub status: ProductStatus,
    pub featured: bool,
    pub view_count: u64,
    pub click_count: u64,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Product {
    /// Creates a new draft product.
    pub fn new(name: impl Into<String>, slug: impl Into<String>, price_cents: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            slug: slug.into(),
            description: None,
            price_cents,
            category_id: None,
            status: ProductStatus::Draft,
            featured: false,
            view_count: 0,
            click_count: 0,
            timestamps: Timestamps::now(),
        }
    }

    pub fn with_category(mut self, category_id: EntityId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn featured(mut self) -> Self {
        self.featured = true;
        self
    }
}

impl Entity for Product {
    const ENTITY_TYPE: &'static str = "Product";
    const TABLE: &'static str = "products";
    const UPDATABLE_FIELDS: &'static [&'static str] = &[
        "name",
        "slug",
        "description",
        "price_cents",
        "category_id",
        "featured",
    ];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_product(self)
    }
}

/// A node of the category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<EntityId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Parent category; `None` for roots.
    pub parent_id: Option<EntityId>,
    /// Position among siblings, ascending.
    pub sort_order: i32,
    pub active: bool,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Category {
    /// Creates a new active root category.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            slug: slug.into(),
            description: None,
            parent_id: None,
            sort_order: 0,
            active: true,
            timestamps: Timestamps::now(),
        }
    }

    pub fn with_parent(mut self, parent_id: EntityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl Entity for Category {
    const ENTITY_TYPE: &'static str = "Category";
    const TABLE: &'static str = "categories";
    const UPDATABLE_FIELDS: &'static [&'static str] = &[
        "name",
        "slug",
        "description",
        "parent_id",
        "sort_order",
        "active",
    ];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_category(self)
    }
}

/// A store that affiliate links point to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marketplace {
    pub id: Option<EntityId>,
    pub name: String,
    pub slug: String,
    pub base_url: String,
    pub active: bool,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Marketplace {
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            slug: slug.into(),
            base_url: base_url.into(),
            active: true,
            timestamps: Timestamps::now(),
        }
    }
}

impl Entity for Marketplace {
    const ENTITY_TYPE: &'static str = "Marketplace";
    const TABLE: &'static str = "marketplaces";
    const UPDATABLE_FIELDS: &'static [&'static str] = &["name", "slug", "base_url", "active"];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_marketplace(self)
    }
}

/// An affiliate link offering a product on a marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: Option<EntityId>,
    pub product_id: EntityId,
    pub marketplace_id: EntityId,
    pub url: String,
    pub price_cents: i64,
    pub active: bool,
    pub click_count: u64,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Link {
    pub fn new(
        product_id: EntityId,
        marketplace_id: EntityId,
        url: impl Into<String>,
        price_cents: i64,
    ) -> Self {
        Self {
            id: None,
            product_id,
            marketplace_id,
            url: url.into(),
            price_cents,
            active: true,
            click_count: 0,
            timestamps: Timestamps::now(),
        }
    }
}

impl Entity for Link {
    const ENTITY_TYPE: &'static str = "Link";
    const TABLE: &'static str = "links";
    const UPDATABLE_FIELDS: &'static [&'static str] = &["url", "price_cents", "active"];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_link(self)
    }
}

/// A label that can be shown on product cards ("Best seller", "Deal").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: Option<EntityId>,
    pub name: String,
    /// Hex color in `#RRGGBB` form.
    pub color: String,
    pub active: bool,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Badge {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: color.into(),
            active: true,
            timestamps: Timestamps::now(),
        }
    }
}

impl Entity for Badge {
    const ENTITY_TYPE: &'static str = "Badge";
    const TABLE: &'static str = "badges";
    const UPDATABLE_FIELDS: &'static [&'static str] = &["name", "color", "active"];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_badge(self)
    }
}

/// Permission level of an admin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Owner,
    Editor,
    Viewer,
}

/// An account allowed into the admin backend.
///
/// Credentials live with the authentication layer, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: Option<EntityId>,
    pub username: String,
    pub email: String,
    pub role: AdminRole,
    pub active: bool,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Admin {
    pub fn new(username: impl Into<String>, email: impl Into<String>, role: AdminRole) -> Self {
        Self {
            id: None,
            username: username.into(),
            email: email.into(),
            role,
            active: true,
            timestamps: Timestamps::now(),
        }
    }
}

impl Entity for Admin {
    const ENTITY_TYPE: &'static str = "Admin";
    const TABLE: &'static str = "admins";
    const UPDATABLE_FIELDS: &'static [&'static str] = &["email", "role", "active"];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_admin(self)
    }
}

/// A record of an admin action. Audit logs are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Option<EntityId>,
    pub admin_id: Option<EntityId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<EntityId>,
    /// Free-form description of the change.
    pub changes: serde_json::Value,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl AuditLog {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: None,
            admin_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            changes: serde_json::Value::Null,
            timestamps: Timestamps::now(),
        }
    }

    pub fn by_admin(mut self, admin_id: EntityId) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    pub fn on_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_changes(mut self, changes: serde_json::Value) -> Self {
        self.changes = changes;
        self
    }
}

impl Entity for AuditLog {
    const ENTITY_TYPE: &'static str = "AuditLog";
    const TABLE: &'static str = "audit_logs";
    const UPDATABLE_FIELDS: &'static [&'static str] = &[];

    entity_accessors!();

    fn validate(&self) -> Result<(), ValidationError> {
        validate_audit_log(self)
    }
}

/// Every table managed by the repository layer.
pub const TABLES: &[&str] = &[
    Product::TABLE,
    Category::TABLE,
    Marketplace::TABLE,
    Link::TABLE,
    Badge::TABLE,
    Admin::TABLE,
    AuditLog::TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ProductStatus::*;

        assert!(Draft.can_transition_to(Published));
        assert!(PendingReview.can_transition_to(Published));
        assert!(Published.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Draft));
        assert!(Published.can_transition_to(Published));

        assert!(!Archived.can_transition_to(Published));
        assert!(!Published.can_transition_to(PendingReview));
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("published".parse::<ProductStatus>(), Ok(ProductStatus::Published));
        assert_eq!("PENDING".parse::<ProductStatus>(), Ok(ProductStatus::PendingReview));
        assert!("gone".parse::<ProductStatus>().is_err());
        assert_eq!(ProductStatus::PendingReview.to_string(), "pending_review");
    }

    #[test]
    fn test_product_serializes_flat_timestamps() {
        let product = Product::new("Runner", "runner", 4999);
        let value = serde_json::to_value(&product).unwrap();

        assert!(value.get("created_at").is_some());
        assert!(value.get("updated_at").is_some());
        assert!(value.get("deleted_at").unwrap().is_null());
        assert_eq!(value["status"], "draft");
        assert!(value.get("timestamps").is_none());
    }

    #[test]
    fn test_category_roundtrip_through_row() {
        let category = Category::new("Shoes", "shoes").with_sort_order(3);
        let mut value = serde_json::to_value(&category).unwrap();
        value["id"] = serde_json::json!(7);

        let parsed: Category = serde_json::from_value(value).unwrap();

        assert_eq!(parsed.id, Some(7));
        assert_eq!(parsed.sort_order, 3);
        assert!(parsed.is_root());
    }

    #[test]
    fn test_tables_are_distinct() {
        let mut tables = TABLES.to_vec();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), TABLES.len());
    }
}
