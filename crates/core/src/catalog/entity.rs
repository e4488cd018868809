use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ValidationError;

/// Identifier assigned to every stored entity by the storage engine.
pub type EntityId = i64;

/// Name of the identifier field inside a stored row.
pub const ID_FIELD: &str = "id";

/// Name of the soft-delete marker inside a stored row.
pub const DELETED_AT_FIELD: &str = "deleted_at";

/// Lifecycle timestamps shared by every entity.
///
/// Serialized flat into the entity document so storage engines can filter on
/// `deleted_at` without knowing the entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    /// Timestamps for a record created right now.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Bumps `updated_at` to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::now()
    }
}

/// A domain record managed by the repository layer.
///
/// `TABLE` doubles as the cache namespace, so two entity types never share
/// cache keys. `UPDATABLE_FIELDS` is the allow-list consulted by field-level
/// updates; anything not listed can only change through a dedicated mutator.
pub trait Entity: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human readable type name used in errors and logs.
    const ENTITY_TYPE: &'static str;
    /// Storage table and cache prefix.
    const TABLE: &'static str;
    /// Fields that may be changed through a field-update map.
    const UPDATABLE_FIELDS: &'static [&'static str];

    fn id(&self) -> Option<EntityId>;

    fn set_id(&mut self, id: EntityId);

    fn timestamps(&self) -> &Timestamps;

    fn timestamps_mut(&mut self) -> &mut Timestamps;

    /// Checks the entity's own rules.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Returns true if the entity carries a soft-delete marker.
    fn is_trashed(&self) -> bool {
        self.timestamps().deleted_at.is_some()
    }
}

/// Implements the identity and timestamp accessors of [`Entity`] for a struct
/// with `id: Option<EntityId>` and `timestamps: Timestamps` fields.
macro_rules! entity_accessors {
    () => {
        fn id(&self) -> Option<$crate::catalog::EntityId> {
            self.id
        }

        fn set_id(&mut self, id: $crate::catalog::EntityId) {
            self.id = Some(id);
        }

        fn timestamps(&self) -> &$crate::catalog::Timestamps {
            &self.timestamps
        }

        fn timestamps_mut(&mut self) -> &mut $crate::catalog::Timestamps {
            &mut self.timestamps
        }
    };
}

pub(crate) use entity_accessors;
