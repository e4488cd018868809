use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use catalog_core::cache::{tree_key, tree_pattern, Cache};
use catalog_core::catalog::{Category, Entity, EntityId, Product, ProductStatus, ValidationError};
use catalog_core::hierarchy::{
    ancestor_chain, build_tree, descendant_ids, parent_map, would_create_cycle, CategoryNode,
    HierarchyError,
};
use catalog_core::query::{digest_params, Criteria, OrderBy, Query};
use catalog_core::storage::{RepositoryError, Result, StorageEngine};

use super::{from_rows, CachedRepository, UnitOfWork, WriteHooks};

/// What still references a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionCheck {
    pub children: u64,
    pub products: u64,
}

impl DeletionCheck {
    pub fn allowed(&self) -> bool {
        self.children == 0 && self.products == 0
    }

    fn into_error(self, id: EntityId) -> RepositoryError {
        RepositoryError::CategoryInUse {
            id,
            children: self.children,
            products: self.products,
        }
    }
}

/// The kind of removal a usage check guards.
#[derive(Debug, Clone, Copy)]
enum Removal {
    Delete,
    ForceDelete,
    Archive,
}

impl Removal {
    /// Children that block the removal. Archiving only cares about active ones.
    fn children(self, id: EntityId) -> Query {
        let criteria = Criteria::new().eq("parent_id", id);
        match self {
            Removal::Delete => Query::filter(criteria),
            Removal::ForceDelete => Query::filter(criteria).with_trashed(),
            Removal::Archive => Query::filter(criteria.eq("active", true)),
        }
    }

    /// Products that block the removal. Archiving only cares about published ones.
    fn products(self, id: EntityId) -> Query {
        let criteria = Criteria::new().eq("category_id", id);
        match self {
            Removal::Delete => Query::filter(criteria),
            Removal::ForceDelete => Query::filter(criteria).with_trashed(),
            Removal::Archive => Query::filter(criteria.eq("status", ProductStatus::Published)),
        }
    }
}

fn siblings_query(parent_id: Option<EntityId>) -> Query {
    Query::filter(Criteria::new().eq("parent_id", parent_id))
        .order_by(OrderBy::asc("sort_order"))
        .order_by(OrderBy::asc("name"))
}

fn corrupted(err: HierarchyError) -> RepositoryError {
    error!(error = %err, "Category hierarchy is corrupted");
    err.into()
}

async fn usage_in(uow: &mut UnitOfWork, id: EntityId, removal: Removal) -> Result<DeletionCheck> {
    let children = uow.count(Category::TABLE, &removal.children(id)).await?;
    let products = uow.count(Product::TABLE, &removal.products(id)).await?;
    Ok(DeletionCheck { children, products })
}

/// Every category, soft-deleted ones included. A trashed category can come
/// back through `restore`, so cycle checks must walk through it.
fn whole_hierarchy() -> Query {
    Query::new().with_trashed()
}

/// Fails with `CircularReference` if `parent_id` is `category_id` or one of
/// its descendants, reading the hierarchy inside the transaction.
async fn ensure_acyclic(uow: &mut UnitOfWork, category_id: EntityId, parent_id: EntityId) -> Result<()> {
    let categories: Vec<Category> = uow.select(&whole_hierarchy()).await?;
    let parents = parent_map(&categories).map_err(corrupted)?;
    if would_create_cycle(&parents, category_id, Some(parent_id)).map_err(corrupted)? {
        return Err(RepositoryError::CircularReference {
            category_id,
            parent_id,
        });
    }
    Ok(())
}

/// Keeps generic category writes inside the hierarchy rules.
struct CategoryHooks;

#[async_trait]
impl WriteHooks<Category> for CategoryHooks {
    async fn before_save(
        &self,
        uow: &mut UnitOfWork,
        category: &mut Category,
        previous: Option<&Category>,
    ) -> Result<()> {
        let reparented = previous.is_none_or(|p| p.parent_id != category.parent_id);
        let Some(parent_id) = category.parent_id.filter(|_| reparented) else {
            return Ok(());
        };

        uow.fetch_live_or_fail::<Category>(parent_id).await?;
        if let Some(id) = category.id {
            ensure_acyclic(uow, id, parent_id).await?;
        }
        Ok(())
    }

    async fn before_delete(&self, uow: &mut UnitOfWork, category: &Category, force: bool) -> Result<()> {
        let Some(id) = category.id else {
            return Ok(());
        };
        let removal = if force {
            Removal::ForceDelete
        } else {
            Removal::Delete
        };
        let usage = usage_in(uow, id, removal).await?;
        if usage.allowed() {
            Ok(())
        } else {
            Err(usage.into_error(id))
        }
    }

    /// A category only comes back under a live parent, and never as its own
    /// ancestor.
    async fn before_restore(&self, uow: &mut UnitOfWork, category: &Category) -> Result<()> {
        let (Some(id), Some(parent_id)) = (category.id, category.parent_id) else {
            return Ok(());
        };
        let parent: Category = uow
            .fetch(parent_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(Category::ENTITY_TYPE, parent_id))?;
        if parent.is_trashed() {
            return Err(ValidationError::InvalidValue {
                field: "parent_id".to_string(),
                reason: format!("parent category {parent_id} is deleted; restore it first"),
            }
            .into());
        }
        ensure_acyclic(uow, id, parent_id).await
    }
}

/// Category repository with tree maintenance.
///
/// Plain reads and writes come from the wrapped [`CachedRepository`]; every
/// category write also drops the `categories:tree:*` namespace. Reparenting
/// through any path is checked for cycles inside the write transaction.
pub struct CategoryRepository<S: ?Sized, C: ?Sized> {
    inner: CachedRepository<Category, S, C>,
    tree_ttl: Duration,
}

impl<S: ?Sized, C: ?Sized> Clone for CategoryRepository<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tree_ttl: self.tree_ttl,
        }
    }
}

impl<S: ?Sized, C: ?Sized> Deref for CategoryRepository<S, C> {
    type Target = CachedRepository<Category, S, C>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S, C> CategoryRepository<S, C>
where
    S: StorageEngine + ?Sized,
    C: Cache + ?Sized,
{
    pub fn new(storage: Arc<S>, cache: Arc<C>, ttl: Duration, tree_ttl: Duration) -> Self {
        let inner = CachedRepository::new(storage, cache, ttl)
            .invalidates(tree_pattern())
            .with_hooks(Arc::new(CategoryHooks));
        Self { inner, tree_ttl }
    }

    async fn load(&self, query: &Query) -> Result<Vec<Category>> {
        let rows = self
            .inner
            .storage()
            .select(Category::TABLE, query)
            .await
            .map_err(RepositoryError::failed("load Category hierarchy"))?;
        from_rows(rows)
    }

    /// Every live category, straight from storage.
    async fn snapshot(&self) -> Result<Vec<Category>> {
        self.load(&Query::new()).await
    }

    async fn snapshot_containing(&self, id: EntityId) -> Result<Vec<Category>> {
        let categories = self.snapshot().await?;
        if categories.iter().any(|c| c.id == Some(id)) {
            Ok(categories)
        } else {
            Err(RepositoryError::not_found(Category::ENTITY_TYPE, id))
        }
    }

    /// Renders the category forest, or the subtree below `root`.
    ///
    /// Top-level nodes have depth 0 and nodes at `max_depth` are not
    /// expanded. The rendering is cached as a whole until the next category
    /// write.
    pub async fn get_tree(
        &self,
        root: Option<EntityId>,
        max_depth: Option<usize>,
    ) -> Result<Vec<CategoryNode>> {
        let key = tree_key(&digest_params("tree", &(root, max_depth)));
        self.inner
            .remember(key, self.tree_ttl, async {
                let categories = match root {
                    Some(id) => self.snapshot_containing(id).await?,
                    None => self.snapshot().await?,
                };
                build_tree(&categories, root, max_depth).map_err(corrupted)
            })
            .await
    }

    /// Advisory check: would `proposed_parent_id` make `category_id` its own
    /// ancestor? [`move_to_parent`](Self::move_to_parent) re-checks inside
    /// its transaction.
    pub async fn would_create_circular_reference(
        &self,
        category_id: EntityId,
        proposed_parent_id: Option<EntityId>,
    ) -> Result<bool> {
        let categories = self.load(&whole_hierarchy()).await?;
        let parents = parent_map(&categories).map_err(corrupted)?;
        would_create_cycle(&parents, category_id, proposed_parent_id).map_err(corrupted)
    }

    /// Moves a category under `new_parent_id` (or to the top level), placing
    /// it after its new siblings.
    pub async fn move_to_parent(
        &self,
        category_id: EntityId,
        new_parent_id: Option<EntityId>,
    ) -> Result<Category> {
        let mut uow = self.inner.begin("move").await?;
        let result: Result<Category> = async {
            let mut category: Category = uow.fetch_live_or_fail(category_id).await?;
            if let Some(parent_id) = new_parent_id {
                uow.fetch_live_or_fail::<Category>(parent_id).await?;
                ensure_acyclic(&mut uow, category_id, parent_id).await?;
            }

            let siblings: Vec<Category> = uow.select(&siblings_query(new_parent_id)).await?;
            category.sort_order = siblings
                .iter()
                .filter(|s| s.id != Some(category_id))
                .map(|s| s.sort_order)
                .max()
                .map_or(0, |last| last.saturating_add(1));
            category.parent_id = new_parent_id;
            category.timestamps.touch();
            category.validate()?;

            uow.update(&category).await?;
            self.inner.invalidate_entity(&mut uow, category_id);
            self.inner.invalidate_queries(&mut uow);
            Ok(category)
        }
        .await;

        let category = self.inner.finish(uow, result).await?;
        debug!(category_id, parent_id = ?new_parent_id, sort_order = category.sort_order, "Moved category");
        Ok(category)
    }

    /// Sets the sort order of several siblings in one transaction.
    ///
    /// Fails without changing anything if an id is missing, soft-deleted,
    /// or not a child of `parent_id`.
    pub async fn reorder_siblings(
        &self,
        parent_id: Option<EntityId>,
        order: &BTreeMap<EntityId, i32>,
    ) -> Result<u64> {
        if order.is_empty() {
            return Ok(0);
        }

        let mut uow = self.inner.begin("reorder").await?;
        let result: Result<u64> = async {
            for (&id, &sort_order) in order {
                let mut category: Category = uow.fetch_live_or_fail(id).await?;
                if category.parent_id != parent_id {
                    let parent = parent_id.map_or("the top level".to_string(), |p| p.to_string());
                    return Err(ValidationError::InvalidValue {
                        field: "parent_id".to_string(),
                        reason: format!("category {id} is not a child of {parent}"),
                    }
                    .into());
                }
                if category.sort_order == sort_order {
                    continue;
                }
                category.sort_order = sort_order;
                category.timestamps.touch();
                uow.update(&category).await?;
                self.inner.invalidate_entity(&mut uow, id);
            }
            self.inner.invalidate_queries(&mut uow);
            Ok(order.len() as u64)
        }
        .await;

        let reordered = self.inner.finish(uow, result).await?;
        debug!(parent_id = ?parent_id, reordered, "Reordered categories");
        Ok(reordered)
    }

    async fn usage(&self, id: EntityId, removal: Removal) -> Result<DeletionCheck> {
        self.inner.find_or_fail(id).await?;
        let storage = self.inner.storage();
        let failed = || RepositoryError::failed("check Category usage");
        let children = storage
            .count(Category::TABLE, &removal.children(id))
            .await
            .map_err(failed())?;
        let products = storage
            .count(Product::TABLE, &removal.products(id))
            .await
            .map_err(failed())?;
        Ok(DeletionCheck { children, products })
    }

    /// Advisory: live children and live products attached to `id`.
    pub async fn can_delete(&self, id: EntityId) -> Result<DeletionCheck> {
        self.usage(id, Removal::Delete).await
    }

    /// Advisory: active children and published products attached to `id`.
    pub async fn can_archive(&self, id: EntityId) -> Result<DeletionCheck> {
        self.usage(id, Removal::Archive).await
    }

    /// Deactivates a category, re-checking its usage inside the transaction.
    pub async fn archive(&self, id: EntityId) -> Result<Category> {
        let mut uow = self.inner.begin("archive").await?;
        let result: Result<Category> = async {
            let mut category: Category = uow.fetch_live_or_fail(id).await?;
            let usage = usage_in(&mut uow, id, Removal::Archive).await?;
            if !usage.allowed() {
                return Err(usage.into_error(id));
            }
            category.active = false;
            category.timestamps.touch();
            uow.update(&category).await?;
            self.inner.invalidate_entity(&mut uow, id);
            self.inner.invalidate_queries(&mut uow);
            Ok(category)
        }
        .await;

        let category = self.inner.finish(uow, result).await?;
        debug!(id, "Archived category");
        Ok(category)
    }

    /// Path from the top of the tree down to the parent of `id`.
    pub async fn ancestors(&self, id: EntityId) -> Result<Vec<Category>> {
        let key = self.inner.derived_key("ancestors", &id);
        self.inner
            .remember(key, self.inner.ttl(), async {
                let categories = self.snapshot_containing(id).await?;
                let parents = parent_map(&categories).map_err(corrupted)?;
                let chain = ancestor_chain(&parents, id).map_err(corrupted)?;
                let by_id: HashMap<EntityId, &Category> = categories
                    .iter()
                    .filter_map(|c| c.id.map(|id| (id, c)))
                    .collect();
                Ok(chain
                    .iter()
                    .rev()
                    .filter_map(|ancestor| by_id.get(ancestor).map(|c| (*c).clone()))
                    .collect())
            })
            .await
    }

    /// Direct children of `parent_id` in display order.
    pub async fn children(&self, parent_id: EntityId) -> Result<Vec<Category>> {
        self.inner.find_all(&siblings_query(Some(parent_id))).await
    }

    /// Top-level categories in display order.
    pub async fn roots(&self) -> Result<Vec<Category>> {
        self.inner.find_all(&siblings_query(None)).await
    }

    /// Ids of every live category below `id`, breadth first.
    pub async fn descendant_ids(&self, id: EntityId) -> Result<Vec<EntityId>> {
        let key = self.inner.derived_key("descendants", &id);
        self.inner
            .remember(key, self.inner.ttl(), async {
                let categories = self.snapshot_containing(id).await?;
                descendant_ids(&categories, id).map_err(corrupted)
            })
            .await
    }
}
