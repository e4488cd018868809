use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use catalog_core::cache::{entity_key, query_pattern, Cache};
use catalog_core::catalog::{Entity, EntityId, Product, ProductStatus};
use catalog_core::query::{Criteria, OrderBy, Query};
use catalog_core::storage::{RepositoryError, Result, StorageEngine};

use super::{CachedRepository, UnitOfWork, WriteHooks};

#[derive(Debug, Clone, Copy)]
enum Counter {
    Views,
    Clicks,
}

/// Holds generic saves to the status workflow. Counters are owned by the
/// increment mutators, so a save keeps the stored values.
struct ProductHooks;

#[async_trait]
impl WriteHooks<Product> for ProductHooks {
    async fn before_save(
        &self,
        _uow: &mut UnitOfWork,
        product: &mut Product,
        previous: Option<&Product>,
    ) -> Result<()> {
        let Some(previous) = previous else {
            return Ok(());
        };
        if !previous.status.can_transition_to(product.status) {
            return Err(RepositoryError::InvalidTransition {
                from: previous.status,
                to: product.status,
            });
        }
        product.view_count = previous.view_count;
        product.click_count = previous.click_count;
        Ok(())
    }
}

/// Product repository with status transitions and engagement counters.
///
/// Targeted mutators run as atomic cache operations: the updated product is
/// published to its entity key once the transaction commits, and the key is
/// dropped if anything fails.
pub struct ProductRepository<S: ?Sized, C: ?Sized> {
    inner: CachedRepository<Product, S, C>,
}

impl<S: ?Sized, C: ?Sized> Clone for ProductRepository<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ?Sized, C: ?Sized> Deref for ProductRepository<S, C> {
    type Target = CachedRepository<Product, S, C>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S, C> ProductRepository<S, C>
where
    S: StorageEngine + ?Sized,
    C: Cache + ?Sized,
{
    pub fn new(storage: Arc<S>, cache: Arc<C>, ttl: Duration) -> Self {
        Self {
            inner: CachedRepository::new(storage, cache, ttl).with_hooks(Arc::new(ProductHooks)),
        }
    }

    /// Moves a product to `status` if its current status allows it.
    pub async fn update_status(&self, id: EntityId, status: ProductStatus) -> Result<Product> {
        let product = self
            .inner
            .atomic_cache_operation(entity_key(Product::TABLE, id), move |uow| {
                Box::pin(async move {
                    let mut product: Product = uow.fetch_live_or_fail(id).await?;
                    if !product.status.can_transition_to(status) {
                        return Err(RepositoryError::InvalidTransition {
                            from: product.status,
                            to: status,
                        });
                    }
                    product.status = status;
                    product.timestamps.touch();
                    write_product(uow, &product).await?;
                    Ok(product)
                })
            })
            .await?;

        debug!(id, %status, "Product status changed");
        Ok(product)
    }

    pub async fn increment_views(&self, id: EntityId) -> Result<Product> {
        self.increment(id, Counter::Views).await
    }

    pub async fn increment_clicks(&self, id: EntityId) -> Result<Product> {
        self.increment(id, Counter::Clicks).await
    }

    async fn increment(&self, id: EntityId, counter: Counter) -> Result<Product> {
        let product = self
            .inner
            .atomic_cache_operation(entity_key(Product::TABLE, id), move |uow| {
                Box::pin(async move {
                    let mut product: Product = uow.fetch_live_or_fail(id).await?;
                    let count = match counter {
                        Counter::Views => &mut product.view_count,
                        Counter::Clicks => &mut product.click_count,
                    };
                    *count = count.saturating_add(1);
                    write_product(uow, &product).await?;
                    Ok(product)
                })
            })
            .await?;

        debug!(id, ?counter, views = product.view_count, clicks = product.click_count, "Product counter incremented");
        Ok(product)
    }

    /// Published products in the given order and window.
    pub async fn find_published(
        &self,
        order: Vec<OrderBy>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Product>> {
        let criteria = Criteria::new().eq("status", ProductStatus::Published);
        self.inner.find_by(criteria, order, limit, offset).await
    }

    /// Live products attached to a category, by name.
    pub async fn find_by_category(&self, category_id: EntityId) -> Result<Vec<Product>> {
        let query = Query::filter(Criteria::new().eq("category_id", category_id))
            .order_by(OrderBy::asc("name"));
        self.inner.find_all(&query).await
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        self.inner.find_one_by(Criteria::new().eq("slug", slug)).await
    }
}

/// Stores a mutated product and drops the cached queries it may appear in.
async fn write_product(uow: &mut UnitOfWork, product: &Product) -> Result<()> {
    uow.update(product).await?;
    uow.invalidate_pattern(query_pattern(Product::TABLE));
    Ok(())
}
