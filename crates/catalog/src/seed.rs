//! Demo catalog used by the CLI.

use serde_json::json;

use catalog_core::catalog::{
    Admin, AdminRole, AuditLog, Badge, Category, Link, Marketplace, Product, ProductStatus,
};
use catalog_core::storage::Result;

use crate::state::Catalog;

/// Number of records created by [`seed_demo_data`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub products: usize,
    pub marketplaces: usize,
    pub links: usize,
    pub badges: usize,
    pub admins: usize,
}

fn id_of(id: Option<i64>) -> i64 {
    id.unwrap_or_default()
}

/// Creates a small catalog: two category trees, a few products in each
/// publication state, two marketplaces with links, badges and an admin.
pub async fn seed_demo_data(catalog: &Catalog) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let shoes = catalog
        .categories
        .create(Category::new("Shoes", "shoes").with_description("Footwear for every season"))
        .await?;
    let electronics = catalog
        .categories
        .create(Category::new("Electronics", "electronics").with_sort_order(1))
        .await?;
    let shoes_id = id_of(shoes.id);
    let electronics_id = id_of(electronics.id);

    let mut leaves = Vec::new();
    for (name, slug, parent, order) in [
        ("Sneakers", "sneakers", shoes_id, 0),
        ("Boots", "boots", shoes_id, 1),
        ("Phones", "phones", electronics_id, 0),
        ("Laptops", "laptops", electronics_id, 1),
    ] {
        let category = catalog
            .categories
            .create(Category::new(name, slug).with_parent(parent).with_sort_order(order))
            .await?;
        leaves.push(id_of(category.id));
    }
    summary.categories = 2 + leaves.len();

    let shop = catalog
        .marketplaces
        .create(Marketplace::new("ShopHub", "shophub", "https://shophub.example.com"))
        .await?;
    let bazaar = catalog
        .marketplaces
        .create(Marketplace::new("Bazaar", "bazaar", "https://bazaar.example.com"))
        .await?;
    summary.marketplaces = 2;

    let products = [
        Product::new("Trail Runner", "trail-runner", 8_999)
            .with_category(leaves[0])
            .with_status(ProductStatus::Published)
            .featured(),
        Product::new("City Sneaker", "city-sneaker", 6_499)
            .with_category(leaves[0])
            .with_status(ProductStatus::Published),
        Product::new("Hiking Boot", "hiking-boot", 14_999)
            .with_category(leaves[1])
            .with_status(ProductStatus::PendingReview),
        Product::new("Pocket Phone", "pocket-phone", 49_900)
            .with_category(leaves[2])
            .with_status(ProductStatus::Published)
            .with_description("Compact phone with a great camera"),
        Product::new("Studio Laptop", "studio-laptop", 129_900).with_category(leaves[3]),
    ];

    for product in products {
        let product = catalog.products.create(product).await?;
        let product_id = id_of(product.id);
        summary.products += 1;

        for (marketplace, markup) in [(&shop, 0), (&bazaar, 250)] {
            let url = format!("{}/p/{}", marketplace.base_url, product.slug);
            catalog
                .links
                .create(Link::new(
                    product_id,
                    id_of(marketplace.id),
                    url,
                    product.price_cents + markup,
                ))
                .await?;
            summary.links += 1;
        }
    }

    for (name, color) in [("Best Seller", "#F59E0B"), ("New", "#10B981"), ("Deal", "#EF4444")] {
        catalog.badges.create(Badge::new(name, color)).await?;
        summary.badges += 1;
    }

    let admin = catalog
        .admins
        .create(Admin::new("ana", "ana@example.com", AdminRole::Owner))
        .await?;
    summary.admins = 1;

    catalog
        .audit_logs
        .create(
            AuditLog::new("seed", "Catalog")
                .by_admin(id_of(admin.id))
                .with_changes(json!({
                    "categories": summary.categories,
                    "products": summary.products,
                })),
        )
        .await?;

    tracing::info!(?summary, "Seeded demo catalog");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use catalog_core::query::Query;

    fn config() -> Config {
        Config {
            cache_ttl_seconds: 60,
            cache_max_entries: 1_000,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_seed_demo_data() {
        let catalog = Catalog::in_memory(&config());
        let summary = seed_demo_data(&catalog).await.unwrap();

        assert_eq!(summary.categories, 6);
        assert_eq!(summary.products, 5);
        assert_eq!(summary.links, 10);
        assert_eq!(catalog.links.count(&Query::new()).await.unwrap(), 10);

        let tree = catalog.categories.get_tree(None, None).await.unwrap();
        let roots: Vec<_> = tree.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(roots, vec!["Shoes", "Electronics"]);
        assert_eq!(tree[1].children_count, 2);

        let published = catalog.products.find_published(Vec::new(), None, None).await.unwrap();
        assert_eq!(published.len(), 3);
    }
}
