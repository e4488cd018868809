use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog::seed::seed_demo_data;
use catalog::{CacheBackend, Catalog, Config, StorageBackend};
use catalog_core::catalog::{EntityId, ProductStatus};
use catalog_core::query::{Criteria, OrderBy, Query};

/// Catalog - Inspect and maintain the affiliate catalog
#[derive(Parser, Debug)]
#[command(name = "catalog")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Storage engine
    #[arg(long, value_enum, default_value = "inmemory", env = "CATALOG_STORAGE")]
    storage: StorageBackend,

    /// Cache provider
    #[arg(long, value_enum, default_value = "memory", env = "CATALOG_CACHE")]
    cache: CacheBackend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the demo catalog
    Seed,
    /// Print the category tree
    Tree {
        /// Render only the subtree below this category
        #[arg(long)]
        root: Option<EntityId>,
        /// Stop expanding below this depth
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Move a category under another one (or to the top level)
    Move {
        category: EntityId,
        #[arg(long)]
        parent: Option<EntityId>,
    },
    /// Set the sort order of sibling categories, as ID=ORDER pairs
    Reorder {
        #[arg(long)]
        parent: Option<EntityId>,
        #[arg(value_parser = parse_order, required = true)]
        order: Vec<(EntityId, i32)>,
    },
    /// Show whether a category can be deleted or archived
    Check { category: EntityId },
    /// List products, optionally by status
    Products {
        #[arg(long)]
        status: Option<ProductStatus>,
    },
    /// Change the status of a product
    Status { product: EntityId, status: ProductStatus },
}

fn parse_order(pair: &str) -> Result<(EntityId, i32), String> {
    let (id, order) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected ID=ORDER, got '{pair}'"))?;
    let id = id.parse().map_err(|e| format!("invalid id '{id}': {e}"))?;
    let order = order.parse().map_err(|e| format!("invalid order '{order}': {e}"))?;
    Ok((id, order))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let catalog = Catalog::connect(cli.storage, cli.cache, &config)
        .await
        .context("failed to connect catalog backends")?;

    // In-memory storage starts empty on every run.
    if cli.storage == StorageBackend::Inmemory && !matches!(cli.command, Command::Seed) {
        seed_demo_data(&catalog).await?;
    }

    match cli.command {
        Command::Seed => {
            let summary = seed_demo_data(&catalog).await?;
            println!(
                "seeded {} categories, {} products, {} links",
                summary.categories, summary.products, summary.links
            );
        }
        Command::Tree { root, depth } => {
            print_json(&catalog.categories.get_tree(root, depth).await?)?;
        }
        Command::Move { category, parent } => {
            print_json(&catalog.categories.move_to_parent(category, parent).await?)?;
        }
        Command::Reorder { parent, order } => {
            let order: BTreeMap<EntityId, i32> = order.into_iter().collect();
            let count = catalog.categories.reorder_siblings(parent, &order).await?;
            println!("reordered {count} categories");
        }
        Command::Check { category } => {
            let delete = catalog.categories.can_delete(category).await?;
            let archive = catalog.categories.can_archive(category).await?;
            print_json(&serde_json::json!({
                "can_delete": delete.allowed(),
                "delete_blockers": delete,
                "can_archive": archive.allowed(),
                "archive_blockers": archive,
            }))?;
        }
        Command::Products { status } => {
            let criteria = match status {
                Some(status) => Criteria::new().eq("status", status),
                None => Criteria::new(),
            };
            let query = Query::filter(criteria).order_by(OrderBy::asc("name"));
            print_json(&catalog.products.find_all(&query).await?)?;
        }
        Command::Status { product, status } => {
            print_json(&catalog.products.update_status(product, status).await?)?;
        }
    }

    Ok(())
}
