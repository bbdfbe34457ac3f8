use crate::config::PostgresConfig;
use crate::error::Result;
use crate::models::{Interaction, InteractionType, Product};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Read/write access to raw interaction records.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Interactions at or after `since` (all history when `None`), newest
    /// first, capped at `limit`.
    async fn fetch_interactions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Interaction>>;

    async fn fetch_user_interactions(&self, user_id: Uuid, limit: usize)
        -> Result<Vec<Interaction>>;

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()>;
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn fetch_products(&self, limit: usize) -> Result<Vec<Product>>;
}

/// Read access to completed orders, for purchase exclusion.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn fetch_purchased_product_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
}

#[derive(FromRow)]
struct InteractionRow {
    user_id: Uuid,
    product_id: Uuid,
    interaction_type: String,
    rating: Option<i16>,
    created_at: DateTime<Utc>,
}

impl InteractionRow {
    /// Rows with interaction types this build does not know are skipped
    /// rather than failing the whole fetch.
    fn into_interaction(self) -> Option<Interaction> {
        InteractionType::parse(&self.interaction_type).map(|t| Interaction {
            user_id: self.user_id,
            product_id: self.product_id,
            interaction_type: t,
            rating: self.rating.map(|r| r as u8),
            timestamp: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    category: Option<String>,
    brand: Option<String>,
    tags: Option<Vec<String>>,
    price: Option<f64>,
    rating: Option<f32>,
    review_count: Option<i32>,
    in_stock: Option<bool>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            brand: row.brand,
            tags: row.tags.unwrap_or_default(),
            price: row.price,
            rating: row.rating,
            review_count: row.review_count.map(|c| c.max(0) as u32),
            in_stock: row.in_stock.unwrap_or(true),
        }
    }
}

/// Postgres-backed implementation of all three store traits.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InteractionStore for PostgresBackend {
    async fn fetch_interactions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let rows: Vec<InteractionRow> = sqlx::query_as::<_, InteractionRow>(
            "SELECT user_id, product_id, interaction_type, rating, created_at \
             FROM interactions \
             WHERE $1::timestamptz IS NULL OR created_at >= $1 \
             ORDER BY created_at DESC \
             LIMIT $2",
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(InteractionRow::into_interaction)
            .collect())
    }

    async fn fetch_user_interactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let rows: Vec<InteractionRow> = sqlx::query_as::<_, InteractionRow>(
            "SELECT user_id, product_id, interaction_type, rating, created_at \
             FROM interactions \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(InteractionRow::into_interaction)
            .collect())
    }

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO interactions (user_id, product_id, interaction_type, rating, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(interaction.user_id)
        .bind(interaction.product_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.rating.map(|r| r as i16))
        .bind(interaction.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresBackend {
    async fn fetch_products(&self, limit: usize) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as::<_, ProductRow>(
            "SELECT id, title, description, category, brand, tags, price, rating, \
                    review_count, in_stock \
             FROM products \
             ORDER BY id \
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}

#[async_trait]
impl OrderStore for PostgresBackend {
    async fn fetch_purchased_product_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT oi.product_id \
             FROM order_items oi \
             JOIN orders o ON o.id = oi.order_id \
             WHERE o.user_id = $1 AND o.status = 'completed'",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

/// In-memory implementation of the store traits for tests and local runs.
#[derive(Default)]
pub struct MemoryBackend {
    interactions: RwLock<Vec<Interaction>>,
    products: RwLock<Vec<Product>>,
    purchases: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, product: Product) {
        self.products.write().await.push(product);
    }

    pub async fn add_products(&self, products: Vec<Product>) {
        self.products.write().await.extend(products);
    }

    pub async fn add_interaction(&self, interaction: Interaction) {
        if interaction.interaction_type == InteractionType::Purchase {
            self.purchases
                .write()
                .await
                .entry(interaction.user_id)
                .or_default()
                .insert(interaction.product_id);
        }
        self.interactions.write().await.push(interaction);
    }

    pub async fn add_interactions(&self, interactions: Vec<Interaction>) {
        for interaction in interactions {
            self.add_interaction(interaction).await;
        }
    }

    pub async fn interaction_count(&self) -> usize {
        self.interactions.read().await.len()
    }
}

#[async_trait]
impl InteractionStore for MemoryBackend {
    async fn fetch_interactions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let mut out: Vec<Interaction> = self
            .interactions
            .read()
            .await
            .iter()
            .filter(|i| since.map_or(true, |s| i.timestamp >= s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    async fn fetch_user_interactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let mut out: Vec<Interaction> = self
            .interactions
            .read()
            .await
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        self.add_interaction(interaction.clone()).await;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryBackend {
    async fn fetch_products(&self, limit: usize) -> Result<Vec<Product>> {
        let mut out: Vec<Product> = self.products.read().await.clone();
        out.sort_by_key(|p| p.id);
        out.truncate(limit);
        Ok(out)
    }
}

#[async_trait]
impl OrderStore for MemoryBackend {
    async fn fetch_purchased_product_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .purchases
            .read()
            .await
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}
