//! Business & Product Directory
//!
//! Read-only view of the catalog owned by the storefront application. The
//! analytics pipeline only needs to know whether ids exist and how to label a
//! product on the dashboard.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Display metadata for a product in the top-products listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Directory lookup failed: {:?}", err);
        DirectoryError::Database(err.to_string())
    }
}

#[async_trait]
pub trait CatalogDirectory: Send + Sync {
    async fn business_exists(&self, business_id: i64) -> Result<bool, DirectoryError>;

    async fn product_exists(&self, product_id: i64) -> Result<bool, DirectoryError>;

    /// Summaries for the given ids. Unknown ids are left out; order is not
    /// significant.
    async fn product_summaries(&self, ids: &[i64]) -> Result<Vec<ProductSummary>, DirectoryError>;
}

// ============================================
// In-Memory Directory
// ============================================

/// Directory backed by maps, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    businesses: RwLock<HashSet<i64>>,
    products: RwLock<HashMap<i64, ProductSummary>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_business(&self, business_id: i64) {
        self.businesses.write().await.insert(business_id);
    }

    pub async fn add_product(&self, product: ProductSummary) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn remove_product(&self, product_id: i64) {
        self.products.write().await.remove(&product_id);
    }
}

#[async_trait]
impl CatalogDirectory for InMemoryDirectory {
    async fn business_exists(&self, business_id: i64) -> Result<bool, DirectoryError> {
        Ok(self.businesses.read().await.contains(&business_id))
    }

    async fn product_exists(&self, product_id: i64) -> Result<bool, DirectoryError> {
        Ok(self.products.read().await.contains_key(&product_id))
    }

    async fn product_summaries(&self, ids: &[i64]) -> Result<Vec<ProductSummary>, DirectoryError> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

// ============================================
// Postgres Directory
// ============================================

/// Reads the storefront's `businesses`, `products` and `product_images` tables.
pub struct PgDirectory {
    db: PgPool,
}

impl PgDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogDirectory for PgDirectory {
    async fn business_exists(&self, business_id: i64) -> Result<bool, DirectoryError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM businesses WHERE id = $1)")
            .bind(business_id)
            .fetch_one(&self.db)
            .await?;

        Ok(exists)
    }

    async fn product_exists(&self, product_id: i64) -> Result<bool, DirectoryError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.db)
            .await?;

        Ok(exists)
    }

    async fn product_summaries(&self, ids: &[i64]) -> Result<Vec<ProductSummary>, DirectoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let products = sqlx::query_as::<_, ProductSummary>(
            r#"
            SELECT
                p.id,
                p.name,
                (SELECT i.url FROM product_images i
                 WHERE i.product_id = p.id
                 ORDER BY i.id ASC LIMIT 1) as image
            FROM products p
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_lookups() {
        let directory = InMemoryDirectory::new();
        directory.add_business(1).await;
        directory
            .add_product(ProductSummary {
                id: 10,
                name: "Linen Shirt".into(),
                image: Some("https://img.example/10.png".into()),
            })
            .await;

        assert!(directory.business_exists(1).await.unwrap());
        assert!(!directory.business_exists(2).await.unwrap());
        assert!(directory.product_exists(10).await.unwrap());
        assert!(!directory.product_exists(11).await.unwrap());

        let summaries = directory.product_summaries(&[10, 11]).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "Linen Shirt");
    }
}
