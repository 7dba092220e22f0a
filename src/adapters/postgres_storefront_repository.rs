//! Postgres access to the storefront-owned tables: products (read-only) and
//! carts (cleared after a successful purchase).

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::Product;
use crate::ports::{CartRepository, CatalogRepository, RepositoryResult};

#[derive(Clone)]
pub struct PostgresStorefrontRepository {
    pool: PgPool,
}

impl PostgresStorefrontRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PostgresStorefrontRepository {
    async fn find_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, company, price FROM products WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Product {
                id: r.id,
                name: r.name,
                company: r.company,
                price: r.price,
            })
            .collect())
    }
}

#[async_trait]
impl CartRepository for PostgresStorefrontRepository {
    async fn product_ids_for_user(&self, user_email: &str) -> RepositoryResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT product_id FROM cart_items
            WHERE user_email = $1
            GROUP BY product_id
            ORDER BY MIN(created_at) ASC
            "#,
        )
        .bind(user_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn clear_for_user(&self, user_email: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_email = $1")
            .bind(user_email)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn clear_for_session(&self, session_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    company: Option<String>,
    price: i64,
}
