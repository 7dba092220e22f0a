//! Postgres implementation of PurchaseRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::Purchase;
use crate::ports::{PurchaseRepository, RepositoryResult};

#[derive(Clone)]
pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn completed_product_ids(&self, user_email: &str) -> RepositoryResult<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT product_id FROM purchases WHERE user_email = $1 AND status = 'completed'",
        )
        .bind(user_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn has_completed(&self, user_email: &str, product_id: &str) -> RepositoryResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM purchases
                WHERE user_email = $1 AND product_id = $2 AND status = 'completed'
            )
            "#,
        )
        .bind(user_email)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_completed(&self, user_email: &str) -> RepositoryResult<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, user_email, user_name, product_id, amount, status, transaction_id, created_at
            FROM purchases
            WHERE user_email = $1 AND status = 'completed'
            ORDER BY created_at ASC, product_id ASC
            "#,
        )
        .bind(user_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PurchaseRow::into_domain).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_email: String,
    user_name: String,
    product_id: String,
    amount: i64,
    status: String,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl PurchaseRow {
    fn into_domain(self) -> Purchase {
        Purchase {
            id: self.id,
            user_email: self.user_email,
            user_name: self.user_name,
            product_id: self.product_id,
            amount: self.amount,
            status: self.status,
            transaction_id: self.transaction_id,
            created_at: self.created_at,
        }
    }
}
