//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{LineItem, NewPurchase, Transaction, TransactionStatus, PURCHASE_COMPLETED};
use crate::ports::{Completion, RepositoryError, RepositoryResult, TransactionRepository};

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert_pending(&self, tx: &Transaction, items: &[LineItem]) -> RepositoryResult<()> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, customer_email, customer_name, total_amount, status,
                gateway_token, session_id, guest_session_id, created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.customer_email)
        .bind(&tx.customer_name)
        .bind(tx.total_amount)
        .bind(tx.status.as_str())
        .bind(&tx.gateway_token)
        .bind(&tx.session_id)
        .bind(&tx.guest_session_id)
        .bind(tx.created_at)
        .bind(tx.completed_at)
        .execute(&mut *db_tx)
        .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transaction_line_items (transaction_id, product_id, position, price, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&item.transaction_id)
            .bind(&item.product_id)
            .bind(position as i32)
            .bind(item.price)
            .bind(item.created_at)
            .execute(&mut *db_tx)
            .await?;
        }

        db_tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn find_pending_by_token(&self, token: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE gateway_token = $1 AND status = 'pending'",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn line_items(&self, transaction_id: &str) -> RepositoryResult<Vec<LineItem>> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT transaction_id, product_id, price, created_at
            FROM transaction_line_items
            WHERE transaction_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LineItemRow::into_domain).collect())
    }

    async fn transition_from_pending(
        &self,
        id: &str,
        to: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(
        &self,
        id: &str,
        purchases: &[NewPurchase],
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Completion> {
        let mut db_tx = self.pool.begin().await?;

        // Claim the row first; a concurrent delivery that lost the race sees
        // zero affected rows and writes nothing.
        let claimed = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'completed', completed_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(completed_at)
        .execute(&mut *db_tx)
        .await?;

        if claimed.rows_affected() == 0 {
            db_tx.rollback().await?;
            return Ok(Completion::AlreadyProcessed);
        }

        let mut granted = Vec::new();
        let mut already_owned = Vec::new();

        for purchase in purchases {
            let exists: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM purchases
                    WHERE user_email = $1 AND product_id = $2 AND status = 'completed'
                )
                "#,
            )
            .bind(&purchase.user_email)
            .bind(&purchase.product_id)
            .fetch_one(&mut *db_tx)
            .await?;

            if exists {
                already_owned.push(purchase.product_id.clone());
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO purchases (
                    id, user_email, user_name, product_id, amount, status, transaction_id, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (user_email, product_id) WHERE status = 'completed' DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&purchase.user_email)
            .bind(&purchase.user_name)
            .bind(&purchase.product_id)
            .bind(purchase.amount)
            .bind(PURCHASE_COMPLETED)
            .bind(id)
            .bind(completed_at)
            .execute(&mut *db_tx)
            .await?;

            if inserted.rows_affected() == 1 {
                granted.push(purchase.product_id.clone());
            } else {
                already_owned.push(purchase.product_id.clone());
            }
        }

        db_tx.commit().await?;

        Ok(Completion::Completed {
            granted,
            already_owned,
        })
    }

    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        to: TransactionStatus,
    ) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2 WHERE status = 'pending' AND created_at < $1",
        )
        .bind(cutoff)
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    customer_email: String,
    customer_name: String,
    total_amount: i64,
    status: String,
    gateway_token: String,
    session_id: String,
    guest_session_id: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::Database(sqlx::Error::Decode(Box::new(e))))?;

        Ok(Transaction {
            id: self.id,
            customer_email: self.customer_email,
            customer_name: self.customer_name,
            total_amount: self.total_amount,
            status,
            gateway_token: self.gateway_token,
            session_id: self.session_id,
            guest_session_id: self.guest_session_id,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    transaction_id: String,
    product_id: String,
    price: i64,
    created_at: DateTime<Utc>,
}

impl LineItemRow {
    fn into_domain(self) -> LineItem {
        LineItem {
            transaction_id: self.transaction_id,
            product_id: self.product_id,
            price: self.price,
            created_at: self.created_at,
        }
    }
}
