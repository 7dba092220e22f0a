//! Storage seams used by the payment services.
//! Implementations live in `crate::adapters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::domain::{LineItem, NewPurchase, Product, Purchase, Transaction, TransactionStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of the status-guarded completion write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The row moved pending -> completed. `granted` lists products that got a
    /// new purchase row, `already_owned` those skipped by the existence check.
    Completed {
        granted: Vec<String>,
        already_owned: Vec<String>,
    },
    /// The row was no longer pending; nothing was written.
    AlreadyProcessed,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Writes the pending transaction and its line items in one unit.
    async fn insert_pending(&self, tx: &Transaction, items: &[LineItem]) -> RepositoryResult<()>;

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Transaction>;

    async fn find_pending_by_token(&self, token: &str) -> RepositoryResult<Option<Transaction>>;

    async fn line_items(&self, transaction_id: &str) -> RepositoryResult<Vec<LineItem>>;

    /// Moves a pending row to `to`. Returns false when the row was not
    /// pending anymore (already processed).
    async fn transition_from_pending(
        &self,
        id: &str,
        to: TransactionStatus,
    ) -> RepositoryResult<bool>;

    /// Marks the transaction completed and inserts every purchase the
    /// customer does not already own, atomically and only if still pending.
    async fn complete(
        &self,
        id: &str,
        purchases: &[NewPurchase],
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Completion>;

    /// Moves every pending row created before `cutoff` to `to`.
    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        to: TransactionStatus,
    ) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn completed_product_ids(&self, user_email: &str) -> RepositoryResult<HashSet<String>>;

    async fn has_completed(&self, user_email: &str, product_id: &str) -> RepositoryResult<bool>;

    async fn list_completed(&self, user_email: &str) -> RepositoryResult<Vec<Purchase>>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Returns the products that exist among `ids`; unknown ids are omitted.
    async fn find_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<Product>>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn product_ids_for_user(&self, user_email: &str) -> RepositoryResult<Vec<String>>;

    async fn clear_for_user(&self, user_email: &str) -> RepositoryResult<u64>;

    async fn clear_for_session(&self, session_id: &str) -> RepositoryResult<u64>;
}
