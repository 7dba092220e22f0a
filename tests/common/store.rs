use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use storefront_payments::domain::{
    LineItem, NewPurchase, Product, Purchase, Transaction, TransactionStatus, PURCHASE_COMPLETED,
};
use storefront_payments::health::{DependencyChecker, DependencyStatus};
use storefront_payments::ports::{
    CartRepository, CatalogRepository, Completion, PurchaseRepository, RepositoryError,
    RepositoryResult, TransactionRepository,
};

#[derive(Debug, Clone)]
struct CartEntry {
    user_email: Option<String>,
    session_id: Option<String>,
    product_id: String,
}

#[derive(Default)]
struct State {
    transactions: HashMap<String, Transaction>,
    line_items: Vec<LineItem>,
    purchases: Vec<Purchase>,
    products: HashMap<String, Product>,
    carts: Vec<CartEntry>,
}

/// In-memory store implementing every storage port.
///
/// All tables sit behind one `RwLock`, so multi-row writes such as
/// `complete` are atomic the same way a database transaction is.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    writes_failing: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail with `RepositoryError::Unavailable` until reset.
    pub fn fail_writes(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> RepositoryResult<()> {
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory store is rejecting writes".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn add_product(&self, product: Product) {
        let mut state = self.state.write().await;
        state.products.insert(product.id.clone(), product);
    }

    pub async fn add_to_user_cart(&self, user_email: &str, product_id: &str) {
        let mut state = self.state.write().await;
        state.carts.push(CartEntry {
            user_email: Some(user_email.to_string()),
            session_id: None,
            product_id: product_id.to_string(),
        });
    }

    pub async fn add_to_session_cart(&self, session_id: &str, product_id: &str) {
        let mut state = self.state.write().await;
        state.carts.push(CartEntry {
            user_email: None,
            session_id: Some(session_id.to_string()),
            product_id: product_id.to_string(),
        });
    }

    /// Records a grant made outside the checkout flow (e.g. an earlier order).
    pub async fn add_completed_purchase(&self, user_email: &str, product_id: &str, amount: i64) {
        let mut state = self.state.write().await;
        state.purchases.push(Purchase {
            id: uuid::Uuid::new_v4(),
            user_email: user_email.to_string(),
            user_name: String::new(),
            product_id: product_id.to_string(),
            amount,
            status: PURCHASE_COMPLETED.to_string(),
            transaction_id: None,
            created_at: Utc::now(),
        });
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        let state = self.state.read().await;
        let mut all: Vec<Transaction> = state.transactions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub async fn purchases(&self) -> Vec<Purchase> {
        self.state.read().await.purchases.clone()
    }

    pub async fn session_cart_len(&self, session_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .carts
            .iter()
            .filter(|c| c.session_id.as_deref() == Some(session_id))
            .count()
    }

    /// Overrides `created_at`, for exercising age-based sweeps.
    pub async fn backdate_transaction(&self, id: &str, created_at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        if let Some(tx) = state.transactions.get_mut(id) {
            tx.created_at = created_at;
        }
    }
}

fn owns(purchases: &[Purchase], user_email: &str, product_id: &str) -> bool {
    purchases
        .iter()
        .any(|p| p.is_completed() && p.user_email == user_email && p.product_id == product_id)
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn insert_pending(&self, tx: &Transaction, items: &[LineItem]) -> RepositoryResult<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        if state.transactions.contains_key(&tx.id)
            || state
                .transactions
                .values()
                .any(|t| t.gateway_token == tx.gateway_token)
        {
            return Err(RepositoryError::Unavailable(format!(
                "duplicate transaction {}",
                tx.id
            )));
        }
        state.transactions.insert(tx.id.clone(), tx.clone());
        state.line_items.extend(items.iter().cloned());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Transaction> {
        let state = self.state.read().await;
        state
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn find_pending_by_token(&self, token: &str) -> RepositoryResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|t| t.gateway_token == token && t.status == TransactionStatus::Pending)
            .cloned())
    }

    async fn line_items(&self, transaction_id: &str) -> RepositoryResult<Vec<LineItem>> {
        let state = self.state.read().await;
        Ok(state
            .line_items
            .iter()
            .filter(|i| i.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn transition_from_pending(
        &self,
        id: &str,
        to: TransactionStatus,
    ) -> RepositoryResult<bool> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        match state.transactions.get_mut(id) {
            Some(tx) if tx.status.can_transition_to(to) => {
                tx.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        id: &str,
        purchases: &[NewPurchase],
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Completion> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        match state.transactions.get_mut(id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = TransactionStatus::Completed;
                tx.completed_at = Some(completed_at);
            }
            _ => return Ok(Completion::AlreadyProcessed),
        }

        let mut granted = Vec::new();
        let mut already_owned = Vec::new();
        for purchase in purchases {
            if owns(&state.purchases, &purchase.user_email, &purchase.product_id) {
                already_owned.push(purchase.product_id.clone());
                continue;
            }
            state
                .purchases
                .push(Purchase::completed(purchase, id, completed_at));
            granted.push(purchase.product_id.clone());
        }

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
        self.check_writable()?;
        let mut state = self.state.write().await;
        let mut expired = 0;
        for tx in state.transactions.values_mut() {
            if tx.status == TransactionStatus::Pending && tx.created_at < cutoff {
                tx.status = to;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryStore {
    async fn completed_product_ids(&self, user_email: &str) -> RepositoryResult<HashSet<String>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .filter(|p| p.is_completed() && p.user_email == user_email)
            .map(|p| p.product_id.clone())
            .collect())
    }

    async fn has_completed(&self, user_email: &str, product_id: &str) -> RepositoryResult<bool> {
        let state = self.state.read().await;
        Ok(owns(&state.purchases, user_email, product_id))
    }

    async fn list_completed(&self, user_email: &str) -> RepositoryResult<Vec<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .filter(|p| p.is_completed() && p.user_email == user_email)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn find_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn product_ids_for_user(&self, user_email: &str) -> RepositoryResult<Vec<String>> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = Vec::new();
        for entry in &state.carts {
            if entry.user_email.as_deref() == Some(user_email) && !ids.contains(&entry.product_id) {
                ids.push(entry.product_id.clone());
            }
        }
        Ok(ids)
    }

    async fn clear_for_user(&self, user_email: &str) -> RepositoryResult<u64> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let before = state.carts.len();
        state
            .carts
            .retain(|c| c.user_email.as_deref() != Some(user_email));
        Ok((before - state.carts.len()) as u64)
    }

    async fn clear_for_session(&self, session_id: &str) -> RepositoryResult<u64> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let before = state.carts.len();
        state
            .carts
            .retain(|c| c.session_id.as_deref() != Some(session_id));
        Ok((before - state.carts.len()) as u64)
    }
}

#[async_trait]
impl DependencyChecker for InMemoryStore {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn check(&self) -> DependencyStatus {
        match self.check_writable() {
            Ok(()) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: 0,
            },
            Err(e) => DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: e.to_string(),
            },
        }
    }
}
