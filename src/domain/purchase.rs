//! Durable access grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PURCHASE_COMPLETED: &str = "completed";

/// A customer's access to one product. At most one completed row exists per
/// (user_email, product_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub product_id: String,
    pub amount: i64,
    pub status: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Grant requested by reconciliation, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchase {
    pub user_email: String,
    pub user_name: String,
    pub product_id: String,
    pub amount: i64,
}

impl Purchase {
    pub fn completed(new: &NewPurchase, transaction_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_email: new.user_email.clone(),
            user_name: new.user_name.clone(),
            product_id: new.product_id.clone(),
            amount: new.amount,
            status: PURCHASE_COMPLETED.to_string(),
            transaction_id: Some(transaction_id.to_string()),
            created_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PURCHASE_COMPLETED
    }
}
