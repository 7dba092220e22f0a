//! Checkout transaction entities.
//! Framework-agnostic representation of one payment attempt and its line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle of a checkout attempt.
///
/// `Pending` is the only state a transaction is ever created in and the only
/// state it may leave. The other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Rejected,
    Error,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "rejected" => Ok(TransactionStatus::Rejected),
            "error" => Ok(TransactionStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Domain entity representing a checkout attempt. The id doubles as the
/// gateway buy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub total_amount: i64,
    pub status: TransactionStatus,
    pub gateway_token: String,
    pub session_id: String,
    pub guest_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn pending(
        id: String,
        customer_email: String,
        customer_name: String,
        total_amount: i64,
        gateway_token: String,
        session_id: String,
        guest_session_id: Option<String>,
    ) -> Self {
        Self {
            id,
            customer_email,
            customer_name,
            total_amount,
            status: TransactionStatus::Pending,
            gateway_token,
            session_id,
            guest_session_id,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// One product's allocated share of a transaction total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub transaction_id: String,
    pub product_id: String,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}
