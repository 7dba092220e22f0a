//! Opens a checkout: prices the selection, creates the gateway session and
//! records the pending transaction.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{LineItem, Transaction};
use crate::gateway::{CreateRequest, GatewayError, PaymentGateway};
use crate::ports::{CatalogRepository, PurchaseRepository, RepositoryError, TransactionRepository};
use crate::services::pricing::{self, PricingError};
use crate::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum InitiationError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Validation error: {0}")]
    Pricing(#[from] PricingError),
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct InitiateInput {
    pub product_ids: Vec<String>,
    pub customer_email: String,
    pub customer_name: String,
    pub guest_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateOutput {
    pub redirect_url: String,
    pub token: String,
    pub transaction_id: String,
    pub amount: i64,
}

pub struct TransactionInitiator {
    transactions: Arc<dyn TransactionRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    catalog: Arc<dyn CatalogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    return_url: String,
}

impl TransactionInitiator {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        purchases: Arc<dyn PurchaseRepository>,
        catalog: Arc<dyn CatalogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        public_base_url: &str,
    ) -> Self {
        Self {
            transactions,
            purchases,
            catalog,
            gateway,
            return_url: format!("{}/payment/return", public_base_url.trim_end_matches('/')),
        }
    }

    pub async fn initiate(&self, input: InitiateInput) -> Result<InitiateOutput, InitiationError> {
        let email = validation::normalize_email(&input.customer_email);
        let name = validation::sanitize_string(&input.customer_name);
        let product_ids: Vec<String> = input
            .product_ids
            .iter()
            .map(|id| id.trim().to_string())
            .collect();

        validation::validate_email(&email)?;
        validation::validate_customer_name(&name)?;
        validation::validate_product_ids(&product_ids)?;
        if let Some(session_id) = &input.guest_session_id {
            validation::validate_session_id(session_id)?;
        }

        self.ensure_products_exist(&product_ids).await?;

        let purchased = self.purchases.completed_product_ids(&email).await?;
        let quote = pricing::quote(&product_ids, &purchased)?;

        let now = Utc::now();
        let buy_order = generate_buy_order(now);
        let session_id = generate_session_id(now);

        let request = CreateRequest {
            buy_order: buy_order.clone(),
            session_id: session_id.clone(),
            amount: quote.total,
            return_url: self.return_url.clone(),
        };

        // Nothing is persisted unless the gateway opened a session.
        let session = self.gateway.create(&request).await.map_err(|e| {
            error!(buy_order = %buy_order, amount = quote.total, error = %e, "Gateway create failed");
            e
        })?;

        let tx = Transaction::pending(
            buy_order.clone(),
            email,
            name,
            quote.total,
            session.token.clone(),
            session_id,
            input.guest_session_id,
        );
        let items: Vec<LineItem> = quote
            .items
            .iter()
            .map(|item| LineItem {
                transaction_id: buy_order.clone(),
                product_id: item.product_id.clone(),
                price: item.price,
                created_at: tx.created_at,
            })
            .collect();

        if let Err(e) = self.transactions.insert_pending(&tx, &items).await {
            error!(
                incident = "orphaned_gateway_session",
                buy_order = %buy_order,
                token = %session.token,
                amount = quote.total,
                error = %e,
                "Gateway session opened but the pending transaction could not be stored"
            );
            return Err(InitiationError::Persistence(e));
        }

        info!(
            transaction_id = %buy_order,
            amount = quote.total,
            items = items.len(),
            "Payment transaction initiated"
        );

        Ok(InitiateOutput {
            redirect_url: session.url,
            token: session.token,
            transaction_id: buy_order,
            amount: quote.total,
        })
    }

    async fn ensure_products_exist(&self, product_ids: &[String]) -> Result<(), InitiationError> {
        let unique: Vec<String> = product_ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .cloned()
            .collect();
        let known: HashSet<String> = self
            .catalog
            .find_by_ids(&unique)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut unknown: Vec<&String> = unique.iter().filter(|id| !known.contains(*id)).collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();

        Err(ValidationError::new(
            "productIds",
            format!(
                "unknown product(s): {}",
                unknown
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )
        .into())
    }
}

/// `BO` + unix seconds + `-` + 8 random hex chars; at most 26 characters,
/// the gateway's buy-order limit.
pub fn generate_buy_order(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("BO{}-{}", now.timestamp(), &suffix[..8])
}

pub fn generate_session_id(now: DateTime<Utc>) -> String {
    format!("S{}-{}", now.timestamp_millis(), Uuid::new_v4().simple())
}
