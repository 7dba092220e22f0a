//! Gateway return handling.
//!
//! The gateway may deliver the same return more than once. Every write here
//! is guarded on the transaction still being `pending`, so a repeated or
//! concurrent delivery of one token grants purchases at most once.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::domain::{LineItem, NewPurchase, Transaction, TransactionStatus};
use crate::gateway::{self, CommitResponse, PaymentGateway};
use crate::ports::{CartRepository, Completion, RepositoryError, TransactionRepository};
use crate::services::pricing;
use crate::services::side_effects::{PurchaseConfirmation, SideEffectDispatcher};

/// Parameters the gateway sends back with the customer. Accepts both the
/// gateway's upper-case names and snake_case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
pub struct ReturnCallback {
    #[serde(default)]
    pub token_ws: Option<String>,
    #[serde(default, alias = "TBK_TOKEN")]
    pub tbk_token: Option<String>,
    #[serde(default, alias = "TBK_ORDEN_COMPRA")]
    pub tbk_buy_order: Option<String>,
    #[serde(default, alias = "TBK_ID_SESION")]
    pub tbk_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackKind {
    /// The customer aborted on the gateway form or let it time out.
    Cancelled { buy_order: Option<String> },
    Confirmation { token: String },
    /// A token is present but is not something the gateway issues.
    Malformed,
    Missing,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ReturnCallback {
    pub fn classify(&self) -> CallbackKind {
        let token = present(&self.token_ws);
        let buy_order = present(&self.tbk_buy_order).map(str::to_string);

        if present(&self.tbk_token).is_some() {
            return CallbackKind::Cancelled { buy_order };
        }
        match token {
            Some(token) if gateway::is_well_formed_token(token) => CallbackKind::Confirmation {
                token: token.to_string(),
            },
            Some(_) => CallbackKind::Malformed,
            None if buy_order.is_some() => CallbackKind::Cancelled { buy_order },
            None => CallbackKind::Missing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus {
    Authorized,
    Rejected,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AlreadyProcessedOrUnknown,
    AmountMismatch,
    NotAuthorized,
    GatewayUnavailable,
    MissingToken,
    InvalidToken,
    NoProductsToGrant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOutcome {
    pub success: bool,
    pub status: ReturnStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub buy_order: Option<String>,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

/// Frontend pages the customer lands on after a return.
#[derive(Debug, Clone)]
pub struct CheckoutPages {
    frontend_base_url: String,
}

impl CheckoutPages {
    pub fn new(frontend_base_url: &str) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn page(&self, path: &str, query: Option<(&str, &str)>) -> String {
        match query {
            Some((key, value)) => {
                let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
                format!("{}/checkout/{}?{}={}", self.frontend_base_url, path, key, encoded)
            }
            None => format!("{}/checkout/{}", self.frontend_base_url, path),
        }
    }

    pub fn success(&self, buy_order: &str) -> String {
        self.page("success", Some(("buyOrder", buy_order)))
    }

    pub fn rejected(&self, buy_order: Option<&str>) -> String {
        self.page("rejected", buy_order.map(|b| ("buyOrder", b)))
    }

    pub fn cancelled(&self) -> String {
        self.page("cancelled", None)
    }

    pub fn error(&self) -> String {
        self.page("error", None)
    }

    /// Page that posts the confirmation token back to the API.
    pub fn confirm(&self, token: &str) -> String {
        self.page("return", Some(("token_ws", token)))
    }
}

pub struct ReturnReconciler {
    transactions: Arc<dyn TransactionRepository>,
    carts: Arc<dyn CartRepository>,
    gateway: Arc<dyn PaymentGateway>,
    side_effects: SideEffectDispatcher,
    pages: CheckoutPages,
}

impl ReturnReconciler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        carts: Arc<dyn CartRepository>,
        gateway: Arc<dyn PaymentGateway>,
        side_effects: SideEffectDispatcher,
        pages: CheckoutPages,
    ) -> Self {
        Self {
            transactions,
            carts,
            gateway,
            side_effects,
            pages,
        }
    }

    pub fn pages(&self) -> &CheckoutPages {
        &self.pages
    }

    /// Business outcomes (cancelled, rejected, mismatches, repeats) come back
    /// as `Ok`; only store failures are `Err`.
    pub async fn reconcile(&self, callback: &ReturnCallback) -> Result<ReturnOutcome, RepositoryError> {
        match callback.classify() {
            CallbackKind::Cancelled { buy_order } => {
                info!(buy_order = ?buy_order, "Payment cancelled by customer");
                Ok(ReturnOutcome {
                    success: false,
                    status: ReturnStatus::Cancelled,
                    message: "Payment was cancelled".to_string(),
                    amount: None,
                    buy_order,
                    redirect_url: self.pages.cancelled(),
                    reason: None,
                })
            }
            CallbackKind::Missing => {
                warn!("Payment return without a usable token");
                Ok(self.failure(FailureReason::MissingToken, "missing payment token", None, None))
            }
            CallbackKind::Malformed => {
                warn!("Payment return with a malformed token");
                Ok(self.failure(FailureReason::InvalidToken, "invalid payment token", None, None))
            }
            CallbackKind::Confirmation { token } => self.confirm(&token).await,
        }
    }

    async fn confirm(&self, token: &str) -> Result<ReturnOutcome, RepositoryError> {
        let commit = match self.gateway.commit(token).await {
            Ok(commit) => commit,
            Err(e) => {
                error!(error = %e, "Gateway commit failed; transaction left pending");
                return Ok(self.failure(
                    FailureReason::GatewayUnavailable,
                    "could not confirm the payment with the gateway",
                    None,
                    None,
                ));
            }
        };

        if !commit.is_authorized() {
            return self.reject(token, &commit).await;
        }

        let Some(tx) = self.transactions.find_pending_by_token(token).await? else {
            warn!(buy_order = %commit.buy_order, "Authorized return for a transaction that is not pending");
            return Ok(self.failure(
                FailureReason::AlreadyProcessedOrUnknown,
                "transaction already processed or unknown",
                Some(commit.amount),
                Some(commit.buy_order),
            ));
        };

        if commit.amount != tx.total_amount {
            self.transactions
                .transition_from_pending(&tx.id, TransactionStatus::Error)
                .await?;
            error!(
                incident = "amount_mismatch",
                transaction_id = %tx.id,
                expected = tx.total_amount,
                committed = commit.amount,
                "Committed amount does not match the transaction total"
            );
            return Ok(self.failure(
                FailureReason::AmountMismatch,
                "payment amount does not match the order total",
                Some(commit.amount),
                Some(tx.id),
            ));
        }

        if commit.buy_order != tx.id {
            warn!(
                transaction_id = %tx.id,
                committed_buy_order = %commit.buy_order,
                "Committed buy order differs from the stored transaction"
            );
        }

        let items = self.resolve_items(&tx).await?;
        if items.is_empty() {
            self.transactions
                .transition_from_pending(&tx.id, TransactionStatus::Error)
                .await?;
            error!(
                incident = "no_products_to_grant",
                transaction_id = %tx.id,
                amount = tx.total_amount,
                "Authorized payment has no line items and an empty cart"
            );
            return Ok(self.failure(
                FailureReason::NoProductsToGrant,
                "payment was authorized but no products could be granted",
                Some(commit.amount),
                Some(tx.id),
            ));
        }

        let purchases: Vec<NewPurchase> = items
            .iter()
            .map(|item| NewPurchase {
                user_email: tx.customer_email.clone(),
                user_name: tx.customer_name.clone(),
                product_id: item.product_id.clone(),
                amount: item.price,
            })
            .collect();

        match self.transactions.complete(&tx.id, &purchases, Utc::now()).await? {
            Completion::AlreadyProcessed => {
                info!(transaction_id = %tx.id, "Concurrent return already completed this transaction");
                Ok(self.failure(
                    FailureReason::AlreadyProcessedOrUnknown,
                    "transaction already processed or unknown",
                    Some(commit.amount),
                    Some(tx.id),
                ))
            }
            Completion::Completed {
                granted,
                already_owned,
            } => {
                info!(
                    transaction_id = %tx.id,
                    amount = tx.total_amount,
                    granted = granted.len(),
                    already_owned = already_owned.len(),
                    authorization_code = ?commit.authorization_code,
                    "Payment completed"
                );

                self.side_effects.submit(PurchaseConfirmation {
                    transaction_id: tx.id.clone(),
                    customer_email: tx.customer_email.clone(),
                    customer_name: tx.customer_name.clone(),
                    guest_session_id: tx.guest_session_id.clone(),
                    amount: tx.total_amount,
                    product_ids: purchases.into_iter().map(|p| p.product_id).collect(),
                });

                Ok(ReturnOutcome {
                    success: true,
                    status: ReturnStatus::Authorized,
                    message: "Payment completed".to_string(),
                    amount: Some(tx.total_amount),
                    redirect_url: self.pages.success(&tx.id),
                    buy_order: Some(tx.id),
                    reason: None,
                })
            }
        }
    }

    async fn reject(&self, token: &str, commit: &CommitResponse) -> Result<ReturnOutcome, RepositoryError> {
        match self.transactions.find_pending_by_token(token).await? {
            Some(tx) => {
                let moved = self
                    .transactions
                    .transition_from_pending(&tx.id, TransactionStatus::Rejected)
                    .await?;
                if !moved {
                    warn!(transaction_id = %tx.id, "Rejected return raced another delivery");
                }
                info!(
                    transaction_id = %tx.id,
                    gateway_status = %commit.status,
                    response_code = ?commit.response_code,
                    "Payment rejected by gateway"
                );
            }
            None => warn!(
                buy_order = %commit.buy_order,
                gateway_status = %commit.status,
                "Rejected return for a transaction that is not pending"
            ),
        }

        Ok(ReturnOutcome {
            success: false,
            status: ReturnStatus::Rejected,
            message: "Payment was rejected".to_string(),
            amount: Some(commit.amount),
            redirect_url: self.pages.rejected(Some(&commit.buy_order)),
            buy_order: Some(commit.buy_order.clone()),
            reason: Some(FailureReason::NotAuthorized),
        })
    }

    /// Line items recorded at initiation, or the customer's current cart
    /// priced by allocation when none were recorded.
    async fn resolve_items(&self, tx: &Transaction) -> Result<Vec<LineItem>, RepositoryError> {
        let items = self.transactions.line_items(&tx.id).await?;
        if !items.is_empty() {
            return Ok(items);
        }

        let mut seen = HashSet::new();
        let product_ids: Vec<String> = self
            .carts
            .product_ids_for_user(&tx.customer_email)
            .await?
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        warn!(
            transaction_id = %tx.id,
            cart_items = product_ids.len(),
            "No line items recorded; falling back to the customer's cart"
        );

        let now = Utc::now();
        let prices = pricing::allocate(tx.total_amount, product_ids.len());
        Ok(product_ids
            .into_iter()
            .zip(prices)
            .map(|(product_id, price)| LineItem {
                transaction_id: tx.id.clone(),
                product_id,
                price,
                created_at: now,
            })
            .collect())
    }

    fn failure(
        &self,
        reason: FailureReason,
        message: &str,
        amount: Option<i64>,
        buy_order: Option<String>,
    ) -> ReturnOutcome {
        ReturnOutcome {
            success: false,
            status: ReturnStatus::Error,
            message: message.to_string(),
            amount,
            buy_order,
            redirect_url: self.pages.error(),
            reason: Some(reason),
        }
    }
}
