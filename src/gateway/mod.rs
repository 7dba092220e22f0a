//! Payment gateway boundary.
//!
//! The core only needs two calls: `create` opens a payment session the
//! customer is redirected to, `commit` confirms it after the redirect back
//! and is the authoritative source for the authorization status and amount.

pub mod webpay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use webpay::WebpayClient;

/// Commit status reported for an authorized payment.
pub const AUTHORIZED: &str = "AUTHORIZED";

/// Smallest amount the gateway accepts for a transaction.
pub const MIN_TRANSACTABLE_AMOUNT: i64 = 50;

const MAX_TOKEN_LEN: usize = 128;

/// Session tokens are placed in the commit URL path, so only plain
/// identifier characters are accepted.
pub fn is_well_formed_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
    #[error("Malformed session token")]
    InvalidToken,
}

impl GatewayError {
    /// Whether the failure says something about gateway health (as opposed to
    /// a request the gateway understood and refused).
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::RequestError(_) | GatewayError::CircuitBreakerOpen(_) => true,
            GatewayError::Status { status, .. } => *status >= 500,
            GatewayError::InvalidResponse(_) | GatewayError::InvalidToken => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
    pub buy_order: String,
    pub session_id: String,
    pub amount: i64,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateResponse {
    pub token: String,
    pub url: String,
}

/// Result of confirming a session. Only the fields the core relies on are
/// required; the rest are kept for logging.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitResponse {
    pub status: String,
    #[serde(default)]
    pub response_code: Option<i64>,
    pub amount: i64,
    pub buy_order: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub authorization_code: Option<String>,
    #[serde(default)]
    pub payment_type_code: Option<String>,
}

impl CommitResponse {
    pub fn is_authorized(&self) -> bool {
        self.status == AUTHORIZED && self.response_code == Some(0)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create(&self, request: &CreateRequest) -> Result<CreateResponse, GatewayError>;

    async fn commit(&self, token: &str) -> Result<CommitResponse, GatewayError>;
}
