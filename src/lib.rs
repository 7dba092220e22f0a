pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod notifications;
pub mod ports;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::health::DependencyChecker;
use crate::ports::{PurchaseRepository, TransactionRepository};
use crate::services::{DownloadTokenSigner, ReturnReconciler, TransactionInitiator};

#[derive(Clone)]
pub struct AppState {
    pub initiator: Arc<TransactionInitiator>,
    pub reconciler: Arc<ReturnReconciler>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub download_signer: DownloadTokenSigner,
    pub download_base_url: String,
    pub health_checkers: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub start_time: Instant,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payment/initiate", post(handlers::payment::initiate))
        .route(
            "/payment/return",
            post(handlers::payment::payment_return).get(handlers::payment::payment_return_redirect),
        )
        .route("/payment/transactions/:id", get(handlers::payment::get_transaction))
        .route("/downloads/:token", get(handlers::downloads::download))
        .route("/api-docs/openapi.json", get(handlers::docs::openapi_json))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .with_state(state)
}

/// CORS for the storefront frontend. With no configured origins nothing
/// cross-origin is allowed.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(handlers::payment::SESSION_ID_HEADER),
        ])
}
