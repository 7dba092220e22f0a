use axum::Json;
use utoipa::OpenApi;

use crate::domain::TransactionStatus;
use crate::handlers::payment::{
    InitiatePaymentRequest, InitiatePaymentResponse, TransactionStatusResponse,
};
use crate::health::HealthResponse;
use crate::services::reconciler::{FailureReason, ReturnCallback, ReturnOutcome, ReturnStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::payment::initiate,
        crate::handlers::payment::payment_return,
        crate::handlers::payment::payment_return_redirect,
        crate::handlers::payment::get_transaction,
        crate::handlers::downloads::download,
    ),
    components(schemas(
        InitiatePaymentRequest,
        InitiatePaymentResponse,
        TransactionStatusResponse,
        TransactionStatus,
        ReturnCallback,
        ReturnOutcome,
        ReturnStatus,
        FailureReason,
        HealthResponse,
    )),
    tags(
        (name = "Payments", description = "Checkout initiation and gateway returns"),
        (name = "Downloads", description = "Signed download links"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
