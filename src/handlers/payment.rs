use axum::{
    async_trait,
    body::HttpBody,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, Request},
    response::Redirect,
    BoxError, Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::services::reconciler::CallbackKind;
use crate::services::{InitiateInput, ReturnCallback, ReturnOutcome};
use crate::AppState;

/// Set by the upstream auth layer for signed-in customers.
pub const AUTHENTICATED_EMAIL_HEADER: &str = "x-authenticated-email";
/// Browser session that owns the guest cart.
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub customer_email: String,
    pub customer_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub redirect_url: String,
    pub token: String,
    pub transaction_id: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[utoipa::path(
    post,
    path = "/payment/initiate",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Gateway session opened", body = InitiatePaymentResponse),
        (status = 400, description = "Invalid or malformed selection or customer data"),
        (status = 502, description = "Payment gateway failure"),
        (status = 500, description = "Transaction could not be stored")
    ),
    tag = "Payments"
)]
pub async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<InitiatePaymentResponse>, AppError> {
    // Shape errors (missing or mistyped fields) are validation failures too.
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let customer_email =
        header_value(&headers, AUTHENTICATED_EMAIL_HEADER).unwrap_or(payload.customer_email);

    let output = state
        .initiator
        .initiate(InitiateInput {
            product_ids: payload.product_ids,
            customer_email,
            customer_name: payload.customer_name,
            guest_session_id: header_value(&headers, SESSION_ID_HEADER),
        })
        .await?;

    Ok(Json(InitiatePaymentResponse {
        redirect_url: output.redirect_url,
        token: output.token,
        transaction_id: output.transaction_id,
        amount: output.amount,
    }))
}

/// Return parameters posted either as JSON by the frontend or as a form by
/// the gateway itself.
pub struct CallbackBody(pub ReturnCallback);

#[async_trait]
impl<S, B> FromRequest<S, B> for CallbackBody
where
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        let callback = if is_json {
            let Json(callback) = Json::<ReturnCallback>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            callback
        } else {
            let Form(callback) = Form::<ReturnCallback>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            callback
        };

        Ok(CallbackBody(callback))
    }
}

#[utoipa::path(
    post,
    path = "/payment/return",
    request_body(content = ReturnCallback, content_type = "application/json"),
    responses(
        (status = 200, description = "Reconciliation outcome, including business failures", body = ReturnOutcome),
        (status = 400, description = "Unreadable body"),
        (status = 500, description = "Store failure")
    ),
    tag = "Payments"
)]
pub async fn payment_return(
    State(state): State<AppState>,
    CallbackBody(callback): CallbackBody,
) -> Result<Json<ReturnOutcome>, AppError> {
    let outcome = state.reconciler.reconcile(&callback).await?;
    Ok(Json(outcome))
}

/// Browser landing point. Never mutates anything: confirmations are handed
/// to the frontend, which posts them back.
#[utoipa::path(
    get,
    path = "/payment/return",
    params(
        ("token_ws" = Option<String>, Query, description = "Gateway session token"),
        ("TBK_TOKEN" = Option<String>, Query, description = "Present when the customer aborted"),
        ("TBK_ORDEN_COMPRA" = Option<String>, Query, description = "Buy order of an aborted or timed-out session")
    ),
    responses(
        (status = 303, description = "Redirect to the matching frontend page")
    ),
    tag = "Payments"
)]
pub async fn payment_return_redirect(
    State(state): State<AppState>,
    Query(callback): Query<ReturnCallback>,
) -> Redirect {
    let pages = state.reconciler.pages();
    let target = match callback.classify() {
        CallbackKind::Confirmation { token } => pages.confirm(&token),
        CallbackKind::Cancelled { .. } => pages.cancelled(),
        CallbackKind::Malformed | CallbackKind::Missing => pages.error(),
    };
    Redirect::to(&target)
}

#[utoipa::path(
    get,
    path = "/payment/transactions/{id}",
    params(("id" = String, Path, description = "Transaction id (buy order)")),
    responses(
        (status = 200, description = "Transaction status", body = TransactionStatusResponse),
        (status = 404, description = "Unknown transaction")
    ),
    tag = "Payments"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransactionStatusResponse>, AppError> {
    let tx = state.transactions.get_by_id(&id).await?;

    Ok(Json(TransactionStatusResponse {
        transaction_id: tx.id,
        status: tx.status,
        amount: tx.total_amount,
        created_at: tx.created_at,
        completed_at: tx.completed_at,
    }))
}
