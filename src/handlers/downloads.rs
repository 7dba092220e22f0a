use axum::{
    extract::{Path, State},
    response::Redirect,
};
use chrono::Utc;

use crate::error::AppError;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/downloads/{token}",
    params(("token" = String, Path, description = "Signed download token from the confirmation email")),
    responses(
        (status = 303, description = "Redirect to the file"),
        (status = 401, description = "Token invalid or expired"),
        (status = 403, description = "No completed purchase for this product")
    ),
    tag = "Downloads"
)]
pub async fn download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Redirect, AppError> {
    let claims = state
        .download_signer
        .verify(&token, Utc::now())
        .map_err(|e| {
            tracing::debug!(error = %e, "Download token rejected");
            AppError::Unauthorized("download link is invalid or expired".to_string())
        })?;

    if !state
        .purchases
        .has_completed(&claims.email, &claims.product_id)
        .await?
    {
        tracing::warn!(product_id = %claims.product_id, "Download attempted without a purchase");
        return Err(AppError::Forbidden("product was not purchased".to_string()));
    }

    Ok(Redirect::to(&format!(
        "{}/{}",
        state.download_base_url, claims.product_id
    )))
}
