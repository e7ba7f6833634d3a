//! Billing portal session creation.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use territory_core::error::AppError;
use validator::Validate;

use crate::{utils::ValidatedJson, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct PortalRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Create a billing-portal session so a customer can manage payment
/// methods and cancel subscriptions.
pub async fn create_portal_session(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<PortalRequest>,
) -> Result<Json<PortalResponse>, AppError> {
    let user = state
        .db
        .get_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    let customer_id = user.provider_customer_id.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("User has no billing account yet"))
    })?;

    let session = state
        .billing
        .create_portal_session(&customer_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create portal session");
            AppError::BadGateway(anyhow::anyhow!("Failed to create portal session"))
        })?;

    Ok(Json(PortalResponse {
        portal_url: session.url,
    }))
}
