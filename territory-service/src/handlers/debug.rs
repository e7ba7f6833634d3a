//! Local debugging endpoint that simulates a successful subscription
//! checkout without the billing provider. Disabled unless an admin
//! secret is configured.

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use territory_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{CountyStatus, CreateSubscription, CreditReason},
    services::lifecycle::{self, TIER_CREDIT_GRANT},
    utils::ValidatedJson,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct DebugClaimSuccessRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub county_id: Uuid,
    pub offer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DebugClaimSuccessResponse {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub county_status: CountyStatus,
    pub activation_url: String,
}

/// Simulate the outcome of a completed subscription checkout.
pub async fn claim_success(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<DebugClaimSuccessRequest>,
) -> Result<(StatusCode, Json<DebugClaimSuccessResponse>), AppError> {
    require_admin(&state, &headers)?;

    let offer = state
        .db
        .get_offer(payload.offer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Offer not found")))?;

    state
        .db
        .get_county(payload.county_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("County not found")))?;

    let user = lifecycle::ensure_user(&state.db, &payload.email, &payload.name, None).await?;

    let synthetic_event = format!("debug_evt_{}", Uuid::new_v4());
    let subscription = state
        .db
        .create_subscription(&CreateSubscription {
            user_id: user.user_id,
            county_id: payload.county_id,
            offer_id: offer.offer_id,
            provider_subscription_id: Some(format!("debug_sub_{}", Uuid::new_v4())),
            current_period_end: None,
        })
        .await?;

    lifecycle::grant_event_credits(
        &state.db,
        user.user_id,
        TIER_CREDIT_GRANT,
        CreditReason::SubscriptionStart,
        None,
        Some(&synthetic_event),
    )
    .await?;

    let county_status = lifecycle::recompute_county_status(&state.db, payload.county_id).await?;

    let activation_url = super::webhooks::activation_url(
        &state,
        &user.user_id,
        &user.email,
        &user.name,
        user.credits + TIER_CREDIT_GRANT,
    )?;

    tracing::info!(
        subscription_id = %subscription.subscription_id,
        county_id = %payload.county_id,
        "Simulated checkout success"
    );

    Ok((
        StatusCode::CREATED,
        Json(DebugClaimSuccessResponse {
            subscription_id: subscription.subscription_id,
            user_id: user.user_id,
            county_status,
            activation_url,
        }),
    ))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if !state.config.admin.enabled {
        return Err(AppError::NotFound(anyhow::anyhow!("Not found")));
    }

    let provided = headers
        .get("X-Admin-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let expected = state.config.admin.secret.expose_secret();
    let matches: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();
    if !matches {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid admin secret"
        )));
    }

    Ok(())
}
