//! Hosted checkout session creation.
//!
//! Two flows share the billing provider: recurring county subscriptions
//! and one-time auction claim payments. Both return a redirect URL; the
//! actual state change happens later, driven by the provider's webhook.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use territory_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{CountyStatus, CreateAuction, User},
    services::{
        lifecycle,
        listings::parse_external_auction_id,
        metrics::record_checkout_session,
        pricing::{claim_quote, claim_quote_cents},
    },
    utils::ValidatedJson,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SubscriptionCheckoutRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub phone: Option<String>,
    pub county_id: Uuid,
    pub offer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    /// Redirect the browser here to complete payment.
    pub checkout_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClaimCheckoutRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub phone: Option<String>,
    #[validate(url(message = "Invalid auction URL"))]
    pub url: String,
    pub title: Option<String>,
    pub item_count: Option<i32>,
    pub zip_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimCheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
    pub amount: rust_decimal::Decimal,
}

/// Start a subscription checkout for a county offer.
///
/// Guards run here for fast feedback but are advisory only; the webhook
/// path re-derives county status from whatever subscriptions actually
/// activate.
pub async fn subscription_checkout(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SubscriptionCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    tracing::info!(
        county_id = %payload.county_id,
        offer_id = %payload.offer_id,
        "Starting subscription checkout"
    );

    let offer = state
        .db
        .get_offer(payload.offer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Offer not found")))?;

    if !offer.is_active {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Offer is no longer available"
        )));
    }

    let county = state
        .db
        .get_county(payload.county_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("County not found")))?;

    if county.status() == CountyStatus::FullyLocked {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "County is exclusively licensed"
        )));
    }

    if offer.is_exclusive() {
        let active_tiers = state.db.active_subscription_tiers(county.county_id).await?;
        if !active_tiers.is_empty() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "County has active subscriptions and cannot be exclusively licensed"
            )));
        }
    }

    let user = lifecycle::ensure_user(
        &state.db,
        &payload.email,
        &payload.name,
        payload.phone.as_deref(),
    )
    .await?;

    if state
        .db
        .get_active_subscription_for_user_county(user.user_id, county.county_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "You already have an active subscription for this county"
        )));
    }

    let customer_id = ensure_provider_customer(&state, &user).await?;

    let metadata = [
        ("kind", "subscription".to_string()),
        ("user_id", user.user_id.to_string()),
        ("county_id", county.county_id.to_string()),
        ("offer_id", offer.offer_id.to_string()),
    ];

    let session = state
        .billing
        .create_subscription_checkout(&customer_id, &offer.provider_price_id, &metadata)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create checkout session");
            AppError::BadGateway(anyhow::anyhow!("Failed to create checkout session"))
        })?;

    record_checkout_session("subscription");

    tracing::info!(
        session_id = %session.id,
        county_id = %county.county_id,
        "Subscription checkout session created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            session_id: session.id,
            checkout_url: session.url,
        }),
    ))
}

/// Start a one-time payment checkout for an auction claim.
pub async fn claim_checkout(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ClaimCheckoutRequest>,
) -> Result<(StatusCode, Json<ClaimCheckoutResponse>), AppError> {
    let external_id = parse_external_auction_id(&payload.url)?;

    let auction = state
        .db
        .find_or_create_auction(&CreateAuction {
            external_id,
            url: payload.url.clone(),
            title: payload.title.clone(),
            item_count: payload.item_count,
            zip_code: payload.zip_code.clone(),
            is_free_claim: false,
        })
        .await?;

    if state
        .db
        .get_claim_for_auction(auction.auction_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "This auction has already been claimed"
        )));
    }

    let user = lifecycle::ensure_user(
        &state.db,
        &payload.email,
        &payload.name,
        payload.phone.as_deref(),
    )
    .await?;

    let customer_id = ensure_provider_customer(&state, &user).await?;

    let amount_cents = claim_quote_cents(auction.item_count);
    let description = auction
        .title
        .clone()
        .unwrap_or_else(|| format!("Auction claim {}", auction.external_id));

    let metadata = [
        ("kind", "auction_claim".to_string()),
        ("user_id", user.user_id.to_string()),
        ("auction_id", auction.auction_id.to_string()),
    ];

    let session = state
        .billing
        .create_payment_checkout(&customer_id, amount_cents, &description, &metadata)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create claim checkout session");
            AppError::BadGateway(anyhow::anyhow!("Failed to create checkout session"))
        })?;

    record_checkout_session("claim");

    tracing::info!(
        session_id = %session.id,
        auction_id = %auction.auction_id,
        amount_cents = amount_cents,
        "Claim checkout session created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ClaimCheckoutResponse {
            session_id: session.id,
            checkout_url: session.url,
            amount: claim_quote(auction.item_count),
        }),
    ))
}

/// Reuse the stored billing customer or create one and persist its id.
pub(super) async fn ensure_provider_customer(
    state: &AppState,
    user: &User,
) -> Result<String, AppError> {
    if let Some(customer_id) = &user.provider_customer_id {
        return Ok(customer_id.clone());
    }

    let customer = state
        .billing
        .create_customer(&user.email, &user.name)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create billing customer");
            AppError::BadGateway(anyhow::anyhow!("Failed to create billing customer"))
        })?;

    state
        .db
        .set_provider_customer_id(user.user_id, &customer.id)
        .await?;

    Ok(customer.id)
}
