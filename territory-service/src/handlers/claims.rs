//! Free auction claims and claim price quotes.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use territory_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{CreateAuction, CreditReason},
    services::{
        lifecycle::{self, SIGNUP_BONUS_CREDITS},
        listings::parse_external_auction_id,
        metrics::record_auction_claim,
        pricing::claim_quote,
    },
    utils::ValidatedJson,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(url(message = "Invalid auction URL"))]
    pub url: String,
    pub item_count: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub external_id: String,
    pub amount: rust_decimal::Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FreeClaimRequest {
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
pub struct FreeClaimResponse {
    pub claim_id: Uuid,
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub credits_granted: i64,
}

/// Quote the claim price for an auction URL without creating anything.
pub async fn quote(
    ValidatedJson(payload): ValidatedJson<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let external_id = parse_external_auction_id(&payload.url)?;

    Ok(Json(QuoteResponse {
        external_id,
        amount: claim_quote(payload.item_count),
    }))
}

/// Claim an auction under the free promotion.
///
/// The unique constraint on `claimed_auctions.auction_id` decides the
/// winner under concurrent claims; the loser gets a conflict.
pub async fn free_claim(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<FreeClaimRequest>,
) -> Result<(StatusCode, Json<FreeClaimResponse>), AppError> {
    let external_id = parse_external_auction_id(&payload.url)?;

    let auction = state
        .db
        .find_or_create_auction(&CreateAuction {
            external_id,
            url: payload.url.clone(),
            title: payload.title.clone(),
            item_count: payload.item_count,
            zip_code: payload.zip_code.clone(),
            is_free_claim: true,
        })
        .await?;

    let user = lifecycle::ensure_user(
        &state.db,
        &payload.email,
        &payload.name,
        payload.phone.as_deref(),
    )
    .await?;

    let claim = match state
        .db
        .create_claimed_auction(auction.auction_id, user.user_id)
        .await
    {
        Ok(claim) => claim,
        Err(e) => {
            record_auction_claim("conflict");
            return Err(e);
        }
    };

    record_auction_claim("won");

    // No upstream event id for free claims; the claim row gates reentry.
    lifecycle::grant_event_credits(
        &state.db,
        user.user_id,
        SIGNUP_BONUS_CREDITS,
        CreditReason::SignupBonus,
        Some(auction.auction_id),
        None,
    )
    .await?;

    tracing::info!(
        claim_id = %claim.claim_id,
        auction_id = %auction.auction_id,
        user_id = %user.user_id,
        "Free auction claim recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(FreeClaimResponse {
            claim_id: claim.claim_id,
            auction_id: auction.auction_id,
            user_id: user.user_id,
            credits_granted: SIGNUP_BONUS_CREDITS,
        }),
    ))
}
