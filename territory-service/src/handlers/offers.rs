//! Subscription offer listing.

use axum::{extract::State, Json};
use serde::Serialize;
use territory_core::error::AppError;
use uuid::Uuid;

use crate::{models::Offer, AppState};

#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub offer_id: Uuid,
    pub name: String,
    pub tier_level: i16,
    pub monthly_price: rust_decimal::Decimal,
    /// Tier 3 locks the county exclusively.
    pub is_exclusive: bool,
}

impl From<Offer> for OfferResponse {
    fn from(o: Offer) -> Self {
        let is_exclusive = o.is_exclusive();
        Self {
            offer_id: o.offer_id,
            name: o.name,
            tier_level: o.tier_level,
            monthly_price: o.monthly_price,
            is_exclusive,
        }
    }
}

pub async fn list_offers(State(state): State<AppState>) -> Result<Json<Vec<OfferResponse>>, AppError> {
    let offers = state.db.list_offers().await?;
    Ok(Json(offers.into_iter().map(OfferResponse::from).collect()))
}
