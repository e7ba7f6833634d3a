//! Pricing tiers offered for county subscriptions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Basic / Rural.
pub const TIER_BASIC: i16 = 1;
/// Plus / Suburban.
pub const TIER_PLUS: i16 = 2;
/// Pro / Urban. Grants exclusive (fully locked) rights over a county.
pub const TIER_PRO: i16 = 3;

/// A pricing tier linked to the billing provider's product and price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub offer_id: Uuid,
    pub name: String,
    pub tier_level: i16,
    pub monthly_price: Decimal,
    pub provider_product_id: String,
    pub provider_price_id: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl Offer {
    /// Pro subscriptions lock the county exclusively.
    pub fn is_exclusive(&self) -> bool {
        self.tier_level >= TIER_PRO
    }
}
