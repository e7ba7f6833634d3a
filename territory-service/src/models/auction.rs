//! Third-party auction listings and exclusivity claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An external auction listing, keyed by the ID extracted from its URL.
/// First-write-wins on `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Auction {
    pub auction_id: Uuid,
    pub external_id: String,
    pub url: String,
    pub title: Option<String>,
    pub item_count: Option<i32>,
    pub zip_code: Option<String>,
    pub is_free_claim: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering an auction listing.
#[derive(Debug, Clone)]
pub struct CreateAuction {
    pub external_id: String,
    pub url: String,
    pub title: Option<String>,
    pub item_count: Option<i32>,
    pub zip_code: Option<String>,
    pub is_free_claim: bool,
}

/// A one-to-one exclusivity lock between a user and an auction.
///
/// The unique constraint on `auction_id` is the sole arbiter under
/// concurrent claims; a unique violation means someone else won the race.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClaimedAuction {
    pub claim_id: Uuid,
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub created_utc: DateTime<Utc>,
}
