//! Append-only credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Why a credit grant was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    SignupBonus,
    SubscriptionStart,
    SubscriptionRenewal,
}

impl CreditReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditReason::SignupBonus => "signup_bonus",
            CreditReason::SubscriptionStart => "subscription_start",
            CreditReason::SubscriptionRenewal => "subscription_renewal",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "subscription_start" => CreditReason::SubscriptionStart,
            "subscription_renewal" => CreditReason::SubscriptionRenewal,
            _ => CreditReason::SignupBonus,
        }
    }
}

/// A single ledger row. Never mutated after creation.
///
/// `provider_event_id` carries the upstream webhook event id and is unique,
/// making grants idempotent under duplicate deliveries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub auction_id: Option<Uuid>,
    pub provider_event_id: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn reason(&self) -> CreditReason {
        CreditReason::from_string(&self.reason)
    }
}
