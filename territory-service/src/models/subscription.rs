//! Subscription model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status, mirrored from the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Cancelled,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "past_due" => SubscriptionStatus::PastDue,
            "cancelled" => SubscriptionStatus::Cancelled,
            "inactive" => SubscriptionStatus::Inactive,
            _ => SubscriptionStatus::Active,
        }
    }

    /// Map the billing provider's subscription status string onto ours.
    /// Anything the provider does not report as `active` is inactive here;
    /// `past_due` and `canceled` keep their meaning.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Inactive,
        }
    }
}

/// A user's subscription to a county at a given offer tier.
///
/// Rows are never hard-deleted; cancellation and lapse are status
/// transitions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub county_id: Uuid,
    pub offer_id: Uuid,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }
}

/// Input for creating a subscription when a checkout completes.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: Uuid,
    pub county_id: Uuid,
    pub offer_id: Uuid,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}
