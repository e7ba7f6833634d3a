//! Trial registrations. At most one per county, enforced by a unique
//! constraint on `trial_registrations.county_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Active,
    Expired,
    Converted,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Active => "active",
            TrialStatus::Expired => "expired",
            TrialStatus::Converted => "converted",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "expired" => TrialStatus::Expired,
            "converted" => TrialStatus::Converted,
            _ => TrialStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrialRegistration {
    pub trial_id: Uuid,
    pub county_id: Uuid,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl TrialRegistration {
    pub fn status(&self) -> TrialStatus {
        TrialStatus::from_string(&self.status)
    }
}
