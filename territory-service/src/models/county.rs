//! Geographic models: states and counties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Availability of a county for new licensing.
///
/// The column on `counties` is a cache of the derivation rule in
/// `services::lifecycle`; only `recompute_county_status` writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountyStatus {
    Available,
    PartiallyLocked,
    FullyLocked,
}

impl CountyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountyStatus::Available => "available",
            CountyStatus::PartiallyLocked => "partially_locked",
            CountyStatus::FullyLocked => "fully_locked",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_locked" => CountyStatus::PartiallyLocked,
            "fully_locked" => CountyStatus::FullyLocked,
            _ => CountyStatus::Available,
        }
    }
}

/// US state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct State {
    pub state_id: Uuid,
    pub name: String,
    pub code: String,
}

/// US county, the unit of territory licensing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct County {
    pub county_id: Uuid,
    pub state_id: Uuid,
    pub name: String,
    pub population: i64,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl County {
    pub fn status(&self) -> CountyStatus {
        CountyStatus::from_string(&self.status)
    }
}
