//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Customer,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Customer => "customer",
            UserType::Admin => "admin",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "admin" => UserType::Admin,
            _ => UserType::Customer,
        }
    }
}

/// Account holder. `credits` is a running balance mutated by
/// increment/decrement alongside ledger appends; `provider_customer_id`
/// deduplicates billing-provider customer creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub credits: i64,
    pub user_type: String,
    pub provider_customer_id: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
