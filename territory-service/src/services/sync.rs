//! Outbound account provisioning to the main application.
//!
//! After a subscription activates we push the user's profile so the account
//! exists before they follow the activation link. Failures are logged and
//! swallowed: the activation token alone is enough for the main app to
//! create the account on first visit.

use crate::config::SyncConfig;
use anyhow::Result;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct MainAppSync {
    client: Client,
    config: SyncConfig,
}

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    user_id: Uuid,
    email: &'a str,
    name: &'a str,
    credits: i64,
}

impl MainAppSync {
    pub fn new(config: SyncConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.base_url.is_empty()
    }

    /// Push a provisioning record. Returns Ok(false) when sync is disabled
    /// or the call fails; the webhook flow continues either way.
    pub async fn provision_user(
        &self,
        user_id: Uuid,
        email: &str,
        name: &str,
        credits: i64,
    ) -> Result<bool> {
        if !self.is_enabled() {
            tracing::debug!("Main app sync disabled, skipping provisioning");
            return Ok(false);
        }

        let url = format!("{}/api/internal/provision", self.config.base_url);
        let request = ProvisionRequest {
            user_id,
            email,
            name,
            credits,
        };

        let result = self
            .client
            .post(&url)
            .header("X-Sync-Secret", self.config.shared_secret.expose_secret())
            .json(&request)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(user_id = %user_id, "Provisioned user in main app");
                Ok(true)
            }
            Ok(response) => {
                tracing::warn!(
                    user_id = %user_id,
                    status = %response.status(),
                    "Main app provisioning rejected"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Main app provisioning failed");
                Ok(false)
            }
        }
    }
}
