//! Billing provider client.
//!
//! Wraps the hosted-checkout billing provider: checkout-session creation
//! (subscription and one-time payment modes), customer creation,
//! billing-portal sessions and webhook signature verification.

use crate::config::BillingConfig;
use anyhow::{anyhow, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Webhook signatures older than this are rejected as replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Outbound call timeout.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Client for the billing provider's REST API.
#[derive(Clone)]
pub struct BillingClient {
    client: Client,
    config: BillingConfig,
}

/// A hosted checkout session.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect URL for the hosted checkout page.
    pub url: String,
}

/// A billing-provider customer.
#[derive(Debug, Deserialize)]
pub struct Customer {
    pub id: String,
}

/// A billing-portal session.
#[derive(Debug, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

/// Provider API error response.
#[derive(Debug, Deserialize)]
pub struct ProviderError {
    pub error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ProviderErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// An inbound webhook event. The entity under `data.object` is decoded
/// lazily per event type.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

/// Checkout session entity carried by `checkout.session.completed`.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    /// "subscription" or "payment".
    pub mode: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

/// Subscription entity carried by `customer.subscription.*` events.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    pub current_period_end: Option<i64>,
}

/// Invoice entity carried by `invoice.payment_*` events.
#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub period_end: Option<i64>,
}

impl WebhookEvent {
    pub fn checkout_session(&self) -> Result<CheckoutSessionObject> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| anyhow!("Malformed checkout session payload: {}", e))
    }

    pub fn subscription(&self) -> Result<SubscriptionObject> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| anyhow!("Malformed subscription payload: {}", e))
    }

    pub fn invoice(&self) -> Result<InvoiceObject> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| anyhow!("Malformed invoice payload: {}", e))
    }
}

impl BillingClient {
    /// Create a new billing client.
    pub fn new(config: BillingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Check if the provider is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Create a customer, returning the provider's customer id.
    pub async fn create_customer(&self, email: &str, name: &str) -> Result<Customer> {
        self.post_form(
            "/v1/customers",
            vec![
                ("email".to_string(), email.to_string()),
                ("name".to_string(), name.to_string()),
            ],
        )
        .await
    }

    /// Create a subscription-mode checkout session for a county offer.
    pub async fn create_subscription_checkout(
        &self,
        customer_id: &str,
        price_id: &str,
        metadata: &[(&str, String)],
    ) -> Result<CheckoutSession> {
        let mut params = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }
        self.post_form("/v1/checkout/sessions", params).await
    }

    /// Create a one-time payment checkout session for an auction claim.
    pub async fn create_payment_checkout(
        &self,
        customer_id: &str,
        amount_cents: i64,
        description: &str,
        metadata: &[(&str, String)],
    ) -> Result<CheckoutSession> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                "usd".to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                description.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }
        self.post_form("/v1/checkout/sessions", params).await
    }

    /// Create a billing-portal session so the customer can fix a failing
    /// payment method.
    pub async fn create_portal_session(&self, customer_id: &str) -> Result<PortalSession> {
        self.post_form(
            "/v1/billing_portal/sessions",
            vec![
                ("customer".to_string(), customer_id.to_string()),
                ("return_url".to_string(), self.config.success_url.clone()),
            ],
        )
        .await
    }

    /// Verify a webhook signature header of the form `t=<ts>,v1=<hex>`.
    ///
    /// The signature is HMAC-SHA256 over `"{t}.{body}"` with the webhook
    /// secret; timestamps outside the tolerance window are rejected to stop
    /// replays.
    pub fn verify_webhook_signature(&self, body: &[u8], header: &str) -> Result<bool> {
        let mut timestamp: Option<i64> = None;
        let mut signature: Option<&str> = None;
        for part in header.split(',') {
            if let Some(value) = part.trim().strip_prefix("t=") {
                timestamp = value.parse().ok();
            } else if let Some(value) = part.trim().strip_prefix("v1=") {
                signature = Some(value);
            }
        }

        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(s)) => (t, s),
            _ => return Ok(false),
        };

        if (Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!("Webhook signature timestamp outside tolerance");
            return Ok(false);
        }

        let mut signed_payload = timestamp.to_string().into_bytes();
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(body);

        let expected = self.compute_signature(
            &signed_payload,
            self.config.webhook_secret.expose_secret(),
        )?;

        let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        if !matches {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(matches)
    }

    /// Parse a webhook event from the raw request body.
    pub fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent> {
        let event: WebhookEvent = serde_json::from_slice(body)?;
        Ok(event)
    }

    /// Compute HMAC-SHA256 over a payload, hex-encoded.
    fn compute_signature(&self, payload: &[u8], secret: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(payload);
        let result = mac.finalize();
        Ok(hex::encode(result.into_bytes()))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<T> {
        if !self.is_configured() {
            return Err(anyhow!("Billing provider credentials not configured"));
        }

        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, path = path, "Billing provider response");

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            let error: ProviderError = serde_json::from_str(&body).unwrap_or_else(|_| {
                ProviderError {
                    error: ProviderErrorDetail {
                        code: Some("UNKNOWN".to_string()),
                        message: body.clone(),
                    },
                }
            });
            tracing::error!(
                code = ?error.error.code,
                message = %error.error.message,
                path = path,
                "Billing provider call failed"
            );
            Err(anyhow!("Billing provider error: {}", error.error.message))
        }
    }
}
