//! Transactional email delivery over SMTP.
//!
//! When SMTP is disabled the mailer logs the message and returns Ok, so
//! webhook processing never depends on a mail relay being reachable.

use crate::config::SmtpConfig;
use anyhow::{anyhow, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use rust_decimal::Decimal;

#[derive(Clone)]
pub struct Mailer {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| anyhow!("Failed to create SMTP relay: {}", e))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    /// Welcome email carrying the one-click activation link into the main
    /// application.
    pub async fn send_activation(&self, to: &str, name: &str, activation_url: &str) -> Result<()> {
        let body = format!(
            "Hi {},\n\n\
             Your territory subscription is active. Click below to set up your \
             account and start receiving listings:\n\n{}\n\n\
             This link expires in 24 hours.\n",
            name, activation_url
        );
        self.send(to, "Your territory is ready", body).await
    }

    /// Sent when a subscription is cancelled.
    pub async fn send_cancellation(&self, to: &str, name: &str, county_name: &str) -> Result<()> {
        let body = format!(
            "Hi {},\n\n\
             Your subscription for {} has been cancelled. Access continues \
             through the end of the current billing period.\n",
            name, county_name
        );
        self.send(to, "Subscription cancelled", body).await
    }

    /// Renewal receipt including the updated credit balance.
    pub async fn send_renewal(
        &self,
        to: &str,
        name: &str,
        county_name: &str,
        credits_granted: i64,
        balance: i64,
    ) -> Result<()> {
        let body = format!(
            "Hi {},\n\n\
             Your subscription for {} has renewed. {} credits were added to \
             your account. Current balance: {} credits.\n",
            name, county_name, credits_granted, balance
        );
        self.send(to, "Subscription renewed", body).await
    }

    /// Dunning notice after a failed renewal charge.
    pub async fn send_payment_failed(&self, to: &str, name: &str, portal_url: &str) -> Result<()> {
        let body = format!(
            "Hi {},\n\n\
             We could not process your latest subscription payment. Please \
             update your payment method to keep your territory:\n\n{}\n",
            name, portal_url
        );
        self.send(to, "Payment failed", body).await
    }

    /// Receipt for a paid auction claim.
    pub async fn send_claim_receipt(
        &self,
        to: &str,
        name: &str,
        auction_title: &str,
        amount: Decimal,
    ) -> Result<()> {
        let body = format!(
            "Hi {},\n\n\
             Your claim on \"{}\" is confirmed. Amount charged: ${}.\n",
            name, auction_title, amount
        );
        self.send(to, "Auction claim confirmed", body).await
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<()> {
        if !self.config.enabled {
            tracing::info!(to = %to, subject = %subject, "SMTP disabled, skipping email");
            return Ok(());
        }

        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| anyhow!("SMTP transport not initialized"))?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| anyhow!("Invalid recipient: {}", e))?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("Failed to build message: {}", e))?;

        transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::info!(to = %to, subject = %subject, "Email sent");

        Ok(())
    }
}
