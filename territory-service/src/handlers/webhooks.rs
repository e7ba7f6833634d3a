//! Billing provider webhook handler.
//!
//! The webhook is the source of truth for subscription and payment state.
//! Every event that touches a county ends with a full status recompute,
//! and credit grants are keyed on the provider event id so redelivery
//! never double-credits.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use territory_core::error::AppError;
use territory_core::token::generate_activation_token;
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::{
    models::{CreateSubscription, CreditReason, SubscriptionStatus},
    services::{
        billing::{CheckoutSessionObject, WebhookEvent},
        lifecycle::{self, TIER_CREDIT_GRANT, SIGNUP_BONUS_CREDITS},
        metrics::{record_auction_claim, record_error, record_webhook_event},
        pricing::claim_quote,
    },
    AppState,
};

/// Receive and process a billing provider webhook.
///
/// Returns 200 with `{"received": true}` for every verified event,
/// including event types we do not handle, so the provider stops
/// retrying.
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("Billing-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing Billing-Signature header");
            AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
        })?;

    let is_valid = state
        .billing
        .verify_webhook_signature(body.as_bytes(), signature)
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook signature verification error");
            AppError::InternalError(anyhow::anyhow!("Webhook verification failed"))
        })?;

    if !is_valid {
        record_webhook_event("unknown", "rejected");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = state
        .billing
        .parse_webhook_event(body.as_bytes())
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to parse webhook event");
            AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
        })?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Processing billing webhook"
    );

    let outcome = match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, &event).await,
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_updated(&state, &event).await
        }
        "customer.subscription.deleted" => handle_subscription_deleted(&state, &event).await,
        "invoice.payment_succeeded" => handle_invoice_paid(&state, &event).await,
        "invoice.payment_failed" => handle_invoice_failed(&state, &event).await,
        other => {
            tracing::debug!(event_type = %other, "Unhandled webhook event type");
            Ok(())
        }
    };

    match outcome {
        Ok(()) => record_webhook_event(&event.event_type, "processed"),
        Err(ref e) => {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Webhook processing failed"
            );
            record_webhook_event(&event.event_type, "failed");
            record_error("webhook_processing", &event.event_type);
        }
    }

    // Errors surface via the 5xx so the provider redelivers.
    outcome?;

    Ok(Json(json!({ "received": true })))
}

async fn handle_checkout_completed(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let session = event
        .checkout_session()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    match session.mode.as_str() {
        "subscription" => handle_subscription_purchase(state, event, &session).await,
        "payment" => handle_claim_payment(state, event, &session).await,
        other => {
            tracing::warn!(mode = %other, "Unknown checkout session mode");
            Ok(())
        }
    }
}

/// A subscription checkout completed: record the subscription, grant the
/// starting credits, lock the county, and hand the user off to the main
/// application.
async fn handle_subscription_purchase(
    state: &AppState,
    event: &WebhookEvent,
    session: &CheckoutSessionObject,
) -> Result<(), AppError> {
    let user_id = metadata_uuid(session, "user_id")?;
    let county_id = metadata_uuid(session, "county_id")?;
    let offer_id = metadata_uuid(session, "offer_id")?;

    let provider_subscription_id = session.subscription.clone().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Subscription-mode session without subscription id"
        ))
    })?;

    // A redelivered event may find the subscription row already committed
    // by an earlier attempt. Reuse it and still run the grant and the
    // status recompute, both of which tolerate repeats.
    let existing = state
        .db
        .get_subscription_by_provider_id(&provider_subscription_id)
        .await?;
    let subscription = match existing {
        Some(subscription) => {
            tracing::info!(
                provider_subscription_id = %provider_subscription_id,
                "Subscription already recorded"
            );
            subscription
        }
        None => {
            state
                .db
                .create_subscription(&CreateSubscription {
                    user_id,
                    county_id,
                    offer_id,
                    provider_subscription_id: Some(provider_subscription_id.clone()),
                    current_period_end: None,
                })
                .await?
        }
    };

    let granted = lifecycle::grant_event_credits(
        &state.db,
        user_id,
        TIER_CREDIT_GRANT,
        CreditReason::SubscriptionStart,
        None,
        Some(&event.id),
    )
    .await?;

    let status = lifecycle::recompute_county_status(&state.db, county_id).await?;

    tracing::info!(
        subscription_id = %subscription.subscription_id,
        county_id = %county_id,
        county_status = %status.as_str(),
        "Subscription activated"
    );

    // A fully processed redelivery grants nothing; the handoff already
    // happened, so do not provision or mail again.
    if !granted {
        return Ok(());
    }

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    // Provisioning and email are best effort; the webhook already
    // committed the state change.
    if let Err(e) = state
        .sync
        .provision_user(user.user_id, &user.email, &user.name, user.credits)
        .await
    {
        tracing::warn!(error = %e, "Main app provisioning errored");
    }

    match activation_url(state, &user.user_id, &user.email, &user.name, user.credits) {
        Ok(url) => {
            if let Err(e) = state.mailer.send_activation(&user.email, &user.name, &url).await {
                tracing::warn!(error = %e, "Failed to send activation email");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to mint activation token"),
    }

    Ok(())
}

/// A one-time claim payment completed: record the claim and grant the
/// bonus credits.
async fn handle_claim_payment(
    state: &AppState,
    event: &WebhookEvent,
    session: &CheckoutSessionObject,
) -> Result<(), AppError> {
    if session.metadata.get("kind").map(String::as_str) != Some("auction_claim") {
        tracing::debug!(session_id = %session.id, "Payment session without claim metadata");
        return Ok(());
    }

    let user_id = metadata_uuid(session, "user_id")?;
    let auction_id = metadata_uuid(session, "auction_id")?;

    match state.db.create_claimed_auction(auction_id, user_id).await {
        Ok(claim) => {
            record_auction_claim("won");
            tracing::info!(claim_id = %claim.claim_id, auction_id = %auction_id, "Paid claim recorded");
        }
        Err(AppError::Conflict(_)) => {
            // Redelivery, or the buyer lost a race after paying. Either
            // way the claim table already holds the answer.
            record_auction_claim("conflict");
            tracing::warn!(auction_id = %auction_id, "Claim already exists, skipping insert");
        }
        Err(e) => return Err(e),
    }

    lifecycle::grant_event_credits(
        &state.db,
        user_id,
        SIGNUP_BONUS_CREDITS,
        CreditReason::SignupBonus,
        Some(auction_id),
        Some(&event.id),
    )
    .await?;

    if let Some(user) = state.db.get_user(user_id).await? {
        if let Some(auction) = state.db.get_auction(auction_id).await? {
            let title = auction
                .title
                .clone()
                .unwrap_or_else(|| auction.external_id.clone());
            let amount = claim_quote(auction.item_count);
            if let Err(e) = state
                .mailer
                .send_claim_receipt(&user.email, &user.name, &title, amount)
                .await
            {
                tracing::warn!(error = %e, "Failed to send claim receipt");
            }
        }
    }

    Ok(())
}

/// Provider pushed a subscription status change.
async fn handle_subscription_updated(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(), AppError> {
    let object = event
        .subscription()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let status = SubscriptionStatus::from_provider(&object.status);

    let Some(subscription) = state.db.get_subscription_by_provider_id(&object.id).await? else {
        // subscription.created usually lands before our checkout handler
        // creates the local row; updated events for unknown ids are stale.
        tracing::debug!(provider_subscription_id = %object.id, "No local subscription for event");
        return Ok(());
    };

    if subscription.status() == status {
        return Ok(());
    }

    state
        .db
        .update_subscription_status(subscription.subscription_id, status)
        .await?;

    let county_status =
        lifecycle::recompute_county_status(&state.db, subscription.county_id).await?;

    tracing::info!(
        subscription_id = %subscription.subscription_id,
        status = %status.as_str(),
        county_status = %county_status.as_str(),
        "Subscription status updated from provider"
    );

    if status == SubscriptionStatus::Cancelled {
        send_cancellation_email(state, &subscription.user_id, subscription.county_id).await;
    }

    Ok(())
}

/// Provider deleted the subscription: treat as a cancellation.
async fn handle_subscription_deleted(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(), AppError> {
    let object = event
        .subscription()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let Some(subscription) = state.db.get_subscription_by_provider_id(&object.id).await? else {
        tracing::debug!(provider_subscription_id = %object.id, "No local subscription for event");
        return Ok(());
    };

    if subscription.status() != SubscriptionStatus::Cancelled {
        state
            .db
            .update_subscription_status(subscription.subscription_id, SubscriptionStatus::Cancelled)
            .await?;
    }

    let county_status =
        lifecycle::recompute_county_status(&state.db, subscription.county_id).await?;

    tracing::info!(
        subscription_id = %subscription.subscription_id,
        county_status = %county_status.as_str(),
        "Subscription cancelled"
    );

    send_cancellation_email(state, &subscription.user_id, subscription.county_id).await;

    Ok(())
}

/// A renewal invoice was paid: extend the period and grant renewal
/// credits, keyed on the invoice event so redelivery is a no-op.
async fn handle_invoice_paid(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let invoice = event
        .invoice()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let Some(provider_subscription_id) = invoice.subscription else {
        tracing::debug!(invoice_id = %invoice.id, "Invoice without subscription, ignoring");
        return Ok(());
    };

    let period_end = invoice.period_end.map(to_datetime).unwrap_or_else(Utc::now);

    let Some(subscription) = state
        .db
        .renew_subscription(&provider_subscription_id, period_end)
        .await?
    else {
        tracing::debug!(
            provider_subscription_id = %provider_subscription_id,
            "No local subscription for paid invoice"
        );
        return Ok(());
    };

    let granted = lifecycle::grant_event_credits(
        &state.db,
        subscription.user_id,
        TIER_CREDIT_GRANT,
        CreditReason::SubscriptionRenewal,
        None,
        Some(&event.id),
    )
    .await?;

    lifecycle::recompute_county_status(&state.db, subscription.county_id).await?;

    tracing::info!(
        subscription_id = %subscription.subscription_id,
        credits_granted = granted,
        "Subscription renewed"
    );

    if granted {
        if let Some(user) = state.db.get_user(subscription.user_id).await? {
            let county_name = state
                .db
                .get_county(subscription.county_id)
                .await?
                .map(|c| c.name)
                .unwrap_or_else(|| "your county".to_string());
            let balance = state.db.get_credit_balance(user.user_id).await?;
            if let Err(e) = state
                .mailer
                .send_renewal(&user.email, &user.name, &county_name, TIER_CREDIT_GRANT, balance)
                .await
            {
                tracing::warn!(error = %e, "Failed to send renewal email");
            }
        }
    }

    Ok(())
}

/// A renewal charge failed: mark past due and point the user at the
/// billing portal.
async fn handle_invoice_failed(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let invoice = event
        .invoice()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let Some(provider_subscription_id) = invoice.subscription else {
        tracing::debug!(invoice_id = %invoice.id, "Invoice without subscription, ignoring");
        return Ok(());
    };

    let Some(subscription) = state
        .db
        .get_subscription_by_provider_id(&provider_subscription_id)
        .await?
    else {
        tracing::debug!(
            provider_subscription_id = %provider_subscription_id,
            "No local subscription for failed invoice"
        );
        return Ok(());
    };

    state
        .db
        .update_subscription_status(subscription.subscription_id, SubscriptionStatus::PastDue)
        .await?;

    let county_status =
        lifecycle::recompute_county_status(&state.db, subscription.county_id).await?;

    tracing::warn!(
        subscription_id = %subscription.subscription_id,
        county_status = %county_status.as_str(),
        "Subscription past due after failed payment"
    );

    if let Some(user) = state.db.get_user(subscription.user_id).await? {
        if let Some(customer_id) = &user.provider_customer_id {
            match state.billing.create_portal_session(customer_id).await {
                Ok(session) => {
                    if let Err(e) = state
                        .mailer
                        .send_payment_failed(&user.email, &user.name, &session.url)
                        .await
                    {
                        tracing::warn!(error = %e, "Failed to send payment-failed email");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to create dunning portal session"),
            }
        }
    }

    Ok(())
}

async fn send_cancellation_email(state: &AppState, user_id: &Uuid, county_id: Uuid) {
    let user = match state.db.get_user(*user_id).await {
        Ok(Some(user)) => user,
        _ => return,
    };
    let county_name = match state.db.get_county(county_id).await {
        Ok(Some(county)) => county.name,
        _ => "your county".to_string(),
    };
    if let Err(e) = state
        .mailer
        .send_cancellation(&user.email, &user.name, &county_name)
        .await
    {
        tracing::warn!(error = %e, "Failed to send cancellation email");
    }
}

fn metadata_uuid(session: &CheckoutSessionObject, key: &str) -> Result<Uuid, AppError> {
    session
        .metadata
        .get(key)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Missing or invalid metadata key: {}", key))
        })
}

fn to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Mint the signed handoff token and build the activation link.
pub(super) fn activation_url(
    state: &AppState,
    user_id: &Uuid,
    email: &str,
    name: &str,
    credits: i64,
) -> Result<String, AppError> {
    let token = generate_activation_token(
        state.config.handoff.secret.expose_secret(),
        *user_id,
        email,
        name,
        credits,
        serde_json::Map::new(),
    )
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Token generation failed: {}", e)))?;

    Ok(format!(
        "{}?token={}",
        state.config.handoff.activation_url, token
    ))
}
