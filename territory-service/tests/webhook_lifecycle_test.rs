//! Billing webhook lifecycle tests.
//!
//! These drive the county status state machine end to end: checkout
//! completion, renewal, payment failure, and cancellation.

mod common;

use common::TestApp;
use serde_json::json;
use uuid::Uuid;

fn checkout_completed_event(
    event_id: &str,
    user_id: Uuid,
    county_id: Uuid,
    offer_id: Uuid,
    provider_sub_id: &str,
) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": format!("cs_{}", event_id),
                "mode": "subscription",
                "customer": "cus_test",
                "subscription": provider_sub_id,
                "metadata": {
                    "kind": "subscription",
                    "user_id": user_id.to_string(),
                    "county_id": county_id.to_string(),
                    "offer_id": offer_id.to_string()
                }
            }
        }
    })
    .to_string()
}

fn subscription_deleted_event(event_id: &str, provider_sub_id: &str) -> String {
    json!({
        "id": event_id,
        "type": "customer.subscription.deleted",
        "data": {
            "object": {
                "id": provider_sub_id,
                "status": "canceled",
                "current_period_end": null
            }
        }
    })
    .to_string()
}

fn invoice_event(event_id: &str, event_type: &str, provider_sub_id: &str) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "object": {
                "id": format!("in_{}", event_id),
                "customer": "cus_test",
                "subscription": provider_sub_id,
                "period_end": 4102444800i64
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn webhook_without_valid_signature_is_rejected() {
    let app = TestApp::spawn().await;

    let body = json!({ "id": "evt_1", "type": "noop", "data": { "object": {} } }).to_string();

    // Missing header
    let response = app
        .client
        .post(format!("{}/webhooks/billing", app.address))
        .header("Content-Type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Wrong signature
    let response = app
        .client
        .post(format!("{}/webhooks/billing", app.address))
        .header("Billing-Signature", "t=1,v1=deadbeef")
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    app.cleanup().await;
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged() {
    let app = TestApp::spawn().await;

    let body = json!({
        "id": "evt_x",
        "type": "charge.refunded",
        "data": { "object": {} }
    })
    .to_string();

    let response = app.post_webhook(&body).await;
    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.unwrap();
    assert_eq!(ack["received"], true);

    app.cleanup().await;
}

#[tokio::test]
async fn exclusive_checkout_fully_locks_county_and_grants_credits() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Pro", 3, "499.00").await;
    let user_id = app.seed_user("pro@example.com", "Pro Buyer").await;

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_pro_1");
    let response = app.post_webhook(&body).await;
    assert_eq!(response.status(), 200);

    assert_eq!(app.county_status(county_id).await, "fully_locked");
    assert_eq!(app.credit_balance(user_id).await, 100);

    let status: String =
        sqlx::query_scalar("SELECT status FROM subscriptions WHERE provider_subscription_id = 'sub_pro_1'")
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(status, "active");

    app.cleanup().await;
}

#[tokio::test]
async fn basic_checkout_partially_locks_county() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Delaware", 215_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let user_id = app.seed_user("basic@example.com", "Basic Buyer").await;

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_basic_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    assert_eq!(app.county_status(county_id).await, "partially_locked");

    app.cleanup().await;
}

#[tokio::test]
async fn redelivered_checkout_event_does_not_double_grant() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let user_id = app.seed_user("buyer@example.com", "Buyer").await;

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    assert_eq!(app.credit_balance(user_id).await, 100);

    let subs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(subs, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn failed_processing_is_counted_in_error_metrics() {
    let app = TestApp::spawn().await;

    // Subscription-mode session with no metadata fails dispatch.
    let body = json!({
        "id": "evt_bad",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_evt_bad",
                "mode": "subscription",
                "customer": "cus_test",
                "subscription": "sub_bad",
                "metadata": {}
            }
        }
    })
    .to_string();
    assert_eq!(app.post_webhook(&body).await.status(), 400);

    let metrics = app
        .client
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("territory_errors_total"));

    app.cleanup().await;
}

#[tokio::test]
async fn redelivery_finishes_a_partially_processed_checkout() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Pro", 3, "499.00").await;
    let user_id = app.seed_user("pro@example.com", "Pro Buyer").await;

    // A first delivery that died after committing the subscription row:
    // no credits granted, county status never recomputed.
    sqlx::query(
        "INSERT INTO subscriptions (subscription_id, user_id, county_id, offer_id, status, start_date, provider_subscription_id)
         VALUES ($1, $2, $3, $4, 'active', CURRENT_DATE, 'sub_pro_1')",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(county_id)
    .bind(offer_id)
    .execute(app.db.pool())
    .await
    .unwrap();
    assert_eq!(app.county_status(county_id).await, "available");

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_pro_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    assert_eq!(app.county_status(county_id).await, "fully_locked");
    assert_eq!(app.credit_balance(user_id).await, 100);

    let subs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(subs, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn renewal_extends_period_and_grants_credits_once() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let user_id = app.seed_user("buyer@example.com", "Buyer").await;

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let renewal = invoice_event("evt_2", "invoice.payment_succeeded", "sub_1");
    assert_eq!(app.post_webhook(&renewal).await.status(), 200);
    assert_eq!(app.credit_balance(user_id).await, 200);

    // Redelivery of the same invoice event is a no-op.
    assert_eq!(app.post_webhook(&renewal).await.status(), 200);
    assert_eq!(app.credit_balance(user_id).await, 200);

    let period_end: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
        "SELECT current_period_end FROM subscriptions WHERE provider_subscription_id = 'sub_1'",
    )
    .fetch_one(app.db.pool())
    .await
    .unwrap();
    assert!(period_end.is_some());

    app.cleanup().await;
}

#[tokio::test]
async fn failed_payment_marks_past_due_and_reopens_county() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Pro", 3, "499.00").await;
    let user_id = app.seed_user("buyer@example.com", "Buyer").await;

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);
    assert_eq!(app.county_status(county_id).await, "fully_locked");

    let failed = invoice_event("evt_2", "invoice.payment_failed", "sub_1");
    assert_eq!(app.post_webhook(&failed).await.status(), 200);

    let status: String =
        sqlx::query_scalar("SELECT status FROM subscriptions WHERE provider_subscription_id = 'sub_1'")
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(status, "past_due");
    assert_eq!(app.county_status(county_id).await, "available");

    app.cleanup().await;
}

#[tokio::test]
async fn cancelling_sole_subscription_reopens_county() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let user_id = app.seed_user("buyer@example.com", "Buyer").await;

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);
    assert_eq!(app.county_status(county_id).await, "partially_locked");

    let deleted = subscription_deleted_event("evt_2", "sub_1");
    assert_eq!(app.post_webhook(&deleted).await.status(), 200);

    assert_eq!(app.county_status(county_id).await, "available");

    let end_date: Option<chrono::NaiveDate> =
        sqlx::query_scalar("SELECT end_date FROM subscriptions WHERE provider_subscription_id = 'sub_1'")
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert!(end_date.is_some());

    app.cleanup().await;
}

#[tokio::test]
async fn cancelling_one_of_two_subscriptions_keeps_county_partially_locked() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let first = app.seed_user("first@example.com", "First").await;
    let second = app.seed_user("second@example.com", "Second").await;

    let body = checkout_completed_event("evt_1", first, county_id, offer_id, "sub_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);
    let body = checkout_completed_event("evt_2", second, county_id, offer_id, "sub_2");
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let deleted = subscription_deleted_event("evt_3", "sub_1");
    assert_eq!(app.post_webhook(&deleted).await.status(), 200);

    assert_eq!(app.county_status(county_id).await, "partially_locked");

    app.cleanup().await;
}

#[tokio::test]
async fn cancelling_subscription_leaves_trial_lock_in_place() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let user_id = app.seed_user("buyer@example.com", "Buyer").await;

    // Active trial on the same county.
    let trial = app
        .client
        .post(format!("{}/trials", app.address))
        .json(&json!({
            "county_id": county_id,
            "contact_name": "Trial User",
            "contact_email": "trial@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(trial.status(), 201);

    let body = checkout_completed_event("evt_1", user_id, county_id, offer_id, "sub_1");
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let deleted = subscription_deleted_event("evt_2", "sub_1");
    assert_eq!(app.post_webhook(&deleted).await.status(), 200);

    // The trial still holds the county.
    assert_eq!(app.county_status(county_id).await, "partially_locked");

    app.cleanup().await;
}

#[tokio::test]
async fn paid_claim_webhook_records_claim_and_credits() {
    let app = TestApp::spawn().await;

    let user_id = app.seed_user("buyer@example.com", "Buyer").await;
    let auction_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO auctions (auction_id, external_id, url, item_count) VALUES ($1, '987654', 'https://auctions.example.com/catalog/987654/x', 120)",
    )
    .bind(auction_id)
    .execute(app.db.pool())
    .await
    .unwrap();

    let body = json!({
        "id": "evt_claim_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_claim",
                "mode": "payment",
                "customer": "cus_test",
                "subscription": null,
                "metadata": {
                    "kind": "auction_claim",
                    "user_id": user_id.to_string(),
                    "auction_id": auction_id.to_string()
                }
            }
        }
    })
    .to_string();

    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let claim_user: Uuid = sqlx::query_scalar("SELECT user_id FROM claimed_auctions WHERE auction_id = $1")
        .bind(auction_id)
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(claim_user, user_id);
    assert_eq!(app.credit_balance(user_id).await, 100);

    // Redelivery: no second claim row, no second grant.
    assert_eq!(app.post_webhook(&body).await.status(), 200);
    assert_eq!(app.credit_balance(user_id).await, 100);

    app.cleanup().await;
}
