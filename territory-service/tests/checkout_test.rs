//! Checkout session creation tests, with the billing provider mocked.

mod common;

use common::TestApp;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_billing_provider() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_mock" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_mock",
            "url": "https://checkout.example.com/pay/cs_mock"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/billing_portal/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://billing.example.com/portal/ps_mock"
        })))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn subscription_checkout_returns_redirect_url() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;

    let response = app
        .client
        .post(format!("{}/checkout/subscription", app.address))
        .json(&json!({
            "email": "buyer@example.com",
            "name": "Alex Buyer",
            "county_id": county_id,
            "offer_id": offer_id
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["checkout_url"], "https://checkout.example.com/pay/cs_mock");

    // The billing customer id was persisted for reuse.
    let customer_id: Option<String> =
        sqlx::query_scalar("SELECT provider_customer_id FROM users WHERE email = 'buyer@example.com'")
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(customer_id.as_deref(), Some("cus_mock"));

    app.cleanup().await;
}

#[tokio::test]
async fn checkout_on_fully_locked_county_conflicts() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let basic = app.seed_offer("Basic", 1, "99.00").await;
    let pro = app.seed_offer("Pro", 3, "499.00").await;
    let owner = app.seed_user("owner@example.com", "Owner").await;

    // Exclusive subscription activates via webhook.
    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_1",
                "subscription": "sub_pro",
                "metadata": {
                    "kind": "subscription",
                    "user_id": owner.to_string(),
                    "county_id": county_id.to_string(),
                    "offer_id": pro.to_string()
                }
            }
        }
    })
    .to_string();
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let response = app
        .client
        .post(format!("{}/checkout/subscription", app.address))
        .json(&json!({
            "email": "late@example.com",
            "name": "Late Buyer",
            "county_id": county_id,
            "offer_id": basic
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn exclusive_checkout_blocked_when_county_has_subscribers() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let basic = app.seed_offer("Basic", 1, "99.00").await;
    let pro = app.seed_offer("Pro", 3, "499.00").await;
    let holder = app.seed_user("holder@example.com", "Holder").await;

    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_1",
                "subscription": "sub_basic",
                "metadata": {
                    "kind": "subscription",
                    "user_id": holder.to_string(),
                    "county_id": county_id.to_string(),
                    "offer_id": basic.to_string()
                }
            }
        }
    })
    .to_string();
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let response = app
        .client
        .post(format!("{}/checkout/subscription", app.address))
        .json(&json!({
            "email": "pro@example.com",
            "name": "Pro Buyer",
            "county_id": county_id,
            "offer_id": pro
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn duplicate_active_subscription_for_user_conflicts() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;
    let user_id = app.seed_user("buyer@example.com", "Buyer").await;

    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": {
                    "kind": "subscription",
                    "user_id": user_id.to_string(),
                    "county_id": county_id.to_string(),
                    "offer_id": offer_id.to_string()
                }
            }
        }
    })
    .to_string();
    assert_eq!(app.post_webhook(&body).await.status(), 200);

    let response = app
        .client
        .post(format!("{}/checkout/subscription", app.address))
        .json(&json!({
            "email": "buyer@example.com",
            "name": "Buyer",
            "county_id": county_id,
            "offer_id": offer_id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn claim_checkout_quotes_item_based_price() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    let response = app
        .client
        .post(format!("{}/checkout/claim", app.address))
        .json(&json!({
            "email": "buyer@example.com",
            "name": "Alex Buyer",
            "url": "https://auctions.example.com/catalog/555000/warehouse",
            "title": "Warehouse Lot",
            "item_count": 150
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["amount"], "34.95");
    assert_eq!(body["checkout_url"], "https://checkout.example.com/pay/cs_mock");

    app.cleanup().await;
}

#[tokio::test]
async fn claim_checkout_on_claimed_auction_conflicts() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    let first = app
        .client
        .post(format!("{}/claims/free", app.address))
        .json(&json!({
            "email": "winner@example.com",
            "name": "Winner",
            "url": "https://auctions.example.com/catalog/555000/warehouse"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);

    let response = app
        .client
        .post(format!("{}/checkout/claim", app.address))
        .json(&json!({
            "email": "late@example.com",
            "name": "Late Buyer",
            "url": "https://auctions.example.com/catalog/555000/warehouse"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn portal_session_requires_existing_billing_customer() {
    let provider = mock_billing_provider().await;
    let app = TestApp::spawn_with_billing_url(&provider.uri()).await;

    app.seed_user("nocustomer@example.com", "No Customer").await;

    let response = app
        .client
        .post(format!("{}/portal", app.address))
        .json(&json!({ "email": "nocustomer@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    sqlx::query("UPDATE users SET provider_customer_id = 'cus_mock' WHERE email = 'nocustomer@example.com'")
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = app
        .client
        .post(format!("{}/portal", app.address))
        .json(&json!({ "email": "nocustomer@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["portal_url"], "https://billing.example.com/portal/ps_mock");

    app.cleanup().await;
}
