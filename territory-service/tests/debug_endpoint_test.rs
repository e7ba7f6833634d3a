//! Admin debug endpoint tests.

mod common;

use common::{TestApp, TEST_ADMIN_SECRET, TEST_HANDOFF_SECRET};
use serde_json::json;
use territory_core::token::verify_activation_token;

#[tokio::test]
async fn debug_claim_success_requires_admin_secret() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Basic", 1, "99.00").await;

    let payload = json!({
        "email": "dev@example.com",
        "name": "Dev User",
        "county_id": county_id,
        "offer_id": offer_id
    });

    let response = app
        .client
        .post(format!("{}/debug/claim-success", app.address))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = app
        .client
        .post(format!("{}/debug/claim-success", app.address))
        .header("X-Admin-Secret", "wrong")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    app.cleanup().await;
}

#[tokio::test]
async fn debug_claim_success_activates_subscription_and_mints_token() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let county_id = app.seed_county(state_id, "Franklin", 1_300_000).await;
    let offer_id = app.seed_offer("Pro", 3, "499.00").await;

    let response = app
        .client
        .post(format!("{}/debug/claim-success", app.address))
        .header("X-Admin-Secret", TEST_ADMIN_SECRET)
        .json(&json!({
            "email": "dev@example.com",
            "name": "Dev User",
            "county_id": county_id,
            "offer_id": offer_id
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["county_status"], "fully_locked");
    assert_eq!(app.county_status(county_id).await, "fully_locked");

    // The activation link carries a verifiable handoff token.
    let url = body["activation_url"].as_str().unwrap();
    let token = url.split("token=").nth(1).unwrap();
    let claims = verify_activation_token(TEST_HANDOFF_SECRET, token).unwrap();
    assert_eq!(claims.email, "dev@example.com");
    assert_eq!(claims.credits, 100);

    app.cleanup().await;
}
