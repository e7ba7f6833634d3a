//! County and offer browsing tests.

mod common;

use common::TestApp;

#[tokio::test]
async fn lists_counties_filtered_by_state() {
    let app = TestApp::spawn().await;

    let ohio = app.seed_state("Ohio", "OH").await;
    let iowa = app.seed_state("Iowa", "IA").await;
    app.seed_county(ohio, "Franklin", 1_300_000).await;
    app.seed_county(ohio, "Delaware", 215_000).await;
    app.seed_county(iowa, "Polk", 490_000).await;

    let response = app
        .client
        .get(format!("{}/counties?state_id={}", app.address, ohio))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let counties: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(counties.len(), 2);
    assert!(counties.iter().all(|c| c["state_id"] == ohio.to_string()));

    let response = app
        .client
        .get(format!("{}/counties", app.address))
        .send()
        .await
        .unwrap();
    let all: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(all.len(), 3);

    app.cleanup().await;
}

#[tokio::test]
async fn county_detail_includes_status_and_market_tier() {
    let app = TestApp::spawn().await;

    let state_id = app.seed_state("Ohio", "OH").await;
    let rural = app.seed_county(state_id, "Vinton", 12_800).await;
    let urban = app.seed_county(state_id, "Franklin", 1_300_000).await;

    let response = app
        .client
        .get(format!("{}/counties/{}", app.address, rural))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["market_tier"], 1);

    let response = app
        .client
        .get(format!("{}/counties/{}", app.address, urban))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["market_tier"], 3);

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_county_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/counties/{}", app.address, uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn lists_active_offers_with_exclusivity_flag() {
    let app = TestApp::spawn().await;

    app.seed_offer("Basic", 1, "99.00").await;
    app.seed_offer("Pro", 3, "499.00").await;

    let response = app
        .client
        .get(format!("{}/offers", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let offers: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(offers.len(), 2);

    let pro = offers.iter().find(|o| o["tier_level"] == 3).unwrap();
    assert_eq!(pro["is_exclusive"], true);
    let basic = offers.iter().find(|o| o["tier_level"] == 1).unwrap();
    assert_eq!(basic["is_exclusive"], false);

    app.cleanup().await;
}
