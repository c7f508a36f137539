//! Stripe webhook and premium grant integration tests.

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{TestHarness, ADMIN_API_KEY, WEBHOOK_SECRET};
use serde_json::json;

use synapse_core::Clock;
use synapse_service::crypto::sign_stripe_payload;
use synapse_store::Store;

fn event(event_type: &str, object: &serde_json::Value) -> String {
    json!({
        "id": "evt_test",
        "type": event_type,
        "data": { "object": object },
    })
    .to_string()
}

async fn send(harness: &TestHarness, payload: &str) -> axum_test::TestResponse {
    let signed_at = harness.clock.now().timestamp();
    let signature = sign_stripe_payload(payload, signed_at, WEBHOOK_SECRET);
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .text(payload)
        .await
}

#[tokio::test]
async fn checkout_marks_user_premium_and_links_customer() {
    let harness = TestHarness::new();
    let (_, user_id) = harness.register("ada").await;

    let payload = event(
        "checkout.session.completed",
        &json!({
            "id": "cs_1",
            "client_reference_id": user_id.to_string(),
            "customer": "cus_123",
            "subscription": "sub_1",
        }),
    );
    send(&harness, &payload).await.assert_status_ok();

    let user = harness.store.get_user(&user_id).await.unwrap().unwrap();
    assert!(user.is_premium);
    assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_123"));
    assert_eq!(
        user.premium_expires_at,
        Some(harness.clock.now() + Duration::days(30))
    );
}

#[tokio::test]
async fn renewal_extends_premium_by_customer() {
    let harness = TestHarness::new();
    let (_, user_id) = harness.register("ada").await;
    harness
        .store
        .update_user(&user_id, &|u| u.stripe_customer_id = Some("cus_9".into()))
        .await
        .unwrap();

    harness.clock.advance(Duration::days(29));
    let payload = event("invoice.payment_succeeded", &json!({ "customer": "cus_9" }));
    send(&harness, &payload).await.assert_status_ok();

    let user = harness.store.get_user(&user_id).await.unwrap().unwrap();
    assert_eq!(
        user.premium_expires_at,
        Some(harness.clock.now() + Duration::days(30))
    );

    // Metering is skipped from now on.
    let body: serde_json::Value = harness.deduct(&user_id, "chat").await.json();
    assert_eq!(body["updated_credits"]["chat_credits"], "unlimited");
}

#[tokio::test]
async fn stale_reference_falls_back_to_customer() {
    let harness = TestHarness::new();
    let (_, user_id) = harness.register("ada").await;
    harness
        .store
        .update_user(&user_id, &|u| u.stripe_customer_id = Some("cus_42".into()))
        .await
        .unwrap();

    let payload = event(
        "checkout.session.completed",
        &json!({
            "client_reference_id": synapse_core::UserId::generate().to_string(),
            "customer": "cus_42",
        }),
    );
    send(&harness, &payload).await.assert_status_ok();

    let user = harness.store.get_user(&user_id).await.unwrap().unwrap();
    assert!(user.is_premium);
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let harness = TestHarness::new();
    let (_, user_id) = harness.register("ada").await;
    let payload = event(
        "checkout.session.completed",
        &json!({ "client_reference_id": user_id.to_string() }),
    );

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", "t=1,v1=deadbeef")
        .text(payload)
        .await;
    response.assert_status_bad_request();

    harness
        .server
        .post("/webhooks/stripe")
        .text("{}")
        .await
        .assert_status_bad_request();

    let user = harness.store.get_user(&user_id).await.unwrap().unwrap();
    assert!(!user.is_premium);
}

#[tokio::test]
async fn replayed_signature_is_rejected() {
    let harness = TestHarness::new();
    let (_, user_id) = harness.register("ada").await;
    let payload = event(
        "checkout.session.completed",
        &json!({ "client_reference_id": user_id.to_string() }),
    );
    let signed_at = harness.clock.now().timestamp();

    harness.clock.advance(Duration::minutes(10));
    harness
        .server
        .post("/webhooks/stripe")
        .add_header(
            "stripe-signature",
            sign_stripe_payload(&payload, signed_at, WEBHOOK_SECRET),
        )
        .text(payload)
        .await
        .assert_status_bad_request();

    let user = harness.store.get_user(&user_id).await.unwrap().unwrap();
    assert!(!user.is_premium);
}

#[tokio::test]
async fn unknown_customer_is_acknowledged() {
    let harness = TestHarness::new();
    let payload = event("invoice.payment_succeeded", &json!({ "customer": "cus_nobody" }));

    let response = send(&harness, &payload).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn unhandled_event_is_ignored() {
    let harness = TestHarness::new();
    let payload = event("customer.created", &json!({ "id": "cus_1" }));

    send(&harness, &payload).await.assert_status_ok();
}

#[tokio::test]
async fn unsigned_webhooks_accepted_without_secret() {
    let harness = TestHarness::with_config(|config| config.stripe_webhook_secret = None);
    let (_, user_id) = harness.register("ada").await;
    let payload = event(
        "checkout.session.completed",
        &json!({ "client_reference_id": user_id.to_string() }),
    );

    harness
        .server
        .post("/webhooks/stripe")
        .text(payload)
        .await
        .assert_status_ok();

    let user = harness.store.get_user(&user_id).await.unwrap().unwrap();
    assert!(user.is_premium);
}

#[tokio::test]
async fn admin_grant_requires_admin_key() {
    let harness = TestHarness::new();
    let (_, user_id) = harness.register("ada").await;

    harness
        .server
        .post(&format!("/v1/admin/premium/{user_id}"))
        .add_header("x-admin-key", "nope")
        .await
        .assert_status_unauthorized();

    let response = harness
        .server
        .post(&format!("/v1/admin/premium/{user_id}"))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["detail"], "User ada is now premium");
}

#[tokio::test]
async fn admin_grant_for_unknown_user_is_not_found() {
    let harness = TestHarness::new();

    harness
        .server
        .post(&format!(
            "/v1/admin/premium/{}",
            synapse_core::UserId::generate()
        ))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
