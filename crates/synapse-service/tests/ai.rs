//! Metered generation integration tests.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_API_KEY};
use serde_json::json;

use synapse_service::{create_router, AppState, ServiceConfig};
use synapse_store::{MemoryStore, Store};

#[tokio::test]
async fn chat_spends_one_chat_credit() {
    let harness = TestHarness::new();
    let (auth, user_id) = harness.register("ada").await;

    let response = harness
        .server
        .post("/v1/chat")
        .add_header("authorization", auth)
        .json(&json!({ "prompt": "hello" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["provider"], "Groq");
    assert_eq!(body["response"], "echo: hello");
    assert_eq!(body["credits"]["chat_credits"], 9);

    let ledger = harness.store.get_ledger(&user_id).await.unwrap().unwrap();
    assert_eq!(ledger.chat_allowance, 9);
    assert_eq!(ledger.image_allowance, 5);
}

#[tokio::test]
async fn image_returns_data_url() {
    let harness = TestHarness::new();
    let (auth, _) = harness.register("ada").await;

    let response = harness
        .server
        .post("/v1/image")
        .add_header("authorization", auth)
        .json(&json!({ "prompt": "a lighthouse" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["provider"], "ClipDrop");
    assert_eq!(body["image_base64"], "data:image/png;base64,UE5H");
    assert_eq!(body["credits"]["image_credits"], 4);
}

#[tokio::test]
async fn exhausted_allowance_blocks_the_provider() {
    let harness = TestHarness::new();
    let (auth, _) = harness.register("ada").await;

    for _ in 0..5 {
        harness
            .server
            .post("/v1/image")
            .add_header("authorization", auth.clone())
            .json(&json!({ "prompt": "cat" }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .post("/v1/image")
        .add_header("authorization", auth)
        .json(&json!({ "prompt": "cat" }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    assert_eq!(harness.provider.calls(), 5);
}

#[tokio::test]
async fn empty_prompt_costs_nothing() {
    let harness = TestHarness::new();
    let (auth, user_id) = harness.register("ada").await;

    harness
        .server
        .post("/v1/chat")
        .add_header("authorization", auth)
        .json(&json!({ "prompt": "   " }))
        .await
        .assert_status_bad_request();

    let ledger = harness.store.get_ledger(&user_id).await.unwrap().unwrap();
    assert_eq!(ledger.chat_allowance, 10);
    assert_eq!(harness.provider.calls(), 0);
}

#[tokio::test]
async fn provider_failure_keeps_the_credit_spent() {
    let harness = TestHarness::new();
    let (auth, user_id) = harness.register("ada").await;
    harness.provider.set_failing(true);

    let response = harness
        .server
        .post("/v1/chat")
        .add_header("authorization", auth)
        .json(&json!({ "prompt": "hello" }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "external_service_error");

    let ledger = harness.store.get_ledger(&user_id).await.unwrap().unwrap();
    assert_eq!(ledger.chat_allowance, 9);
}

#[tokio::test]
async fn premium_user_is_not_metered() {
    let harness = TestHarness::new();
    let (auth, user_id) = harness.register("ada").await;
    harness
        .server
        .post(&format!("/v1/admin/premium/{user_id}"))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await
        .assert_status_ok();

    for _ in 0..12 {
        let response = harness
            .server
            .post("/v1/chat")
            .add_header("authorization", auth.clone())
            .json(&json!({ "prompt": "hi" }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["credits"]["chat_credits"], "unlimited");
    }

    let ledger = harness.store.get_ledger(&user_id).await.unwrap().unwrap();
    assert_eq!(ledger.chat_allowance, 10);
}

#[tokio::test]
async fn unconfigured_provider_is_unavailable() {
    let config = ServiceConfig {
        auth_secret: Some(common::AUTH_SECRET.into()),
        ..ServiceConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), config);
    assert!(!state.has_provider());
    let server = axum_test::TestServer::new(create_router(state)).unwrap();

    let identity = synapse_service::JwtIdentity::new(
        Some(common::AUTH_SECRET),
        store.clone(),
        Arc::new(synapse_core::SystemClock),
    );
    let user = synapse_core::User::new("ada", "ada@example.com", chrono::Utc::now());
    store.create_user(&user).await.unwrap();
    let token = identity.issue("ada@example.com", 60).unwrap();

    let response = server
        .post("/v1/chat")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&json!({ "prompt": "hello" }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert!(store.get_ledger(&user.id).await.unwrap().is_none());
}
