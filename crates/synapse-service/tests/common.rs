//! Common test utilities for synapse integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use synapse_core::{ManualClock, UserId};
use synapse_service::{
    create_router, AppState, GenerativeProvider, JwtIdentity, ProviderError, ServiceConfig,
};
use synapse_store::MemoryStore;

pub const AUTH_SECRET: &str = "test-auth-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// The instant every harness clock starts at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

/// Provider double that answers canned content or fails on demand.
#[derive(Default)]
pub struct FakeProvider {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn outcome(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(ProviderError::Malformed {
                provider: "Fake",
                reason: "forced failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GenerativeProvider for FakeProvider {
    async fn chat(&self, prompt: &str) -> Result<String, ProviderError> {
        self.outcome()?;
        Ok(format!("echo: {prompt}"))
    }

    async fn image(&self, _prompt: &str) -> Result<Vec<u8>, ProviderError> {
        self.outcome()?;
        Ok(b"PNG".to_vec())
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The state behind the server, for calling services directly.
    pub state: AppState,
    /// The store behind the server.
    pub store: Arc<MemoryStore>,
    /// The clock every component reads.
    pub clock: Arc<ManualClock>,
    /// The generative provider double.
    pub provider: Arc<FakeProvider>,
    identity: JwtIdentity,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_secret: Some(AUTH_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let provider = Arc::new(FakeProvider::default());

        let state = AppState::from_parts(
            store.clone(),
            config,
            clock.clone(),
            Some(provider.clone() as Arc<dyn GenerativeProvider>),
        );
        let router: Router = create_router(state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");

        let identity = JwtIdentity::new(Some(AUTH_SECRET), store.clone(), clock.clone());

        Self {
            server,
            state,
            store,
            clock,
            provider,
            identity,
        }
    }

    /// Authorization header value for a token issued to `email`.
    pub fn bearer_for(&self, email: &str) -> String {
        let token = self.identity.issue(email, 3600).expect("Failed to issue token");
        format!("Bearer {token}")
    }

    /// Register `username` through the API; returns its auth header and ID.
    pub async fn register(&self, username: &str) -> (String, UserId) {
        let auth = self.bearer_for(&format!("{username}@example.com"));
        let response = self
            .server
            .post("/v1/accounts")
            .add_header("authorization", auth.clone())
            .json(&json!({ "username": username }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: serde_json::Value = response.json();
        let user_id = body["user_id"]
            .as_str()
            .expect("user_id in response")
            .parse()
            .expect("valid user id");
        (auth, user_id)
    }

    /// Deduct through the service-key endpoint.
    pub async fn deduct(&self, user_id: &UserId, credit_type: &str) -> axum_test::TestResponse {
        self.server
            .post(&format!("/v1/credits/deduct/{user_id}/{credit_type}"))
            .add_header("x-api-key", SERVICE_API_KEY)
            .await
    }

    /// Status through the service-key endpoint.
    pub async fn status(&self, user_id: &UserId) -> axum_test::TestResponse {
        self.server
            .get(&format!("/v1/credits/{user_id}"))
            .add_header("x-api-key", SERVICE_API_KEY)
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
