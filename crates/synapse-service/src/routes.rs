//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, ai, credits, health, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for the provider-backed endpoints, which hold
/// a connection open for the length of an upstream call.
const AI_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (user token)
/// - `POST /v1/accounts` - Register the token's email
/// - `GET /v1/accounts/me` - Get current user's account
/// - `DELETE /v1/accounts/me` - Delete account and ledger
///
/// ## Credits
/// - `GET /v1/credits/me` - Caller's status (user token)
/// - `GET /v1/credits/{user_id}` - Status (service key)
/// - `POST /v1/credits/deduct/{user_id}/{credit_type}` - Deduct (service key)
///
/// ## Generation (user token, metered)
/// - `POST /v1/chat` - Chat completion, one chat credit
/// - `POST /v1/image` - Image generation, one image credit
///
/// ## Billing
/// - `POST /v1/admin/premium/{user_id}` - Grant premium (admin key)
/// - `POST /webhooks/stripe` - Stripe webhooks (signature verification)
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let ai_routes = Router::new()
        .route("/chat", post(ai::chat))
        .route("/image", post(ai::image))
        .layer(ConcurrencyLimitLayer::new(AI_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route(
            "/accounts/me",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        // Credits
        .route("/credits/me", get(credits::get_my_credits))
        .route("/credits/:user_id", get(credits::get_credits))
        .route(
            "/credits/deduct/:user_id/:credit_type",
            post(credits::deduct_credit),
        )
        // Billing
        .route("/admin/premium/:user_id", post(webhooks::grant_premium))
        .merge(ai_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by external services)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
