//! Synapse HTTP API Service.
//!
//! This crate provides the HTTP API for Synapse, including:
//!
//! - Account registration and deletion
//! - Metered chat and image credits with hourly, daily and yearly resets
//! - Chat and image generation gated by those credits
//! - Stripe webhooks that grant premium (unmetered) access
//!
//! # Authentication
//!
//! 1. **Bearer tokens** (HS256, subject = email) for end-user requests
//! 2. **Service API keys** (`X-API-Key`) for service-to-service requests
//! 3. **Admin API keys** (`X-Admin-Key`) for manual premium grants

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod providers;
pub mod routes;
pub mod state;

pub use auth::{IdentityResolver, JwtIdentity, Principal};
pub use config::{LedgerMissingPolicy, ServiceConfig, StoreBackend};
pub use error::ApiError;
pub use ledger::{CreditService, StatusReport};
pub use providers::{GenerativeProvider, HttpProvider, ProviderError};
pub use routes::create_router;
pub use state::AppState;
