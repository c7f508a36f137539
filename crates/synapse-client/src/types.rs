//! Request and response types for the synapse client.

use serde::Deserialize;

use synapse_core::{Allowance, CreditSnapshot};

/// Health probe response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// `"ok"` when the service is up.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
}

/// A user's credit status after replenishment.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    /// User ID.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Remaining chat operations.
    pub chat_credits: Allowance,
    /// Remaining image operations.
    pub image_credits: Allowance,
    /// Replenishment watermark (RFC 3339).
    pub last_reset: String,
    /// Whether the user is premium.
    pub is_premium: bool,
}

/// Result of a successful deduction.
#[derive(Debug, Clone, Deserialize)]
pub struct DeductResponse {
    /// User ID.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Counters after the deduction.
    pub updated_credits: CreditSnapshot,
}

/// Error body returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Human-readable message.
    pub detail: String,
    /// Machine-readable code.
    pub code: String,
}
