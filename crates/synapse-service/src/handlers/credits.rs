//! Credit status and deduction handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use synapse_core::{Allowance, CreditSnapshot, CreditType, UserId};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::ledger::StatusReport;
use crate::state::AppState;

/// Credit status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// User ID.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Remaining chat operations.
    pub chat_credits: Allowance,
    /// Remaining image operations.
    pub image_credits: Allowance,
    /// Reset watermark.
    pub last_reset: String,
    /// Whether premium is active.
    pub is_premium: bool,
}

impl From<StatusReport> for StatusResponse {
    fn from(report: StatusReport) -> Self {
        Self {
            user_id: report.user.id.to_string(),
            username: report.user.username,
            chat_credits: Allowance::Limited(report.ledger.chat_allowance),
            image_credits: Allowance::Limited(report.ledger.image_allowance),
            last_reset: report.ledger.last_reset_at.to_rfc3339(),
            is_premium: report.is_premium,
        }
    }
}

/// Deduction response.
#[derive(Debug, Serialize)]
pub struct DeductResponse {
    /// User ID.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Counters after the deduction, or the unlimited sentinel.
    pub updated_credits: CreditSnapshot,
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid user id: {raw}")))
}

/// Get the caller's credit status.
pub async fn get_my_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<StatusResponse>, ApiError> {
    let report = state.credits.status(&auth.user.id).await?;
    Ok(Json(report.into()))
}

/// Get a user's credit status (service-to-service).
pub async fn get_credits(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;

    tracing::debug!(service = %service.service_name, %user_id, "Credit status requested");

    let report = state.credits.status(&user_id).await?;
    Ok(Json(report.into()))
}

/// Deduct one credit of the given type (service-to-service).
///
/// Both path segments are validated before the store is touched.
pub async fn deduct_credit(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Path((user_id, credit_type)): Path<(String, String)>,
) -> Result<Json<DeductResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let credit_type: CreditType = credit_type.parse()?;

    tracing::debug!(
        service = %service.service_name,
        %user_id,
        %credit_type,
        "Deduction requested"
    );

    let (user, snapshot) = state.credits.deduct_for(&user_id, credit_type).await?;

    Ok(Json(DeductResponse {
        user_id: user.id.to_string(),
        username: user.username,
        updated_credits: snapshot,
    }))
}
