//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use synapse_core::{Clock, User};
use synapse_store::Store;

use crate::auth::{AuthClaims, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Email.
    pub email: String,
    /// Whether premium is active now.
    pub is_premium: bool,
    /// End of the paid premium period, if any.
    pub premium_expires_at: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl AccountResponse {
    fn new(user: &User, is_premium: bool) -> Self {
        Self {
            user_id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            is_premium,
            premium_expires_at: user.premium_expires_at.map(|t| t.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Display name; must be unique.
    pub username: String,
}

/// Register the token's email as a new account with a default ledger.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".into()));
    }

    if state.store.get_user_by_email(&claims.email).await?.is_some() {
        return Err(ApiError::Conflict("Account already exists".into()));
    }

    let user = User::new(username, claims.email, state.clock.now());
    state.store.create_user(&user).await?;
    if let Err(e) = state.credits.open_ledger(user.id).await {
        // The first deduction or status read creates it instead.
        tracing::warn!(user_id = %user.id, error = %e, "Failed to open ledger at registration");
    }

    tracing::info!(user_id = %user.id, username = %user.username, "Account created");

    Ok((StatusCode::CREATED, Json(AccountResponse::new(&user, false))))
}

/// Get the current user's account.
pub async fn get_account(auth: AuthUser) -> Json<AccountResponse> {
    Json(AccountResponse::new(&auth.user, auth.is_premium))
}

/// Delete the current user's account and ledger.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.delete_user(&auth.user.id).await?;

    tracing::info!(user_id = %auth.user.id, "Account deleted");

    Ok(Json(serde_json::json!({ "deleted": true })))
}
