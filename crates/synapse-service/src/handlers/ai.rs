//! Metered chat and image generation.
//!
//! Each request deducts one credit before calling the provider. A provider
//! failure after a successful deduction is reported as 502; the credit is
//! not refunded.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use synapse_core::{CreditSnapshot, CreditType};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::providers::GenerativeProvider;
use crate::state::AppState;

/// Prompt request body.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    /// The user's prompt.
    pub prompt: String,
}

/// Chat response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Provider that answered.
    pub provider: String,
    /// The completion.
    pub response: String,
    /// Counters after the deduction.
    pub credits: CreditSnapshot,
}

/// Image response.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    /// Provider that answered.
    pub provider: String,
    /// The image as a `data:image/png;base64,` URL.
    pub image_base64: String,
    /// Counters after the deduction.
    pub credits: CreditSnapshot,
}

/// Validate the prompt, check a provider exists, then deduct.
async fn charge(
    state: &AppState,
    auth: &AuthUser,
    prompt: &str,
    credit_type: CreditType,
) -> Result<(Arc<dyn GenerativeProvider>, CreditSnapshot), ApiError> {
    if prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("Prompt is required".into()));
    }
    let provider = state
        .provider
        .clone()
        .ok_or_else(|| ApiError::ProviderUnavailable("generation is not configured".into()))?;
    let credits = state.credits.deduct(&auth.user, credit_type).await?;
    Ok((provider, credits))
}

/// Complete a chat prompt for one chat credit.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PromptRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (provider, credits) = charge(&state, &auth, &body.prompt, CreditType::Chat).await?;

    let response = provider.chat(&body.prompt).await.map_err(|e| {
        tracing::warn!(user_id = %auth.user.id, error = %e, "Chat provider failed");
        ApiError::ExternalService(format!("chat provider failed: {e}"))
    })?;

    Ok(Json(ChatResponse {
        provider: provider.chat_provider().to_string(),
        response,
        credits,
    }))
}

/// Generate an image for one image credit.
pub async fn image(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PromptRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    let (provider, credits) = charge(&state, &auth, &body.prompt, CreditType::Image).await?;

    let bytes = provider.image(&body.prompt).await.map_err(|e| {
        tracing::warn!(user_id = %auth.user.id, error = %e, "Image provider failed");
        ApiError::ExternalService(format!("image provider failed: {e}"))
    })?;

    Ok(Json(ImageResponse {
        provider: provider.image_provider().to_string(),
        image_base64: format!("data:image/png;base64,{}", STANDARD.encode(bytes)),
        credits,
    }))
}
