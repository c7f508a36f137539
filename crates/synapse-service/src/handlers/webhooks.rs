//! Billing: Stripe webhooks and manual premium grants.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use synapse_core::{Clock, User, UserId};
use synapse_store::Store;

use crate::auth::AdminAuth;
use crate::crypto::verify_stripe_signature;
use crate::error::ApiError;
use crate::state::AppState;

/// Stripe webhook payload (simplified).
#[derive(Debug, Deserialize)]
pub struct StripeWebhook {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event ID.
    pub id: String,
    /// Event data.
    pub data: StripeEventData,
}

/// Stripe event data container.
#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    /// Event object.
    pub object: serde_json::Value,
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

        let now = state.clock.now().timestamp();
        verify_stripe_signature(&body, signature, secret, now).map_err(|e| {
            tracing::warn!(error = %e, "Invalid Stripe webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        tracing::warn!("Stripe webhook_secret not configured - skipping signature verification");
    }

    let webhook: StripeWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.id,
        "Received Stripe webhook"
    );

    match webhook.event_type.as_str() {
        "checkout.session.completed" | "invoice.payment_succeeded" => {
            handle_payment(&state, &webhook.data.object).await?;
        }
        _ => {
            tracing::debug!(event_type = %webhook.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Find the paying user and mark them premium.
///
/// Checkout sessions carry our user ID in `client_reference_id`; renewals
/// only carry the Stripe customer, which checkout linked earlier. The
/// customer is also tried when the reference names no user.
async fn handle_payment(state: &AppState, object: &serde_json::Value) -> Result<(), ApiError> {
    let customer = object.get("customer").and_then(|v| v.as_str());
    let reference = object
        .get("client_reference_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<UserId>().ok());

    let mut user = match reference {
        Some(id) => state.store.get_user(&id).await?,
        None => None,
    };
    if user.is_none() {
        if let Some(customer) = customer {
            user = state.store.get_user_by_stripe_customer(customer).await?;
        }
    }

    let Some(user) = user else {
        tracing::warn!(customer = ?customer, "Payment for unknown user, ignoring");
        return Ok(());
    };

    let link = customer
        .filter(|c| user.stripe_customer_id.as_deref() != Some(*c))
        .map(String::from);
    mark_premium(state, &user.id, link).await?;
    Ok(())
}

/// Grant the configured premium period, optionally linking a Stripe customer.
async fn mark_premium(
    state: &AppState,
    user_id: &UserId,
    stripe_customer: Option<String>,
) -> Result<User, ApiError> {
    let now = state.clock.now();
    let days = state.config.premium_period_days;

    let user = state
        .store
        .update_user(user_id, &|user| {
            user.grant_premium(now, days);
            if let Some(customer) = &stripe_customer {
                user.stripe_customer_id = Some(customer.clone());
            }
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        premium_expires_at = ?user.premium_expires_at,
        "User marked premium"
    );
    Ok(user)
}

/// Mark a user premium as if a payment succeeded (admin only).
pub async fn grant_premium(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid user id: {user_id}")))?;

    let user = mark_premium(&state, &user_id, None).await?;

    tracing::info!(admin_id = %admin.admin_id, user_id = %user.id, "Premium granted by admin");

    Ok(Json(serde_json::json!({
        "detail": format!("User {} is now premium", user.username),
    })))
}
