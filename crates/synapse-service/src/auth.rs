//! Authentication: identity resolution and request extractors.
//!
//! This module provides extractors for:
//! - `AuthClaims` - A verified bearer token, before any account exists
//! - `AuthUser` - End-user authentication resolved to a stored user
//! - `ServiceAuth` - Service-to-service authentication via API key
//! - `AdminAuth` - Admin authentication for privileged endpoints

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use synapse_core::{Clock, User};
use synapse_store::Store;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// A resolved caller.
#[derive(Debug, Clone)]
pub struct Principal {
    /// The stored user.
    pub user: User,
    /// Premium status at resolution time.
    pub is_premium: bool,
}

/// Turns a bearer credential into an identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Verify `bearer` and return the email it was issued for.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if the credential is invalid or expired.
    fn verify(&self, bearer: &str) -> Result<String, ApiError>;

    /// Verify `bearer` and load the user it names.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for a bad credential, `NotFound` for an unknown user.
    async fn resolve(&self, bearer: &str) -> Result<Principal, ApiError>;
}

/// JWT claims for user access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (the user's email).
    pub sub: String,
    /// Expiration time.
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
}

/// HS256 access tokens whose subject is the user's email.
pub struct JwtIdentity {
    keys: Option<(EncodingKey, DecodingKey)>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl JwtIdentity {
    /// Create a resolver. Without a secret every real token is rejected.
    #[must_use]
    pub fn new(secret: Option<&str>, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let keys = secret.map(|s| {
            (
                EncodingKey::from_secret(s.as_bytes()),
                DecodingKey::from_secret(s.as_bytes()),
            )
        });
        if keys.is_none() {
            tracing::warn!("AUTH_SECRET not configured - user tokens will be rejected");
        }
        Self { keys, store, clock }
    }

    /// Issue a token for `email`, valid for `ttl_seconds`.
    ///
    /// # Errors
    ///
    /// `Internal` if no secret is configured or encoding fails.
    pub fn issue(&self, email: &str, ttl_seconds: u64) -> Result<String, ApiError> {
        let (encoding, _) = self
            .keys
            .as_ref()
            .ok_or_else(|| ApiError::Internal("token secret not configured".into()))?;
        let now = jsonwebtoken::get_current_timestamp();
        let claims = JwtClaims {
            sub: email.to_string(),
            exp: now + ttl_seconds,
            iat: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, encoding)
            .map_err(|e| ApiError::Internal(e.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentity {
    fn verify(&self, bearer: &str) -> Result<String, ApiError> {
        // Allow test tokens in testing only.
        // This bypass is gated behind #[cfg(test)] or the "test-auth" feature
        // to ensure it is never active in production builds.
        #[cfg(any(test, feature = "test-auth"))]
        if let Some(email) = bearer.strip_prefix("test-token:") {
            return Ok(email.to_string());
        }

        let (_, decoding) = self.keys.as_ref().ok_or(ApiError::Unauthorized)?;
        let token = decode::<JwtClaims>(bearer, decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                ApiError::Unauthorized
            })?;
        Ok(token.claims.sub)
    }

    async fn resolve(&self, bearer: &str) -> Result<Principal, ApiError> {
        let email = self.verify(bearer)?;
        let user = self
            .store
            .get_user_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("no account for {email}")))?;
        let is_premium = user.is_premium_at(self.clock.now());
        Ok(Principal { user, is_premium })
    }
}

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)
}

/// A verified bearer token whose user may not exist yet.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    /// The email the token was issued for.
    pub email: String,
}

impl FromRequestParts<Arc<AppState>> for AuthClaims {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token = bearer_token(parts)?;
            let email = state.identity.verify(token)?;
            Ok(AuthClaims { email })
        })
    }
}

/// An authenticated end user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The stored user.
    pub user: User,
    /// Premium status at request time.
    pub is_premium: bool,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token = bearer_token(parts)?;
            let Principal { user, is_premium } = state.identity.resolve(token).await?;
            Ok(AuthUser { user, is_premium })
        })
    }
}

/// Service authentication via API key.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            // Check for X-API-Key header
            let api_key = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .service_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(api_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            let service_name = parts
                .headers
                .get("x-service-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

/// Admin authentication via the `X-Admin-Key` header.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let admin_key = parts
                .headers
                .get("x-admin-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .admin_api_key
                .as_ref()
                .ok_or(ApiError::Forbidden)?;

            if !constant_time_eq(admin_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            let admin_id = parts
                .headers
                .get("x-admin-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("admin")
                .to_string();

            tracing::info!(admin_id = %admin_id, "Admin authenticated");

            Ok(AdminAuth { admin_id })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use synapse_core::SystemClock;
    use synapse_store::MemoryStore;

    fn identity(secret: Option<&str>) -> (JwtIdentity, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            JwtIdentity::new(secret, store.clone(), Arc::new(SystemClock)),
            store,
        )
    }

    #[test]
    fn issued_token_verifies() {
        let (identity, _) = identity(Some("s3cret"));
        let token = identity.issue("ada@example.com", 60).unwrap();
        assert_eq!(identity.verify(&token).unwrap(), "ada@example.com");
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let (issuer, _) = identity(Some("one"));
        let (verifier, _) = identity(Some("two"));
        let token = issuer.issue("ada@example.com", 60).unwrap();
        assert!(matches!(verifier.verify(&token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn no_secret_rejects_real_tokens() {
        let (issuer, _) = identity(Some("one"));
        let (verifier, _) = identity(None);
        let token = issuer.issue("ada@example.com", 60).unwrap();
        assert!(matches!(verifier.verify(&token), Err(ApiError::Unauthorized)));
        assert!(verifier.issue("ada@example.com", 60).is_err());
    }

    #[test]
    fn test_tokens_accepted_in_tests() {
        let (identity, _) = identity(None);
        assert_eq!(
            identity.verify("test-token:bob@example.com").unwrap(),
            "bob@example.com"
        );
    }

    #[tokio::test]
    async fn resolve_loads_the_user() {
        let (identity, store) = identity(Some("s3cret"));
        let mut user = User::new("ada", "ada@example.com", Utc::now());
        user.grant_premium(Utc::now(), 30);
        store.create_user(&user).await.unwrap();

        let token = identity.issue("ada@example.com", 60).unwrap();
        let principal = identity.resolve(&token).await.unwrap();
        assert_eq!(principal.user.id, user.id);
        assert!(principal.is_premium);

        let stranger = identity.issue("eve@example.com", 60).unwrap();
        assert!(matches!(
            identity.resolve(&stranger).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
