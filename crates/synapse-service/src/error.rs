//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use synapse_core::{CreditError, ErrorKind};
use synapse_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("{0}")]
    BadRequest(String),

    /// Unrecognized credit type.
    #[error("{0}")]
    InvalidCreditType(String),

    /// Conflict - resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Allowance exhausted.
    #[error("{0}")]
    InsufficientCredit(String),

    /// The store failed transiently; retry with backoff.
    #[error("{0}")]
    StoreUnavailable(String),

    /// No generative provider is configured.
    #[error("{0}")]
    ProviderUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("{0}")]
    ExternalService(String),
}

impl ApiError {
    /// HTTP status and machine-readable code for this error.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::InvalidCreditType(_) => (StatusCode::BAD_REQUEST, "invalid_credit_type"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::InsufficientCredit(_) => (StatusCode::PAYMENT_REQUIRED, "insufficient_credit"),
            Self::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            Self::ProviderUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            Self::ExternalService(_) => (StatusCode::BAD_GATEWAY, "external_service_error"),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let detail = match &self {
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                "An internal error occurred".to_string()
            }
            Self::StoreUnavailable(msg) => {
                tracing::warn!(error = %msg, "Store unavailable");
                "Storage is temporarily unavailable, retry later".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { detail, code })).into_response()
    }
}

impl From<CreditError> for ApiError {
    fn from(err: CreditError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(err.to_string()),
            ErrorKind::InsufficientCredit => Self::InsufficientCredit(err.to_string()),
            ErrorKind::InvalidCreditType => Self::InvalidCreditType(err.to_string()),
            ErrorKind::InvalidId => Self::BadRequest(err.to_string()),
            ErrorKind::StoreUnavailable => Self::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Duplicate { .. } => Self::Conflict(err.to_string()),
            StoreError::Serialization(msg) => Self::Internal(msg),
            StoreError::Database(_) | StoreError::Conflict(_) => {
                Self::StoreUnavailable(err.to_string())
            }
        }
    }
}
