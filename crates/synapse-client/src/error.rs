//! Client error types.

/// Errors that can occur when using the synapse client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The allowance for the requested type is exhausted.
    #[error("insufficient credit: {message}")]
    InsufficientCredit {
        /// Server message.
        message: String,
    },

    /// The user does not exist.
    #[error("user not found: {message}")]
    UserNotFound {
        /// Server message.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether the request was refused for lack of credit.
    #[must_use]
    pub fn is_insufficient_credit(&self) -> bool {
        matches!(self, Self::InsufficientCredit { .. })
    }

    /// HTTP status of a server-side failure, if there was a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::InsufficientCredit { .. } => Some(402),
            Self::UserNotFound { .. } => Some(404),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Serialization(_) | Self::Configuration(_) => None,
        }
    }
}
