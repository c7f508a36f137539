//! Error types for storage.

use synapse_core::CreditError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record ("user", "ledger").
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// A unique field is already taken.
    #[error("{field} already taken: {value}")]
    Duplicate {
        /// The unique field.
        field: &'static str,
        /// The clashing value.
        value: String,
    },

    /// Concurrent writers kept invalidating the transaction.
    #[error("write conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub(crate) fn user_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "user",
            id: id.to_string(),
        }
    }

    pub(crate) fn ledger_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "ledger",
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for CreditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}
