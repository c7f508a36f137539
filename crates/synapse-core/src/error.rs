//! Error taxonomy for credit operations.
//!
//! Every failure carries an [`ErrorKind`] so callers can branch on the
//! category without matching on message text.

use crate::ids::IdError;
use crate::ledger::CreditType;

/// Result type for credit operations.
pub type Result<T> = std::result::Result<T, CreditError>;

/// Errors that can occur while checking or deducting allowances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditError {
    /// A user or ledger is absent where absence is not auto-healed.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What was looked up ("user", "ledger").
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The allowance for the requested type is exhausted.
    #[error("no {credit_type} credits left")]
    InsufficientCredit {
        /// The allowance that ran out.
        credit_type: CreditType,
    },

    /// The caller supplied an unrecognized credit type.
    #[error("invalid credit type '{0}', use 'chat' or 'image'")]
    InvalidCreditType(String),

    /// The durable store failed; the caller may retry with backoff.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

/// Category of a [`CreditError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User or ledger missing.
    NotFound,
    /// Allowance exhausted.
    InsufficientCredit,
    /// Unknown credit type string.
    InvalidCreditType,
    /// Malformed identifier.
    InvalidId,
    /// Transient store failure.
    StoreUnavailable,
}

impl CreditError {
    /// Shorthand for a missing user.
    #[must_use]
    pub fn user_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "user",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing ledger.
    #[must_use]
    pub fn ledger_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "ledger",
            id: id.to_string(),
        }
    }

    /// The category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientCredit { .. } => ErrorKind::InsufficientCredit,
            Self::InvalidCreditType(_) => ErrorKind::InvalidCreditType,
            Self::InvalidId(_) => ErrorKind::InvalidId,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Whether retrying the same call later can succeed without other changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::StoreUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        assert_eq!(
            CreditError::user_not_found("u1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CreditError::InsufficientCredit {
                credit_type: CreditType::Chat
            }
            .kind(),
            ErrorKind::InsufficientCredit
        );
        assert_eq!(
            CreditError::InvalidCreditType("video".into()).kind(),
            ErrorKind::InvalidCreditType
        );
    }

    #[test]
    fn bad_credit_type_and_bad_id_are_different_kinds() {
        let bad_type = CreditError::InvalidCreditType("bogus".into());
        let bad_id = CreditError::from("not-a-uuid".parse::<crate::UserId>().unwrap_err());

        assert_eq!(bad_id.kind(), ErrorKind::InvalidId);
        assert_ne!(bad_type.kind(), bad_id.kind());
    }

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(CreditError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!CreditError::InsufficientCredit {
            credit_type: CreditType::Image
        }
        .is_retryable());
    }

    #[test]
    fn messages_name_the_credit_type() {
        let err = CreditError::InsufficientCredit {
            credit_type: CreditType::Chat,
        };
        assert_eq!(err.to_string(), "no chat credits left");
    }
}
