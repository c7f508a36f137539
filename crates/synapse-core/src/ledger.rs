//! The per-user credit ledger.
//!
//! A ledger holds the remaining chat and image allowances of one user and
//! the watermark used by the reset rules. Counters are unsigned, so a
//! committed ledger can never be observed below zero.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CreditError;
use crate::plan::Allowances;
use crate::UserId;

/// Default chat operations per replenishment window.
pub const DEFAULT_CHAT_ALLOWANCE: u32 = 10;

/// Default image operations per replenishment window.
pub const DEFAULT_IMAGE_ALLOWANCE: u32 = 5;

/// A user's remaining allowances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedger {
    /// The owning user. The user record controls the ledger's lifetime.
    pub owner_id: UserId,

    /// Remaining chat operations.
    pub chat_allowance: u32,

    /// Remaining image operations.
    pub image_allowance: u32,

    /// The last instant a replenishment check ran.
    #[serde(with = "crate::timestamp::lenient")]
    pub last_reset_at: DateTime<Utc>,
}

impl CreditLedger {
    /// Create a full ledger whose watermark starts at `now`.
    #[must_use]
    pub fn new(owner_id: UserId, allowances: Allowances, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            chat_allowance: allowances.chat,
            image_allowance: allowances.image,
            last_reset_at: now,
        }
    }

    /// Remaining allowance of the given type.
    #[must_use]
    pub const fn remaining(&self, credit_type: CreditType) -> u32 {
        match credit_type {
            CreditType::Chat => self.chat_allowance,
            CreditType::Image => self.image_allowance,
        }
    }

    /// Take one unit of the given allowance.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::InsufficientCredit` when the allowance is zero;
    /// the ledger is left untouched in that case.
    pub fn consume(&mut self, credit_type: CreditType) -> Result<(), CreditError> {
        let counter = match credit_type {
            CreditType::Chat => &mut self.chat_allowance,
            CreditType::Image => &mut self.image_allowance,
        };
        *counter = counter
            .checked_sub(1)
            .ok_or(CreditError::InsufficientCredit { credit_type })?;
        Ok(())
    }

    /// Snapshot of the counters as reported to callers.
    #[must_use]
    pub fn snapshot(&self) -> CreditSnapshot {
        CreditSnapshot {
            chat_credits: Allowance::Limited(self.chat_allowance),
            image_credits: Allowance::Limited(self.image_allowance),
            last_reset: Some(self.last_reset_at),
        }
    }
}

/// The kind of metered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    /// A chat completion.
    Chat,
    /// An image generation.
    Image,
}

impl CreditType {
    /// Wire name of the credit type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for CreditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditType {
    type Err = CreditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "image" => Ok(Self::Image),
            other => Err(CreditError::InvalidCreditType(other.to_string())),
        }
    }
}

/// A reported allowance: a count, or unlimited for premium users.
///
/// Serializes as a JSON number or the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    /// Remaining operations.
    Limited(u32),
    /// No limit applies.
    Unlimited,
}

const UNLIMITED: &str = "unlimited";

impl Serialize for Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_str(UNLIMITED),
        }
    }
}

impl<'de> Deserialize<'de> for Allowance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Self::Limited(n)),
            Raw::Text(s) if s == UNLIMITED => Ok(Self::Unlimited),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected a count or \"{UNLIMITED}\", got \"{s}\""
            ))),
        }
    }
}

/// Counters returned from a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSnapshot {
    /// Remaining chat operations.
    pub chat_credits: Allowance,
    /// Remaining image operations.
    pub image_credits: Allowance,
    /// Watermark after the call; `None` for premium users.
    #[serde(default, with = "crate::timestamp::lenient_option")]
    pub last_reset: Option<DateTime<Utc>>,
}

impl CreditSnapshot {
    /// The premium sentinel: both allowances unlimited, no watermark.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            chat_credits: Allowance::Unlimited,
            image_credits: Allowance::Unlimited,
            last_reset: None,
        }
    }

    /// Whether this is the premium sentinel.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.chat_credits == Allowance::Unlimited && self.image_credits == Allowance::Unlimited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> CreditLedger {
        CreditLedger::new(UserId::generate(), Allowances::default(), Utc::now())
    }

    #[test]
    fn new_ledger_has_defaults() {
        let ledger = ledger();
        assert_eq!(ledger.chat_allowance, DEFAULT_CHAT_ALLOWANCE);
        assert_eq!(ledger.image_allowance, DEFAULT_IMAGE_ALLOWANCE);
    }

    #[test]
    fn consume_stops_at_zero() {
        let mut ledger = ledger();
        ledger.image_allowance = 1;

        ledger.consume(CreditType::Image).unwrap();
        assert_eq!(ledger.image_allowance, 0);

        let err = ledger.consume(CreditType::Image).unwrap_err();
        assert_eq!(
            err,
            CreditError::InsufficientCredit {
                credit_type: CreditType::Image
            }
        );
        assert_eq!(ledger.image_allowance, 0);
        assert_eq!(ledger.chat_allowance, DEFAULT_CHAT_ALLOWANCE);
    }

    #[test]
    fn credit_type_parsing() {
        assert_eq!("chat".parse::<CreditType>().unwrap(), CreditType::Chat);
        assert_eq!("image".parse::<CreditType>().unwrap(), CreditType::Image);
        assert!(matches!(
            "Chat".parse::<CreditType>(),
            Err(CreditError::InvalidCreditType(s)) if s == "Chat"
        ));
    }

    #[test]
    fn allowance_json_shape() {
        assert_eq!(serde_json::to_value(Allowance::Limited(3)).unwrap(), 3);
        assert_eq!(
            serde_json::to_value(Allowance::Unlimited).unwrap(),
            "unlimited"
        );
        let parsed: Allowance = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(parsed, Allowance::Unlimited);
        assert!(serde_json::from_str::<Allowance>("\"lots\"").is_err());
    }

    #[test]
    fn unlimited_sentinel_serializes_null_watermark() {
        let json = serde_json::to_value(CreditSnapshot::unlimited()).unwrap();
        assert_eq!(json["chat_credits"], "unlimited");
        assert_eq!(json["image_credits"], "unlimited");
        assert!(json["last_reset"].is_null());
    }

    #[test]
    fn ledger_reads_legacy_naive_watermark() {
        let owner = UserId::generate();
        let json = serde_json::json!({
            "owner_id": owner.to_string(),
            "chat_allowance": 4,
            "image_allowance": 2,
            "last_reset_at": "2024-05-01 08:30:00.000001",
        });
        let ledger: CreditLedger = serde_json::from_value(json).unwrap();
        assert_eq!(ledger.owner_id, owner);
        assert_eq!(ledger.last_reset_at.to_rfc3339(), "2024-05-01T08:30:00.000001+00:00");
    }
}
