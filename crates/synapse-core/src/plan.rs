//! Users and the plan/tier authority.
//!
//! Premium users bypass allowance checks entirely. Everyone else is metered
//! against the configured [`Allowances`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{DEFAULT_CHAT_ALLOWANCE, DEFAULT_IMAGE_ALLOWANCE};
use crate::UserId;

/// Default length of a paid premium period in days.
pub const DEFAULT_PREMIUM_PERIOD_DAYS: i64 = 30;

/// Longest premium period a single grant can give, in days.
pub const MAX_PREMIUM_PERIOD_DAYS: i64 = 3650;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID.
    pub id: UserId,

    /// Display name, unique.
    pub username: String,

    /// Email address, unique; the subject of access tokens.
    pub email: String,

    /// Premium flag, set by billing.
    pub is_premium: bool,

    /// When the paid premium period ends, if billing set one.
    #[serde(default, with = "crate::timestamp::lenient_option")]
    pub premium_expires_at: Option<DateTime<Utc>>,

    /// Stripe customer ID, once checkout has been started.
    #[serde(default)]
    pub stripe_customer_id: Option<String>,

    /// When the user registered.
    #[serde(with = "crate::timestamp::lenient")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new non-premium user.
    #[must_use]
    pub fn new(username: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::generate(),
            username: username.into(),
            email: email.into(),
            is_premium: false,
            premium_expires_at: None,
            stripe_customer_id: None,
            created_at: now,
        }
    }

    /// Whether the user counts as premium at `now`.
    ///
    /// A premium flag without an expiry never lapses.
    #[must_use]
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.map_or(true, |until| until > now)
    }

    /// Mark the user premium for `days` starting at `now`.
    ///
    /// `days` is clamped to `1..=MAX_PREMIUM_PERIOD_DAYS`.
    pub fn grant_premium(&mut self, now: DateTime<Utc>, days: i64) {
        let days = days.clamp(1, MAX_PREMIUM_PERIOD_DAYS);
        self.is_premium = true;
        self.premium_expires_at = Some(now + Duration::days(days));
    }
}

/// Allowance quantities restored by replenishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowances {
    /// Chat operations per hour.
    pub chat: u32,
    /// Image operations per day.
    pub image: u32,
}

impl Default for Allowances {
    fn default() -> Self {
        Self {
            chat: DEFAULT_CHAT_ALLOWANCE,
            image: DEFAULT_IMAGE_ALLOWANCE,
        }
    }
}

/// How a user is metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Premium: no allowance checks.
    Unlimited,
    /// Metered against these allowances.
    Metered(Allowances),
}

/// Supplies premium status and allowance quantities.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanAuthority {
    allowances: Allowances,
}

impl PlanAuthority {
    /// Create an authority granting `allowances` to metered users.
    #[must_use]
    pub const fn new(allowances: Allowances) -> Self {
        Self { allowances }
    }

    /// Allowances for metered users.
    #[must_use]
    pub const fn allowances(&self) -> Allowances {
        self.allowances
    }

    /// Resolve how `user` is metered at `now`.
    #[must_use]
    pub fn tier(&self, user: &User, now: DateTime<Utc>) -> Tier {
        if user.is_premium_at(now) {
            Tier::Unlimited
        } else {
            Tier::Metered(self.allowances)
        }
    }
}
