//! Time-windowed replenishment rules.
//!
//! Three independent rules are evaluated on every check and all that apply
//! fire in the same pass:
//!
//! 1. **Hourly chat**: at least one hour since the watermark restores the
//!    chat allowance.
//! 2. **Daily image**: a different UTC calendar date than the watermark
//!    restores the image allowance.
//! 3. **Yearly full**: a different UTC calendar year restores both.
//!
//! In [`WatermarkMode::AdvanceOnCheck`] the watermark then moves to `now`
//! whether or not anything fired, so the next window is measured from the
//! last *check*. [`WatermarkMode::AdvanceOnReplenish`] only moves it when a
//! rule fired.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::CreditLedger;
use crate::plan::Allowances;

/// When the watermark advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkMode {
    /// Every check moves the watermark to `now`.
    #[default]
    AdvanceOnCheck,
    /// Only a check where some rule fired moves the watermark.
    AdvanceOnReplenish,
}

impl std::str::FromStr for WatermarkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advance_on_check" | "check" => Ok(Self::AdvanceOnCheck),
            "advance_on_replenish" | "replenish" => Ok(Self::AdvanceOnReplenish),
            other => Err(format!("unknown watermark mode: {other}")),
        }
    }
}

/// Which rules fired during one [`ResetPolicy::apply`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetOutcome {
    /// The chat allowance was restored.
    pub chat_replenished: bool,
    /// The image allowance was restored.
    pub image_replenished: bool,
    /// The calendar year rolled over.
    pub yearly: bool,
}

impl ResetOutcome {
    /// Whether any rule fired.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.chat_replenished || self.image_replenished
    }
}

/// The replenishment rules with their restore quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetPolicy {
    /// Quantities restored when a rule fires.
    pub allowances: Allowances,
    /// Watermark behavior.
    pub watermark: WatermarkMode,
}

impl ResetPolicy {
    /// Length of the chat window in seconds.
    pub const CHAT_WINDOW_SECS: i64 = 3600;

    /// Create a policy.
    #[must_use]
    pub const fn new(allowances: Allowances, watermark: WatermarkMode) -> Self {
        Self {
            allowances,
            watermark,
        }
    }

    /// Apply every rule to `ledger` as of `now`.
    ///
    /// Pure with respect to `now`. A `now` before the watermark (clock skew)
    /// fires nothing and leaves the watermark where it is, keeping it
    /// non-decreasing.
    pub fn apply(&self, ledger: &mut CreditLedger, now: DateTime<Utc>) -> ResetOutcome {
        let last = ledger.last_reset_at;
        if now < last {
            return ResetOutcome::default();
        }

        let mut outcome = ResetOutcome::default();

        if now - last >= Duration::seconds(Self::CHAT_WINDOW_SECS) {
            ledger.chat_allowance = self.allowances.chat;
            outcome.chat_replenished = true;
        }

        if now.date_naive() != last.date_naive() {
            ledger.image_allowance = self.allowances.image;
            outcome.image_replenished = true;
        }

        if now.year() != last.year() {
            ledger.chat_allowance = self.allowances.chat;
            ledger.image_allowance = self.allowances.image;
            outcome.chat_replenished = true;
            outcome.image_replenished = true;
            outcome.yearly = true;
        }

        match self.watermark {
            WatermarkMode::AdvanceOnCheck => ledger.last_reset_at = now,
            WatermarkMode::AdvanceOnReplenish if outcome.any() => ledger.last_reset_at = now,
            WatermarkMode::AdvanceOnReplenish => {}
        }

        outcome
    }
}
