//! Core types for the Synapse backend.
//!
//! This crate holds everything about the credit allowance engine that does no
//! I/O:
//!
//! - **Identifiers**: `UserId`
//! - **Users and plans**: `User`, `PlanAuthority`, `Tier`, `Allowances`
//! - **Ledger**: `CreditLedger`, `CreditType`, `CreditSnapshot`
//! - **Reset policy**: `ResetPolicy`, `WatermarkMode`
//! - **Errors**: `CreditError` with a structured `ErrorKind`
//!
//! # Allowances
//!
//! Free users get 10 chat operations per hour and 5 image operations per UTC
//! day; both refill at a calendar year boundary. Premium users are not
//! metered.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod plan;
pub mod reset;
pub mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CreditError, ErrorKind, Result};
pub use ids::{IdError, UserId};
pub use ledger::{
    Allowance, CreditLedger, CreditSnapshot, CreditType, DEFAULT_CHAT_ALLOWANCE,
    DEFAULT_IMAGE_ALLOWANCE,
};
pub use plan::{
    Allowances, PlanAuthority, Tier, User, DEFAULT_PREMIUM_PERIOD_DAYS, MAX_PREMIUM_PERIOD_DAYS,
};
pub use reset::{ResetOutcome, ResetPolicy, WatermarkMode};
