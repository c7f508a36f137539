//! API handlers.

pub mod accounts;
pub mod ai;
pub mod credits;
pub mod health;
pub mod webhooks;
