//! Synapse Client SDK.
//!
//! Lets a service that gates AI calls on its own check and spend a user's
//! credits through the synapse API.
//!
//! # Example
//!
//! ```no_run
//! use synapse_client::{CreditType, SynapseClient};
//!
//! # async fn example() -> Result<(), synapse_client::ClientError> {
//! let client = SynapseClient::new("http://synapse:8080", "your-service-api-key")?;
//!
//! match client.deduct("7b0c7c0e-2f39-4b43-9d7e-5f4f3f0f6a11", CreditType::Chat).await {
//!     Ok(receipt) => println!("chat left: {:?}", receipt.updated_credits.chat_credits),
//!     Err(e) if e.is_insufficient_credit() => println!("out of chat credits"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, SynapseClient};
pub use error::ClientError;
pub use synapse_core::{Allowance, CreditSnapshot, CreditType};
pub use types::*;
