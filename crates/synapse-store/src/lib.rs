//! Storage layer for Synapse.
//!
//! Users and their credit ledgers live behind the [`Store`] trait. Three
//! backends implement it:
//!
//! - [`MemoryStore`]: process-local maps, for tests and single-node demos
//! - [`RocksStore`]: `RocksDB` with optimistic transactions (feature `rocksdb-backend`)
//! - [`PgStore`]: `PostgreSQL` via `sqlx`, using row locks
//!
//! # Ledger updates
//!
//! All ledger mutations go through [`Store::update_ledger`], a single
//! read-modify-write that the backend makes atomic. Two concurrent
//! deductions against a ledger holding one credit can never both succeed.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use synapse_core::{Allowances, CreditLedger, CreditType, User};
//! use synapse_store::{MemoryStore, OnMissing, Store};
//!
//! # async fn example() -> synapse_store::Result<()> {
//! let store = MemoryStore::new();
//! let user = User::new("ada", "ada@example.com", Utc::now());
//! store.create_user(&user).await?;
//!
//! let seed = CreditLedger::new(user.id, Allowances::default(), Utc::now());
//! let update = store
//!     .update_ledger(&user.id, OnMissing::Create(seed), &|ledger| {
//!         ledger.consume(CreditType::Chat)
//!     })
//!     .await?;
//! assert_eq!(update.ledger.chat_allowance, 9);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use synapse_core::{CreditError, CreditLedger, User, UserId};

/// A ledger mutation run inside the store's transaction.
///
/// It may run more than once when a backend retries after a write conflict,
/// so it must depend only on the ledger it is given. Returning an error
/// rejects the operation, but whatever the mutation already changed is
/// still committed.
pub type LedgerMutation<'a> = &'a (dyn Fn(&mut CreditLedger) -> std::result::Result<(), CreditError>
         + Send
         + Sync);

/// A user mutation run inside the store's transaction.
pub type UserMutation<'a> = &'a (dyn Fn(&mut User) + Send + Sync);

/// What [`Store::update_ledger`] does when the user has no ledger yet.
#[derive(Debug, Clone)]
pub enum OnMissing {
    /// Insert this ledger first, in the same transaction.
    Create(CreditLedger),
    /// Fail with `StoreError::NotFound`.
    Fail,
}

/// Result of a committed ledger update.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    /// The ledger as committed.
    pub ledger: CreditLedger,
    /// Whether the ledger was created by this update.
    pub created: bool,
    /// The mutation's rejection, if it rejected.
    pub rejected: Option<CreditError>,
}

/// The storage trait defining all database operations.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the id, email or username is taken.
    async fn create_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    /// Get a user by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get the user linked to a Stripe customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>>;

    /// Apply `mutation` to a user atomically and return the result.
    ///
    /// The id, email and username are not changed by this call even if the
    /// mutation touches them.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user doesn't exist.
    /// - `StoreError::Duplicate` if the new Stripe customer is linked elsewhere.
    async fn update_user(&self, id: &UserId, mutation: UserMutation<'_>) -> Result<User>;

    /// Delete a user and, with it, the user's ledger.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn delete_user(&self, id: &UserId) -> Result<()>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Get a user's ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_ledger(&self, owner: &UserId) -> Result<Option<CreditLedger>>;

    /// Insert a ledger unless the owner already has one.
    ///
    /// Returns whether a ledger was inserted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the owner doesn't exist.
    async fn insert_ledger(&self, ledger: &CreditLedger) -> Result<bool>;

    /// Read, mutate and write back a ledger as one atomic operation.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the ledger is missing and `on_missing` is
    ///   `Fail`, or the owner doesn't exist.
    /// - `StoreError::Conflict` if concurrent writers could not be outlasted.
    async fn update_ledger(
        &self,
        owner: &UserId,
        on_missing: OnMissing,
        mutation: LedgerMutation<'_>,
    ) -> Result<LedgerUpdate>;

    /// Release backend resources. The store must not be used afterwards.
    async fn close(&self) {}
}
