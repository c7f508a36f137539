//! In-memory storage backend.
//!
//! Everything sits behind one `RwLock`; ledger mutations run while the write
//! guard is held, which makes each update atomic within the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use synapse_core::{CreditLedger, User, UserId};

use crate::error::{Result, StoreError};
use crate::{LedgerMutation, LedgerUpdate, OnMissing, Store, UserMutation};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    ledgers: HashMap<UserId, CreditLedger>,
}

/// Process-local storage backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate {
                field: "id",
                value: user.id.to_string(),
            });
        }
        for existing in tables.users.values() {
            if existing.email.eq_ignore_ascii_case(&user.email) {
                return Err(StoreError::Duplicate {
                    field: "email",
                    value: user.email.clone(),
                });
            }
            if existing.username == user.username {
                return Err(StoreError::Duplicate {
                    field: "username",
                    value: user.username.clone(),
                });
            }
        }

        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn update_user(&self, id: &UserId, mutation: UserMutation<'_>) -> Result<User> {
        let mut tables = self.tables.write().await;

        let current = tables
            .users
            .get(id)
            .ok_or_else(|| StoreError::user_not_found(id))?;
        let mut updated = current.clone();
        mutation(&mut updated);
        updated.id = current.id;
        updated.email.clone_from(&current.email);
        updated.username.clone_from(&current.username);

        if let Some(customer) = &updated.stripe_customer_id {
            let taken = tables
                .users
                .values()
                .any(|u| u.id != *id && u.stripe_customer_id.as_ref() == Some(customer));
            if taken {
                return Err(StoreError::Duplicate {
                    field: "stripe_customer_id",
                    value: customer.clone(),
                });
            }
        }

        tables.users.insert(*id, updated.clone());
        Ok(updated)
    }

    async fn delete_user(&self, id: &UserId) -> Result<()> {
        let mut tables = self.tables.write().await;

        tables
            .users
            .remove(id)
            .ok_or_else(|| StoreError::user_not_found(id))?;
        tables.ledgers.remove(id);
        Ok(())
    }

    async fn get_ledger(&self, owner: &UserId) -> Result<Option<CreditLedger>> {
        Ok(self.tables.read().await.ledgers.get(owner).cloned())
    }

    async fn insert_ledger(&self, ledger: &CreditLedger) -> Result<bool> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&ledger.owner_id) {
            return Err(StoreError::user_not_found(ledger.owner_id));
        }
        if tables.ledgers.contains_key(&ledger.owner_id) {
            return Ok(false);
        }
        tables.ledgers.insert(ledger.owner_id, ledger.clone());
        Ok(true)
    }

    async fn update_ledger(
        &self,
        owner: &UserId,
        on_missing: OnMissing,
        mutation: LedgerMutation<'_>,
    ) -> Result<LedgerUpdate> {
        let mut tables = self.tables.write().await;

        let (mut ledger, created) = match (tables.ledgers.get(owner), on_missing) {
            (Some(existing), _) => (existing.clone(), false),
            (None, OnMissing::Fail) => return Err(StoreError::ledger_not_found(owner)),
            (None, OnMissing::Create(mut seed)) => {
                if !tables.users.contains_key(owner) {
                    return Err(StoreError::user_not_found(owner));
                }
                seed.owner_id = *owner;
                (seed, true)
            }
        };

        let rejected = mutation(&mut ledger).err();
        tables.ledgers.insert(*owner, ledger.clone());

        Ok(LedgerUpdate {
            ledger,
            created,
            rejected,
        })
    }
}
