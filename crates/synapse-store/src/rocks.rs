//! `RocksDB` storage implementation.
//!
//! Uses an `OptimisticTransactionDB`: every read-modify-write reads its keys
//! with `get_for_update_cf` and commits; if another writer touched those keys
//! in between, the commit fails with `Busy` and the whole body runs again on
//! fresh data.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, ErrorKind, MultiThreaded, OptimisticTransactionDB,
    Options, Transaction,
};

use synapse_core::{CreditLedger, User, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{LedgerMutation, LedgerUpdate, OnMissing, Store, UserMutation};

type Db = OptimisticTransactionDB<MultiThreaded>;

/// Attempts before a contended transaction gives up with `StoreError::Conflict`.
const MAX_TXN_ATTEMPTS: u32 = 32;

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Read `key` for update and report whether it holds a value.
fn key_taken(
    txn: &Transaction<'_, Db>,
    cf: &Arc<BoundColumnFamily<'_>>,
    key: &[u8],
) -> Result<bool> {
    txn.get_for_update_cf(cf, key, true)
        .map(|v| v.is_some())
        .map_err(db_err)
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, path, cf_descriptors).map_err(db_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Run `body` in an optimistic transaction, retrying on write conflicts.
    ///
    /// An error from `body` drops the transaction, discarding its writes.
    fn transact<T>(&self, mut body: impl FnMut(&Transaction<'_, Db>) -> Result<T>) -> Result<T> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let txn = self.db.transaction();
            let value = body(&txn)?;
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                    tracing::debug!(attempt, error = %e, "Write conflict, retrying transaction");
                }
                Err(e) => return Err(db_err(e)),
            }
        }
        Err(StoreError::Conflict(format!(
            "transaction aborted after {MAX_TXN_ATTEMPTS} conflicting attempts"
        )))
    }

    fn read_user(&self, id: &UserId) -> Result<Option<User>> {
        let users = self.cf(cf::USERS)?;
        self.db
            .get_cf(&users, keys::user_key(id))
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_indexed_user(&self, index: &str, key: &[u8]) -> Result<Option<User>> {
        let cf = self.cf(index)?;
        let Some(value) = self.db.get_cf(&cf, key).map_err(db_err)? else {
            return Ok(None);
        };
        let id = keys::decode_user_id(&value)
            .ok_or_else(|| StoreError::Serialization(format!("corrupt {index} entry")))?;
        self.read_user(&id)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    async fn create_user(&self, user: &User) -> Result<()> {
        let users = self.cf(cf::USERS)?;
        let by_email = self.cf(cf::USERS_BY_EMAIL)?;
        let by_username = self.cf(cf::USERS_BY_USERNAME)?;
        let by_stripe = self.cf(cf::USERS_BY_STRIPE_CUSTOMER)?;

        let user_key = keys::user_key(&user.id);
        let email_key = keys::email_key(&user.email);
        let username_key = keys::username_key(&user.username);
        let value = Self::serialize(user)?;

        self.transact(|txn| {
            if key_taken(txn, &users, &user_key)? {
                return Err(StoreError::Duplicate {
                    field: "id",
                    value: user.id.to_string(),
                });
            }
            if key_taken(txn, &by_email, &email_key)? {
                return Err(StoreError::Duplicate {
                    field: "email",
                    value: user.email.clone(),
                });
            }
            if key_taken(txn, &by_username, &username_key)? {
                return Err(StoreError::Duplicate {
                    field: "username",
                    value: user.username.clone(),
                });
            }

            txn.put_cf(&users, &user_key, &value).map_err(db_err)?;
            txn.put_cf(&by_email, &email_key, &user_key).map_err(db_err)?;
            txn.put_cf(&by_username, &username_key, &user_key)
                .map_err(db_err)?;
            if let Some(customer) = &user.stripe_customer_id {
                txn.put_cf(&by_stripe, keys::stripe_customer_key(customer), &user_key)
                    .map_err(db_err)?;
            }
            Ok(())
        })
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        self.read_user(id)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.read_indexed_user(cf::USERS_BY_EMAIL, &keys::email_key(email))
    }

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>> {
        self.read_indexed_user(
            cf::USERS_BY_STRIPE_CUSTOMER,
            &keys::stripe_customer_key(customer_id),
        )
    }

    async fn update_user(&self, id: &UserId, mutation: UserMutation<'_>) -> Result<User> {
        let users = self.cf(cf::USERS)?;
        let by_stripe = self.cf(cf::USERS_BY_STRIPE_CUSTOMER)?;
        let user_key = keys::user_key(id);

        self.transact(|txn| {
            let raw = txn
                .get_for_update_cf(&users, &user_key, true)
                .map_err(db_err)?
                .ok_or_else(|| StoreError::user_not_found(id))?;
            let current: User = Self::deserialize(&raw)?;

            let mut updated = current.clone();
            mutation(&mut updated);
            updated.id = current.id;
            updated.email.clone_from(&current.email);
            updated.username.clone_from(&current.username);

            if updated.stripe_customer_id != current.stripe_customer_id {
                if let Some(customer) = &updated.stripe_customer_id {
                    let key = keys::stripe_customer_key(customer);
                    let owner = txn
                        .get_for_update_cf(&by_stripe, &key, true)
                        .map_err(db_err)?
                        .and_then(|v| keys::decode_user_id(&v));
                    if owner.is_some_and(|owner| owner != *id) {
                        return Err(StoreError::Duplicate {
                            field: "stripe_customer_id",
                            value: customer.clone(),
                        });
                    }
                    txn.put_cf(&by_stripe, &key, &user_key).map_err(db_err)?;
                }
                if let Some(old) = &current.stripe_customer_id {
                    txn.delete_cf(&by_stripe, keys::stripe_customer_key(old))
                        .map_err(db_err)?;
                }
            }

            txn.put_cf(&users, &user_key, Self::serialize(&updated)?)
                .map_err(db_err)?;
            Ok(updated)
        })
    }

    async fn delete_user(&self, id: &UserId) -> Result<()> {
        let users = self.cf(cf::USERS)?;
        let ledgers = self.cf(cf::LEDGERS)?;
        let by_email = self.cf(cf::USERS_BY_EMAIL)?;
        let by_username = self.cf(cf::USERS_BY_USERNAME)?;
        let by_stripe = self.cf(cf::USERS_BY_STRIPE_CUSTOMER)?;
        let user_key = keys::user_key(id);

        self.transact(|txn| {
            let raw = txn
                .get_for_update_cf(&users, &user_key, true)
                .map_err(db_err)?
                .ok_or_else(|| StoreError::user_not_found(id))?;
            let user: User = Self::deserialize(&raw)?;

            // Track the ledger so a concurrent update conflicts with the delete.
            txn.get_for_update_cf(&ledgers, &user_key, true)
                .map_err(db_err)?;

            txn.delete_cf(&users, &user_key).map_err(db_err)?;
            txn.delete_cf(&ledgers, &user_key).map_err(db_err)?;
            txn.delete_cf(&by_email, keys::email_key(&user.email))
                .map_err(db_err)?;
            txn.delete_cf(&by_username, keys::username_key(&user.username))
                .map_err(db_err)?;
            if let Some(customer) = &user.stripe_customer_id {
                txn.delete_cf(&by_stripe, keys::stripe_customer_key(customer))
                    .map_err(db_err)?;
            }
            Ok(())
        })
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn get_ledger(&self, owner: &UserId) -> Result<Option<CreditLedger>> {
        let ledgers = self.cf(cf::LEDGERS)?;
        self.db
            .get_cf(&ledgers, keys::user_key(owner))
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    async fn insert_ledger(&self, ledger: &CreditLedger) -> Result<bool> {
        let users = self.cf(cf::USERS)?;
        let ledgers = self.cf(cf::LEDGERS)?;
        let key = keys::user_key(&ledger.owner_id);
        let value = Self::serialize(ledger)?;

        self.transact(|txn| {
            if txn
                .get_for_update_cf(&users, &key, true)
                .map_err(db_err)?
                .is_none()
            {
                return Err(StoreError::user_not_found(ledger.owner_id));
            }
            if txn
                .get_for_update_cf(&ledgers, &key, true)
                .map_err(db_err)?
                .is_some()
            {
                return Ok(false);
            }
            txn.put_cf(&ledgers, &key, &value).map_err(db_err)?;
            Ok(true)
        })
    }

    async fn update_ledger(
        &self,
        owner: &UserId,
        on_missing: OnMissing,
        mutation: LedgerMutation<'_>,
    ) -> Result<LedgerUpdate> {
        let users = self.cf(cf::USERS)?;
        let ledgers = self.cf(cf::LEDGERS)?;
        let key = keys::user_key(owner);

        self.transact(|txn| {
            let stored = txn
                .get_for_update_cf(&ledgers, &key, true)
                .map_err(db_err)?;

            let (mut ledger, created) = match (stored, &on_missing) {
                (Some(raw), _) => (Self::deserialize::<CreditLedger>(&raw)?, false),
                (None, OnMissing::Fail) => return Err(StoreError::ledger_not_found(owner)),
                (None, OnMissing::Create(seed)) => {
                    if txn
                        .get_for_update_cf(&users, &key, true)
                        .map_err(db_err)?
                        .is_none()
                    {
                        return Err(StoreError::user_not_found(owner));
                    }
                    let mut seed = seed.clone();
                    seed.owner_id = *owner;
                    (seed, true)
                }
            };

            let rejected = mutation(&mut ledger).err();
            txn.put_cf(&ledgers, &key, Self::serialize(&ledger)?)
                .map_err(db_err)?;

            Ok(LedgerUpdate {
                ledger,
                created,
                rejected,
            })
        })
    }
}
