//! `PostgreSQL` storage backend.
//!
//! Ledger updates lock the ledger row with `SELECT ... FOR UPDATE` for the
//! length of the transaction, so concurrent deductions queue up behind one
//! another instead of racing. Lazy creation uses
//! `INSERT ... ON CONFLICT DO NOTHING`, which leaves exactly one ledger per
//! user however many requests create it at once.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use synapse_core::{CreditLedger, User, UserId};

use crate::error::{Result, StoreError};
use crate::{LedgerMutation, LedgerUpdate, OnMissing, Store, UserMutation};

const USER_COLUMNS: &str =
    "id, username, email, is_premium, premium_expires_at, stripe_customer_id, created_at";
const LEDGER_COLUMNS: &str = "owner_id, chat_allowance, image_allowance, last_reset_at";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    is_premium: bool,
    premium_expires_at: Option<DateTime<Utc>>,
    stripe_customer_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            username: row.username,
            email: row.email,
            is_premium: row.is_premium,
            premium_expires_at: row.premium_expires_at,
            stripe_customer_id: row.stripe_customer_id,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct LedgerRow {
    owner_id: Uuid,
    chat_allowance: i64,
    image_allowance: i64,
    last_reset_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for CreditLedger {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        let allowance = |value: i64| {
            u32::try_from(value).map_err(|_| {
                StoreError::Serialization(format!(
                    "ledger {} holds out-of-range allowance {value}",
                    row.owner_id
                ))
            })
        };
        Ok(Self {
            owner_id: UserId::from_uuid(row.owner_id),
            chat_allowance: allowance(row.chat_allowance)?,
            image_allowance: allowance(row.image_allowance)?,
            last_reset_at: row.last_reset_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Name of the unique constraint `e` violated, if it is a unique violation.
fn unique_violation(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_owned())
        }
        _ => None,
    }
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}"))
                .bind(value)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.is_premium)
        .bind(user.premium_expires_at)
        .bind(&user.stripe_customer_id)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(c) if c.contains("email") => StoreError::Duplicate {
                field: "email",
                value: user.email.clone(),
            },
            Some(c) if c.contains("username") => StoreError::Duplicate {
                field: "username",
                value: user.username.clone(),
            },
            Some(c) if c.contains("stripe_customer") => StoreError::Duplicate {
                field: "stripe_customer_id",
                value: user.stripe_customer_id.clone().unwrap_or_default(),
            },
            Some(_) => StoreError::Duplicate {
                field: "id",
                value: user.id.to_string(),
            },
            None => db_err(e),
        })?;
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_user("lower(email) = lower($1)", email.trim())
            .await
    }

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>> {
        self.fetch_user("stripe_customer_id = $1", customer_id).await
    }

    async fn update_user(&self, id: &UserId, mutation: UserMutation<'_>) -> Result<User> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let current = User::from(row.ok_or_else(|| StoreError::user_not_found(id))?);

        let mut updated = current.clone();
        mutation(&mut updated);
        updated.id = current.id;
        updated.email.clone_from(&current.email);
        updated.username.clone_from(&current.username);

        sqlx::query(
            "UPDATE users SET is_premium = $2, premium_expires_at = $3, stripe_customer_id = $4 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(updated.is_premium)
        .bind(updated.premium_expires_at)
        .bind(&updated.stripe_customer_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => StoreError::Duplicate {
                field: "stripe_customer_id",
                value: updated.stripe_customer_id.clone().unwrap_or_default(),
            },
            None => db_err(e),
        })?;

        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn delete_user(&self, id: &UserId) -> Result<()> {
        // credit_ledgers rows go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::user_not_found(id));
        }
        Ok(())
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn get_ledger(&self, owner: &UserId) -> Result<Option<CreditLedger>> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {LEDGER_COLUMNS} FROM credit_ledgers WHERE owner_id = $1"
        ))
        .bind(owner.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(CreditLedger::try_from).transpose()
    }

    async fn insert_ledger(&self, ledger: &CreditLedger) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO credit_ledgers ({LEDGER_COLUMNS}) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (owner_id) DO NOTHING"
        ))
        .bind(ledger.owner_id.as_uuid())
        .bind(i64::from(ledger.chat_allowance))
        .bind(i64::from(ledger.image_allowance))
        .bind(ledger.last_reset_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::user_not_found(ledger.owner_id)
            } else {
                db_err(e)
            }
        })?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_ledger(
        &self,
        owner: &UserId,
        on_missing: OnMissing,
        mutation: LedgerMutation<'_>,
    ) -> Result<LedgerUpdate> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let created = match &on_missing {
            OnMissing::Create(seed) => sqlx::query(&format!(
                "INSERT INTO credit_ledgers ({LEDGER_COLUMNS}) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (owner_id) DO NOTHING"
            ))
            .bind(owner.as_uuid())
            .bind(i64::from(seed.chat_allowance))
            .bind(i64::from(seed.image_allowance))
            .bind(seed.last_reset_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::user_not_found(owner)
                } else {
                    db_err(e)
                }
            })?
            .rows_affected()
                == 1,
            OnMissing::Fail => false,
        };

        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {LEDGER_COLUMNS} FROM credit_ledgers WHERE owner_id = $1 FOR UPDATE"
        ))
        .bind(owner.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let mut ledger =
            CreditLedger::try_from(row.ok_or_else(|| StoreError::ledger_not_found(owner))?)?;

        let rejected = mutation(&mut ledger).err();

        sqlx::query(
            "UPDATE credit_ledgers \
             SET chat_allowance = $2, image_allowance = $3, last_reset_at = $4 \
             WHERE owner_id = $1",
        )
        .bind(owner.as_uuid())
        .bind(i64::from(ledger.chat_allowance))
        .bind(i64::from(ledger.image_allowance))
        .bind(ledger.last_reset_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(LedgerUpdate {
            ledger,
            created,
            rejected,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
