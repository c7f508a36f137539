//! Credit deduction and status.
//!
//! [`CreditService`] is where allowance checks happen: it resolves the
//! user's tier, applies the reset rules and decrements, all inside a single
//! [`Store::update_ledger`] call so the read-modify-write is atomic.

use std::sync::Arc;

use synapse_core::{
    Clock, CreditError, CreditLedger, CreditSnapshot, CreditType, PlanAuthority, ResetPolicy,
    Tier, User, UserId,
};
use synapse_store::{OnMissing, Store};

use crate::config::LedgerMissingPolicy;

/// A user's allowances as of a status read.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// The user.
    pub user: User,
    /// The ledger after resets were applied and persisted.
    pub ledger: CreditLedger,
    /// Premium status at the time of the read.
    pub is_premium: bool,
}

/// Deducts credits and reports allowances.
#[derive(Clone)]
pub struct CreditService {
    store: Arc<dyn Store>,
    plans: PlanAuthority,
    policy: ResetPolicy,
    clock: Arc<dyn Clock>,
    missing_ledger: LedgerMissingPolicy,
}

impl CreditService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        plans: PlanAuthority,
        policy: ResetPolicy,
        clock: Arc<dyn Clock>,
        missing_ledger: LedgerMissingPolicy,
    ) -> Self {
        Self {
            store,
            plans,
            policy,
            clock,
            missing_ledger,
        }
    }

    fn seed(&self, owner: UserId) -> CreditLedger {
        CreditLedger::new(owner, self.plans.allowances(), self.clock.now())
    }

    /// Give a new user the default ledger. Does nothing if one exists.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user doesn't exist, or `StoreUnavailable`.
    pub async fn open_ledger(&self, owner: UserId) -> Result<(), CreditError> {
        if self.store.insert_ledger(&self.seed(owner)).await? {
            tracing::info!(user_id = %owner, "Ledger created");
        }
        Ok(())
    }

    /// Deduct one credit of `credit_type` from `user`.
    ///
    /// Premium users get [`CreditSnapshot::unlimited`] and their ledger is
    /// not touched. Otherwise the ledger is created if missing, reset
    /// rules are applied and the counter is decremented, in one write.
    /// Replenishment is persisted even when the decrement is refused.
    ///
    /// # Errors
    ///
    /// - `InsufficientCredit` if the allowance is exhausted after resets.
    /// - `NotFound` if the user was deleted in the meantime.
    /// - `StoreUnavailable` on store failure.
    pub async fn deduct(
        &self,
        user: &User,
        credit_type: CreditType,
    ) -> Result<CreditSnapshot, CreditError> {
        let now = self.clock.now();

        let allowances = match self.plans.tier(user, now) {
            Tier::Unlimited => {
                tracing::debug!(user_id = %user.id, %credit_type, "Premium user, skipping deduction");
                return Ok(CreditSnapshot::unlimited());
            }
            Tier::Metered(allowances) => allowances,
        };

        let policy = ResetPolicy {
            allowances,
            ..self.policy
        };
        let seed = CreditLedger::new(user.id, allowances, now);

        let update = self
            .store
            .update_ledger(&user.id, OnMissing::Create(seed), &|ledger| {
                let outcome = policy.apply(ledger, now);
                if outcome.any() {
                    tracing::debug!(
                        user_id = %ledger.owner_id,
                        chat = outcome.chat_replenished,
                        image = outcome.image_replenished,
                        yearly = outcome.yearly,
                        "Allowances replenished"
                    );
                }
                ledger.consume(credit_type)
            })
            .await?;

        if update.created {
            tracing::info!(user_id = %user.id, "Ledger created on first deduction");
        }

        if let Some(rejection) = update.rejected {
            tracing::info!(
                user_id = %user.id,
                %credit_type,
                "Deduction refused: allowance exhausted"
            );
            return Err(rejection);
        }

        tracing::info!(
            user_id = %user.id,
            %credit_type,
            remaining = update.ledger.remaining(credit_type),
            "Credit deducted"
        );

        Ok(update.ledger.snapshot())
    }

    /// Look up `user_id` and deduct one credit.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user, otherwise as [`CreditService::deduct`].
    pub async fn deduct_for(
        &self,
        user_id: &UserId,
        credit_type: CreditType,
    ) -> Result<(User, CreditSnapshot), CreditError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CreditError::user_not_found(user_id))?;
        let snapshot = self.deduct(&user, credit_type).await?;
        Ok((user, snapshot))
    }

    /// Read a user's allowances, applying and persisting any due resets.
    ///
    /// A missing ledger is created or reported as `NotFound` depending on
    /// the configured [`LedgerMissingPolicy`].
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user (or ledger), or `StoreUnavailable`.
    pub async fn status(&self, user_id: &UserId) -> Result<StatusReport, CreditError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CreditError::user_not_found(user_id))?;

        let now = self.clock.now();
        let on_missing = match self.missing_ledger {
            LedgerMissingPolicy::LazyCreate => OnMissing::Create(self.seed(user.id)),
            LedgerMissingPolicy::NotFound => OnMissing::Fail,
        };
        let policy = self.policy;

        let update = self
            .store
            .update_ledger(user_id, on_missing, &|ledger| {
                policy.apply(ledger, now);
                Ok(())
            })
            .await?;

        if update.created {
            tracing::info!(user_id = %user.id, "Ledger created on status read");
        }

        Ok(StatusReport {
            is_premium: user.is_premium_at(now),
            user,
            ledger: update.ledger,
        })
    }
}
