use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use carbonledger_core::{CreditId, OwnerId};
use carbonledger_credits::{CarbonCredit, CreditError, Transaction};

/// Conditional decrement of one credit.
///
/// Applied only if the credit exists, is active, holds at least `amount` and
/// (when `owner` is set) belongs to `owner`. The check and the write happen as
/// one step inside the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Debit {
    pub credit_id: CreditId,
    pub owner: Option<OwnerId>,
    pub amount: f64,
}

/// Everything one ledger operation writes, committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub debit: Option<Debit>,
    pub new_credit: Option<CarbonCredit>,
    pub transactions: Vec<Transaction>,
}

impl WriteBatch {
    pub fn issue(credit: CarbonCredit) -> Self {
        let record = Transaction::issue(&credit);
        Self {
            debit: None,
            new_credit: Some(credit),
            transactions: vec![record],
        }
    }
}

/// `retire` record for a sub-epsilon residue swept to zero by a debit.
pub(crate) fn residue_record(credit: &CarbonCredit, swept: f64) -> Transaction {
    Transaction::retire(credit.id, credit.owner.clone(), swept, Utc::now())
}

/// Credit store operation error.
///
/// `CreditNotFound` and `Rejected` are the outcomes of a refused conditional
/// write; everything else is an infrastructure failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("credit not found: {0}")]
    CreditNotFound(CreditId),

    #[error("conditional write rejected: {0}")]
    Rejected(#[from] CreditError),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence for credits, their transaction log and the owner directory.
///
/// ## Implementation Requirements
///
/// - `commit` applies the debit condition, the new credit and the transaction
///   records atomically; a refused debit writes nothing
/// - a debit that leaves a residue at or below `AMOUNT_EPSILON` zeroes it and
///   appends a `retire` record for the residue in the same write
/// - `expire_credit` deactivates only a credit that is still active and past
///   `now`, and appends its `expire` record in the same write
/// - transaction records are append-only and returned in append order
#[async_trait::async_trait]
pub trait CreditStore: Send + Sync {
    /// Verify the backing tables are reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn owner_exists(&self, owner: &OwnerId) -> Result<bool, StoreError>;

    async fn get_credit(&self, credit_id: CreditId) -> Result<Option<CarbonCredit>, StoreError>;

    /// An owner's credits, soonest expiration first.
    async fn list_credits(
        &self,
        owner: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<CarbonCredit>, StoreError>;

    /// Sum of `amount` over the owner's active credits.
    async fn active_balance(&self, owner: &OwnerId) -> Result<f64, StoreError>;

    /// Commit a write batch. Returns the debited credit's new state, if the
    /// batch carried a debit.
    async fn commit(&self, batch: WriteBatch) -> Result<Option<CarbonCredit>, StoreError>;

    /// Active credits whose expiration date is at or before `now`.
    async fn expirable_credits(&self, now: DateTime<Utc>) -> Result<Vec<CarbonCredit>, StoreError>;

    /// Expire one credit. Returns `None` if it was no longer expirable
    /// (already inactive, or not yet due).
    async fn expire_credit(
        &self,
        credit_id: CreditId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError>;

    /// The transaction log, optionally restricted to records where `owner`
    /// is the sender or the recipient.
    async fn transactions(&self, owner: Option<&OwnerId>) -> Result<Vec<Transaction>, StoreError>;
}

#[async_trait::async_trait]
impl<S> CreditStore for Arc<S>
where
    S: CreditStore + ?Sized,
{
    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }

    async fn owner_exists(&self, owner: &OwnerId) -> Result<bool, StoreError> {
        (**self).owner_exists(owner).await
    }

    async fn get_credit(&self, credit_id: CreditId) -> Result<Option<CarbonCredit>, StoreError> {
        (**self).get_credit(credit_id).await
    }

    async fn list_credits(
        &self,
        owner: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<CarbonCredit>, StoreError> {
        (**self).list_credits(owner, active_only).await
    }

    async fn active_balance(&self, owner: &OwnerId) -> Result<f64, StoreError> {
        (**self).active_balance(owner).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Option<CarbonCredit>, StoreError> {
        (**self).commit(batch).await
    }

    async fn expirable_credits(&self, now: DateTime<Utc>) -> Result<Vec<CarbonCredit>, StoreError> {
        (**self).expirable_credits(now).await
    }

    async fn expire_credit(
        &self,
        credit_id: CreditId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        (**self).expire_credit(credit_id, now).await
    }

    async fn transactions(&self, owner: Option<&OwnerId>) -> Result<Vec<Transaction>, StoreError> {
        (**self).transactions(owner).await
    }
}
