//! Carbon credit ledger service.
//!
//! `CreditLedger` orchestrates the domain rules from `carbonledger-credits`
//! against an injected `CreditStore`. Every mutating operation is one atomic
//! store write, so there is no check-then-act window between validating a
//! balance and decrementing it.

use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use carbonledger_core::{CreditId, DomainError, OwnerId};
use carbonledger_credits::{
    validate_amount, CarbonCredit, CreditError, Transaction, DEFAULT_CREDIT_LIFETIME_DAYS,
};

use crate::store::{CreditStore, Debit, StoreError, WriteBatch};

/// Whether issuing to an owner requires the owner to exist in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerValidation {
    /// Owners must be registered; unknown owners fail with `InvalidOwner`.
    Strict,
    /// Owners are free-form identifiers.
    #[default]
    Permissive,
}

impl FromStr for OwnerValidation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(DomainError::validation(format!(
                "owner validation must be 'strict' or 'permissive' (got '{other}')"
            ))),
        }
    }
}

/// Ledger behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub owner_validation: OwnerValidation,
    /// Validity period of newly issued credits.
    pub credit_lifetime: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            owner_validation: OwnerValidation::default(),
            credit_lifetime: Duration::days(DEFAULT_CREDIT_LIFETIME_DAYS),
        }
    }
}

/// Marketplace direction for `execute_trade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl FromStr for TradeSide {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(DomainError::validation(format!(
                "trade side must be 'buy' or 'sell' (got '{other}')"
            ))),
        }
    }
}

/// Outcome counts of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExpiryReport {
    /// Credits found active and past their expiration date.
    pub scanned: usize,
    /// Credits deactivated by this sweep.
    pub expired: usize,
    /// Credits already handled by a concurrent writer.
    pub skipped: usize,
    /// Credits whose update failed; left for the next sweep.
    pub failed: usize,
    /// Total amount taken out of circulation.
    pub expired_amount: f64,
}

/// Ledger operation error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("amount must be a positive, finite quantity (got {0})")]
    InvalidAmount(f64),

    #[error("owner does not exist: {0}")]
    InvalidOwner(OwnerId),

    #[error("credit not found: {0}")]
    NotFound(CreditId),

    #[error("credit {credit_id} is not held by {owner}")]
    NotOwner { credit_id: CreditId, owner: OwnerId },

    #[error("insufficient balance: {requested} requested, {available} available")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("credit {0} is no longer active")]
    CreditInactive(CreditId),

    #[error("owner {0} has no active credits")]
    NoActiveCredits(OwnerId),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<CreditError> for LedgerError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InvalidAmount(a) => Self::InvalidAmount(a),
            CreditError::NotOwner { credit_id, owner } => Self::NotOwner { credit_id, owner },
            CreditError::InsufficientBalance {
                requested,
                available,
                ..
            } => Self::InsufficientBalance {
                requested,
                available,
            },
            CreditError::Inactive(id) => Self::CreditInactive(id),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CreditNotFound(id) => Self::NotFound(id),
            StoreError::Rejected(e) => e.into(),
            other => Self::Store(other),
        }
    }
}

/// The carbon credit ledger.
///
/// The store handle is injected at construction; share the ledger behind an
/// `Arc` to use it from several tasks.
#[derive(Debug)]
pub struct CreditLedger<S> {
    store: S,
    settings: LedgerSettings,
}

impl<S: CreditStore> CreditLedger<S> {
    pub fn new(store: S, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issue a new credit to `owner`, valid for the configured lifetime.
    pub async fn issue_credit(&self, amount: f64, owner: &OwnerId) -> Result<CreditId, LedgerError> {
        let expiration = Utc::now() + self.settings.credit_lifetime;
        self.issue_credit_with_expiry(amount, owner, expiration).await
    }

    /// Issue a new credit with an explicit expiration date.
    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    pub async fn issue_credit_with_expiry(
        &self,
        amount: f64,
        owner: &OwnerId,
        expiration_date: DateTime<Utc>,
    ) -> Result<CreditId, LedgerError> {
        validate_amount(amount)?;
        self.ensure_owner(owner).await?;

        let now = Utc::now();
        let mut credit = CarbonCredit::issue(owner.clone(), amount, now, self.settings.credit_lifetime)?;
        credit.expiration_date = expiration_date;
        let credit_id = credit.id;

        self.store.commit(WriteBatch::issue(credit)).await?;

        info!(credit_id = %credit_id, amount, "credit issued");
        Ok(credit_id)
    }

    /// Move `amount` from `credit_id` (held by `from_owner`) to a new credit
    /// for `to_owner`. Returns the recipient's new credit id.
    #[instrument(
        skip(self, credit_id, from_owner, to_owner),
        fields(credit_id = %credit_id, from = %from_owner, to = %to_owner),
        err
    )]
    pub async fn transfer_credit(
        &self,
        credit_id: CreditId,
        from_owner: &OwnerId,
        to_owner: &OwnerId,
        amount: f64,
    ) -> Result<CreditId, LedgerError> {
        validate_amount(amount)?;
        self.ensure_owner(to_owner).await?;

        let minted = CarbonCredit::issue(
            to_owner.clone(),
            amount,
            Utc::now(),
            self.settings.credit_lifetime,
        )?;
        let new_credit_id = minted.id;

        let batch = WriteBatch {
            debit: Some(Debit {
                credit_id,
                owner: Some(from_owner.clone()),
                amount,
            }),
            transactions: vec![
                Transaction::issue(&minted),
                Transaction::transfer(credit_id, &minted, from_owner.clone()),
            ],
            new_credit: Some(minted),
        };

        self.store.commit(batch).await?;

        info!(new_credit_id = %new_credit_id, amount, "credit transferred");
        Ok(new_credit_id)
    }

    /// Permanently remove `amount` from circulation.
    #[instrument(skip(self, credit_id), fields(credit_id = %credit_id), err)]
    pub async fn retire_credit(&self, credit_id: CreditId, amount: f64) -> Result<(), LedgerError> {
        validate_amount(amount)?;

        // Owners never change on a credit, so reading it first is race-free;
        // the amount check still happens inside the conditional debit.
        let credit = self
            .store
            .get_credit(credit_id)
            .await?
            .ok_or(LedgerError::NotFound(credit_id))?;

        let batch = WriteBatch {
            debit: Some(Debit {
                credit_id,
                owner: Some(credit.owner.clone()),
                amount,
            }),
            new_credit: None,
            transactions: vec![Transaction::retire(credit_id, credit.owner, amount, Utc::now())],
        };

        self.store.commit(batch).await?;

        info!(amount, "credit retired");
        Ok(())
    }

    /// Total amount held by `owner` across active credits.
    pub async fn get_credit_balance(&self, owner: &OwnerId) -> Result<f64, LedgerError> {
        Ok(self.store.active_balance(owner).await?)
    }

    pub async fn get_credit(&self, credit_id: CreditId) -> Result<CarbonCredit, LedgerError> {
        self.store
            .get_credit(credit_id)
            .await?
            .ok_or(LedgerError::NotFound(credit_id))
    }

    /// An owner's credits, soonest expiration first.
    pub async fn list_credits(
        &self,
        owner: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<CarbonCredit>, LedgerError> {
        Ok(self.store.list_credits(owner, active_only).await?)
    }

    /// Transaction log in append order, optionally restricted to records
    /// where `owner` is sender or recipient.
    pub async fn get_transaction_history(
        &self,
        owner: Option<&OwnerId>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions(owner).await?)
    }

    /// Expire every active credit past its expiration date as of now.
    pub async fn expire_credits(&self) -> Result<ExpiryReport, LedgerError> {
        self.expire_credits_at(Utc::now()).await
    }

    /// Expire every active credit whose expiration date is at or before `now`.
    ///
    /// Per-credit failures are logged and counted; the sweep carries on. Only
    /// a failure to list due credits aborts the sweep.
    #[instrument(skip(self), err)]
    pub async fn expire_credits_at(&self, now: DateTime<Utc>) -> Result<ExpiryReport, LedgerError> {
        let due = self.store.expirable_credits(now).await?;
        let mut report = ExpiryReport {
            scanned: due.len(),
            ..Default::default()
        };

        for credit in due {
            match self.store.expire_credit(credit.id, now).await {
                Ok(Some(record)) => {
                    report.expired += 1;
                    report.expired_amount += record.amount;
                }
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(credit_id = %credit.id, error = %err, "failed to expire credit");
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Marketplace shortcut: `buy` issues new credit, `sell` retires from the
    /// owner's soonest-expiring credit that covers `amount`.
    ///
    /// Returns the id of the credit issued or drawn from.
    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    pub async fn execute_trade(
        &self,
        owner: &OwnerId,
        side: TradeSide,
        amount: f64,
    ) -> Result<CreditId, LedgerError> {
        validate_amount(amount)?;

        match side {
            TradeSide::Buy => self.issue_credit(amount, owner).await,
            TradeSide::Sell => {
                let credits = self.store.list_credits(owner, true).await?;
                if credits.is_empty() {
                    return Err(LedgerError::NoActiveCredits(owner.clone()));
                }

                let Some(source) = credits.iter().find(|c| c.amount >= amount) else {
                    return Err(LedgerError::InsufficientBalance {
                        requested: amount,
                        available: credits.iter().fold(0.0, |total, c| total + c.amount),
                    });
                };

                self.retire_credit(source.id, amount).await?;
                Ok(source.id)
            }
        }
    }

    /// Verify the store's tables are reachable.
    pub async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(self.store.ping().await?)
    }

    async fn ensure_owner(&self, owner: &OwnerId) -> Result<(), LedgerError> {
        if self.settings.owner_validation == OwnerValidation::Permissive {
            return Ok(());
        }
        if self.store.owner_exists(owner).await? {
            Ok(())
        } else {
            Err(LedgerError::InvalidOwner(owner.clone()))
        }
    }
}
