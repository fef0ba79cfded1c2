use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use carbonledger_core::{CreditId, OwnerId};

use crate::amount::{validate_amount, AMOUNT_EPSILON};
use crate::error::CreditError;

/// Default validity period of a freshly issued credit.
pub const DEFAULT_CREDIT_LIFETIME_DAYS: i64 = 365;

/// A holding of carbon credit (tons CO2e) by a single owner.
///
/// `amount` never goes below zero. A credit drawn down to zero is deactivated
/// in the same step, so an inactive credit is either exhausted or expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonCredit {
    pub id: CreditId,
    pub amount: f64,
    pub owner: OwnerId,
    pub creation_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
}

impl CarbonCredit {
    /// Mint a new active credit for `owner`, valid for `lifetime` from `now`.
    pub fn issue(
        owner: OwnerId,
        amount: f64,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self, CreditError> {
        let amount = validate_amount(amount)?;
        Ok(Self {
            id: CreditId::new(),
            amount,
            owner,
            creation_date: now,
            expiration_date: now + lifetime,
            is_active: true,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }

    /// Check whether `amount` may be drawn from this credit.
    ///
    /// When `owner` is given, the credit must be held by that owner.
    pub fn check_debit(&self, owner: Option<&OwnerId>, amount: f64) -> Result<(), CreditError> {
        validate_amount(amount)?;

        if let Some(owner) = owner {
            if &self.owner != owner {
                return Err(CreditError::NotOwner {
                    credit_id: self.id,
                    owner: owner.clone(),
                });
            }
        }

        if !self.is_active {
            return Err(CreditError::Inactive(self.id));
        }

        if amount > self.amount {
            return Err(CreditError::InsufficientBalance {
                credit_id: self.id,
                requested: amount,
                available: self.amount,
            });
        }

        Ok(())
    }

    /// Draw `amount` from the credit, deactivating it once exhausted.
    ///
    /// Returns the residue swept to zero along with the draw, if any. The
    /// caller must log it, otherwise it leaves circulation unrecorded.
    pub fn apply_debit(
        &mut self,
        owner: Option<&OwnerId>,
        amount: f64,
    ) -> Result<Option<f64>, CreditError> {
        self.check_debit(owner, amount)?;

        self.amount -= amount;
        Ok(self.settle_remainder())
    }

    /// Zero and deactivate a credit whose remainder is at or below
    /// `AMOUNT_EPSILON`. Returns the swept residue when it was non-zero.
    pub fn settle_remainder(&mut self) -> Option<f64> {
        if self.amount > AMOUNT_EPSILON {
            return None;
        }
        let residue = self.amount;
        self.amount = 0.0;
        self.is_active = false;
        (residue > 0.0).then_some(residue)
    }

    /// Deactivate the credit if it is active and past its expiration date.
    ///
    /// Returns `true` when the credit was expired by this call.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_active && self.is_expired_at(now) {
            self.is_active = false;
            true
        } else {
            false
        }
    }
}
