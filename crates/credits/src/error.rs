use carbonledger_core::{CreditId, OwnerId};
use thiserror::Error;

/// Violations of credit rules, detected before anything is written.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CreditError {
    #[error("amount must be a positive, finite quantity (got {0})")]
    InvalidAmount(f64),

    #[error("credit {credit_id} is not held by {owner}")]
    NotOwner { credit_id: CreditId, owner: OwnerId },

    #[error("credit {credit_id} has {available} available, {requested} requested")]
    InsufficientBalance {
        credit_id: CreditId,
        requested: f64,
        available: f64,
    },

    #[error("credit {0} is no longer active")]
    Inactive(CreditId),
}
