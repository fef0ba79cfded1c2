use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carbonledger_core::{CreditId, DomainError, OwnerId, TransactionId};

use crate::credit::CarbonCredit;

/// Kind of ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Issue,
    Transfer,
    Retire,
    Expire,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Issue => "issue",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Retire => "retire",
            TransactionKind::Expire => "expire",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue" => Ok(TransactionKind::Issue),
            "transfer" => Ok(TransactionKind::Transfer),
            "retire" => Ok(TransactionKind::Retire),
            "expire" => Ok(TransactionKind::Expire),
            other => Err(DomainError::validation(format!(
                "unknown transaction kind '{other}'"
            ))),
        }
    }
}

/// Immutable audit record of one ledger movement.
///
/// Endpoints by kind:
/// - `issue`: `to_owner` is the holder of the new credit
/// - `transfer`: `from_owner` -> `to_owner`; `related_credit_id` is the credit minted for the recipient
/// - `retire`, `expire`: `from_owner` is the holder; value leaves circulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub credit_id: CreditId,
    pub related_credit_id: Option<CreditId>,
    pub amount: f64,
    pub from_owner: Option<OwnerId>,
    pub to_owner: Option<OwnerId>,
    pub date: DateTime<Utc>,
}

impl Transaction {
    pub fn issue(credit: &CarbonCredit) -> Self {
        Self {
            id: TransactionId::new(),
            kind: TransactionKind::Issue,
            credit_id: credit.id,
            related_credit_id: None,
            amount: credit.amount,
            from_owner: None,
            to_owner: Some(credit.owner.clone()),
            date: credit.creation_date,
        }
    }

    pub fn transfer(source: CreditId, minted: &CarbonCredit, from_owner: OwnerId) -> Self {
        Self {
            id: TransactionId::new(),
            kind: TransactionKind::Transfer,
            credit_id: source,
            related_credit_id: Some(minted.id),
            amount: minted.amount,
            from_owner: Some(from_owner),
            to_owner: Some(minted.owner.clone()),
            date: minted.creation_date,
        }
    }

    pub fn retire(credit_id: CreditId, owner: OwnerId, amount: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            kind: TransactionKind::Retire,
            credit_id,
            related_credit_id: None,
            amount,
            from_owner: Some(owner),
            to_owner: None,
            date: at,
        }
    }

    /// Record the expiry of `credit`, destroying whatever amount it still held.
    pub fn expire(credit: &CarbonCredit, at: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            kind: TransactionKind::Expire,
            credit_id: credit.id,
            related_credit_id: None,
            amount: credit.amount,
            from_owner: Some(credit.owner.clone()),
            to_owner: None,
            date: at,
        }
    }

    /// Whether `owner` appears on either end of this movement.
    pub fn involves(&self, owner: &OwnerId) -> bool {
        self.from_owner.as_ref() == Some(owner) || self.to_owner.as_ref() == Some(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn owner(s: &str) -> OwnerId {
        OwnerId::new(s).unwrap()
    }

    #[test]
    fn transfer_links_source_and_minted_credit() {
        let minted = CarbonCredit::issue(owner("U2"), 30.0, Utc::now(), Duration::days(365)).unwrap();
        let source = CreditId::new();
        let tx = Transaction::transfer(source, &minted, owner("U1"));

        assert_eq!(tx.kind, TransactionKind::Transfer);
        assert_eq!(tx.credit_id, source);
        assert_eq!(tx.related_credit_id, Some(minted.id));
        assert_eq!(tx.amount, 30.0);
        assert!(tx.involves(&owner("U1")));
        assert!(tx.involves(&owner("U2")));
        assert!(!tx.involves(&owner("U3")));
    }

    #[test]
    fn issue_only_involves_recipient() {
        let credit = CarbonCredit::issue(owner("U1"), 5.0, Utc::now(), Duration::days(1)).unwrap();
        let tx = Transaction::issue(&credit);
        assert_eq!(tx.from_owner, None);
        assert!(tx.involves(&owner("U1")));
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionKind::Retire).unwrap();
        assert_eq!(json, "\"retire\"");
        assert_eq!("expire".parse::<TransactionKind>().unwrap(), TransactionKind::Expire);
        assert!("mint".parse::<TransactionKind>().is_err());
    }
}
