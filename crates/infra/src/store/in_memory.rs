use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use carbonledger_core::{CreditId, OwnerId, TransactionId};
use carbonledger_credits::{CarbonCredit, Transaction};

use super::r#trait::{residue_record, CreditStore, StoreError, WriteBatch};

#[derive(Debug, Default)]
struct LedgerState {
    credits: HashMap<CreditId, CarbonCredit>,
    transactions: Vec<Transaction>,
    transaction_ids: HashSet<TransactionId>,
    owners: HashSet<OwnerId>,
}

impl LedgerState {
    fn append(&mut self, records: impl IntoIterator<Item = Transaction>) {
        for record in records {
            self.transaction_ids.insert(record.id);
            self.transactions.push(record);
        }
    }
}

/// In-memory credit store.
///
/// Intended for tests/dev and single-process deployments. Every write batch
/// is validated and applied under one write guard, so concurrent debits of
/// the same credit are serialized.
#[derive(Debug, Default)]
pub struct InMemoryCreditStore {
    state: RwLock<LedgerState>,
}

impl InMemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose owner directory already lists `owners`.
    pub fn with_owners(owners: impl IntoIterator<Item = OwnerId>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.write() {
            state.owners.extend(owners);
        }
        store
    }

    /// Add an owner to the directory consulted by strict owner validation.
    ///
    /// Returns `false` if the owner was already registered.
    pub fn register_owner(&self, owner: OwnerId) -> Result<bool, StoreError> {
        Ok(self.write()?.owners.insert(owner))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl CreditStore for InMemoryCreditStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }

    async fn owner_exists(&self, owner: &OwnerId) -> Result<bool, StoreError> {
        Ok(self.read()?.owners.contains(owner))
    }

    async fn get_credit(&self, credit_id: CreditId) -> Result<Option<CarbonCredit>, StoreError> {
        Ok(self.read()?.credits.get(&credit_id).cloned())
    }

    async fn list_credits(
        &self,
        owner: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<CarbonCredit>, StoreError> {
        let state = self.read()?;
        let mut credits: Vec<CarbonCredit> = state
            .credits
            .values()
            .filter(|c| &c.owner == owner && (!active_only || c.is_active))
            .cloned()
            .collect();
        credits.sort_by(|a, b| {
            a.expiration_date
                .cmp(&b.expiration_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(credits)
    }

    async fn active_balance(&self, owner: &OwnerId) -> Result<f64, StoreError> {
        let state = self.read()?;
        Ok(state
            .credits
            .values()
            .filter(|c| &c.owner == owner && c.is_active)
            .fold(0.0, |total, c| total + c.amount))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Option<CarbonCredit>, StoreError> {
        let mut state = self.write()?;

        // Validate everything first; nothing is written unless the whole batch applies.
        let mut residue = None;
        let debited = match &batch.debit {
            Some(debit) => {
                let mut credit = state
                    .credits
                    .get(&debit.credit_id)
                    .cloned()
                    .ok_or(StoreError::CreditNotFound(debit.credit_id))?;
                residue = credit
                    .apply_debit(debit.owner.as_ref(), debit.amount)?
                    .map(|swept| residue_record(&credit, swept));
                Some(credit)
            }
            None => None,
        };

        if let Some(credit) = &batch.new_credit {
            if state.credits.contains_key(&credit.id) {
                return Err(StoreError::Duplicate(format!("credit {}", credit.id)));
            }
        }

        for record in &batch.transactions {
            if state.transaction_ids.contains(&record.id) {
                return Err(StoreError::Duplicate(format!("transaction {}", record.id)));
            }
        }

        if let Some(credit) = &debited {
            state.credits.insert(credit.id, credit.clone());
        }
        if let Some(credit) = batch.new_credit {
            state.credits.insert(credit.id, credit);
        }
        state.append(batch.transactions);
        state.append(residue);

        Ok(debited)
    }

    async fn expirable_credits(&self, now: DateTime<Utc>) -> Result<Vec<CarbonCredit>, StoreError> {
        let state = self.read()?;
        let mut due: Vec<CarbonCredit> = state
            .credits
            .values()
            .filter(|c| c.is_active && c.is_expired_at(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.expiration_date.cmp(&b.expiration_date));
        Ok(due)
    }

    async fn expire_credit(
        &self,
        credit_id: CreditId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut state = self.write()?;
        let Some(credit) = state.credits.get_mut(&credit_id) else {
            return Err(StoreError::CreditNotFound(credit_id));
        };

        if !credit.expire(now) {
            return Ok(None);
        }

        let record = Transaction::expire(credit, now);
        state.append([record.clone()]);
        Ok(Some(record))
    }

    async fn transactions(&self, owner: Option<&OwnerId>) -> Result<Vec<Transaction>, StoreError> {
        let state = self.read()?;
        Ok(match owner {
            Some(owner) => state
                .transactions
                .iter()
                .filter(|t| t.involves(owner))
                .cloned()
                .collect(),
            None => state.transactions.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use carbonledger_credits::CreditError;

    use crate::store::Debit;

    fn owner(s: &str) -> OwnerId {
        OwnerId::new(s).unwrap()
    }

    fn credit(owner_id: &str, amount: f64) -> CarbonCredit {
        CarbonCredit::issue(owner(owner_id), amount, Utc::now(), Duration::days(365)).unwrap()
    }

    #[tokio::test]
    async fn rejected_debit_writes_nothing() {
        let store = InMemoryCreditStore::new();
        let source = credit("U1", 10.0);
        let source_id = source.id;
        store.commit(WriteBatch::issue(source)).await.unwrap();

        let minted = credit("U2", 20.0);
        let batch = WriteBatch {
            debit: Some(Debit {
                credit_id: source_id,
                owner: Some(owner("U1")),
                amount: 20.0,
            }),
            transactions: vec![Transaction::transfer(source_id, &minted, owner("U1"))],
            new_credit: Some(minted),
        };

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rejected(CreditError::InsufficientBalance { .. })
        ));
        assert_eq!(store.active_balance(&owner("U1")).await.unwrap(), 10.0);
        assert_eq!(store.active_balance(&owner("U2")).await.unwrap(), 0.0);
        assert_eq!(store.transactions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debit_of_missing_credit_is_not_found() {
        let store = InMemoryCreditStore::new();
        let missing = CreditId::new();
        let batch = WriteBatch {
            debit: Some(Debit {
                credit_id: missing,
                owner: None,
                amount: 1.0,
            }),
            ..Default::default()
        };
        assert_eq!(
            store.commit(batch).await.unwrap_err(),
            StoreError::CreditNotFound(missing)
        );
    }

    #[tokio::test]
    async fn duplicate_credit_is_rejected() {
        let store = InMemoryCreditStore::new();
        let c = credit("U1", 1.0);
        store.commit(WriteBatch::issue(c.clone())).await.unwrap();
        let err = store.commit(WriteBatch::issue(c)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn duplicate_transaction_is_rejected() {
        let store = InMemoryCreditStore::new();
        let first = credit("U1", 1.0);
        let record = Transaction::issue(&first);
        store
            .commit(WriteBatch {
                new_credit: Some(first),
                transactions: vec![record.clone()],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store
            .commit(WriteBatch {
                new_credit: Some(credit("U1", 2.0)),
                transactions: vec![record],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.active_balance(&owner("U1")).await.unwrap(), 1.0);
        assert_eq!(store.transactions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_balance_is_positive_zero() {
        let store = InMemoryCreditStore::new();
        let balance = store.active_balance(&owner("nobody")).await.unwrap();
        assert_eq!(balance, 0.0);
        assert!(balance.is_sign_positive());

        let c = credit("U1", 3.0);
        let id = c.id;
        store.commit(WriteBatch::issue(c)).await.unwrap();
        store
            .commit(WriteBatch {
                debit: Some(Debit {
                    credit_id: id,
                    owner: None,
                    amount: 3.0,
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(store.active_balance(&owner("U1")).await.unwrap().is_sign_positive());
    }

    #[tokio::test]
    async fn list_credits_orders_by_expiration() {
        let store = InMemoryCreditStore::new();
        let now = Utc::now();
        let late = CarbonCredit::issue(owner("U1"), 1.0, now, Duration::days(30)).unwrap();
        let soon = CarbonCredit::issue(owner("U1"), 2.0, now, Duration::days(3)).unwrap();
        store.commit(WriteBatch::issue(late.clone())).await.unwrap();
        store.commit(WriteBatch::issue(soon.clone())).await.unwrap();

        let listed = store.list_credits(&owner("U1"), true).await.unwrap();
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), vec![soon.id, late.id]);
    }

    #[tokio::test]
    async fn expire_credit_is_conditional() {
        let store = InMemoryCreditStore::new();
        let now = Utc::now();
        let c = CarbonCredit::issue(owner("U1"), 4.0, now, Duration::days(1)).unwrap();
        let id = c.id;
        store.commit(WriteBatch::issue(c)).await.unwrap();

        assert!(store.expire_credit(id, now).await.unwrap().is_none());

        let later = now + Duration::days(2);
        let record = store.expire_credit(id, later).await.unwrap().unwrap();
        assert_eq!(record.amount, 4.0);
        assert!(store.expire_credit(id, later).await.unwrap().is_none());
        assert_eq!(store.active_balance(&owner("U1")).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn owner_directory() {
        let store = InMemoryCreditStore::with_owners([owner("U1")]);
        assert!(store.owner_exists(&owner("U1")).await.unwrap());
        assert!(!store.owner_exists(&owner("U2")).await.unwrap());
        assert!(store.register_owner(owner("U2")).unwrap());
        assert!(!store.register_owner(owner("U2")).unwrap());
        assert!(store.owner_exists(&owner("U2")).await.unwrap());
    }
}
