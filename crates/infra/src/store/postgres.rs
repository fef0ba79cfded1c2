//! Postgres-backed credit store.
//!
//! Expected schema (created outside the ledger):
//!
//! ```sql
//! CREATE TABLE owners (id TEXT PRIMARY KEY);
//!
//! CREATE TABLE carbon_credits (
//!     id              UUID PRIMARY KEY,
//!     amount          DOUBLE PRECISION NOT NULL CHECK (amount >= 0),
//!     owner           TEXT NOT NULL,
//!     creation_date   TIMESTAMPTZ NOT NULL,
//!     expiration_date TIMESTAMPTZ NOT NULL,
//!     is_active       BOOLEAN NOT NULL DEFAULT TRUE
//! );
//!
//! CREATE TABLE credit_transactions (
//!     seq               BIGSERIAL UNIQUE,
//!     id                UUID PRIMARY KEY,
//!     kind              TEXT NOT NULL,
//!     credit_id         UUID NOT NULL REFERENCES carbon_credits (id),
//!     related_credit_id UUID REFERENCES carbon_credits (id),
//!     amount            DOUBLE PRECISION NOT NULL,
//!     from_owner        TEXT,
//!     to_owner          TEXT,
//!     date              TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (check constraint violation) | `23514` | `Backend` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / network / other | N/A | `Backend` |
//!
//! ## Atomicity
//!
//! A debit is a single conditional `UPDATE ... WHERE amount >= $n RETURNING`,
//! so Postgres row locking decides between concurrent writers. The debit, the
//! minted credit and the transaction rows share one SQL transaction.
//! History is read back in `seq` order, the order rows were inserted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction as SqlTransaction};
use tracing::instrument;
use uuid::Uuid;

use carbonledger_core::{CreditId, OwnerId, TransactionId};
use carbonledger_credits::{CarbonCredit, Transaction, TransactionKind};

use super::r#trait::{residue_record, CreditStore, Debit, StoreError, WriteBatch};

const CREDIT_COLUMNS: &str = "id, amount, owner, creation_date, expiration_date, is_active";
const TRANSACTION_COLUMNS: &str =
    "id, kind, credit_id, related_credit_id, amount, from_owner, to_owner, date";

/// Postgres-backed credit store.
#[derive(Debug, Clone)]
pub struct PostgresCreditStore {
    pool: Arc<PgPool>,
}

impl PostgresCreditStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` and wrap the resulting pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl CreditStore for PostgresCreditStore {
    #[instrument(skip(self), err)]
    async fn ping(&self) -> Result<(), StoreError> {
        for table in ["carbon_credits", "credit_transactions"] {
            sqlx::query(&format!("SELECT id FROM {table} LIMIT 1"))
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ping", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    async fn owner_exists(&self, owner: &OwnerId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM owners WHERE id = $1) AS present")
            .bind(owner.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("owner_exists", e))?;

        row.try_get("present")
            .map_err(|e| map_sqlx_error("owner_exists", e))
    }

    #[instrument(skip(self, credit_id), fields(credit_id = %credit_id), err)]
    async fn get_credit(&self, credit_id: CreditId) -> Result<Option<CarbonCredit>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CREDIT_COLUMNS} FROM carbon_credits WHERE id = $1"
        ))
        .bind(credit_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_credit", e))?;

        row.map(|r| credit_from_row(&r)).transpose()
    }

    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    async fn list_credits(
        &self,
        owner: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<CarbonCredit>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CREDIT_COLUMNS}
            FROM carbon_credits
            WHERE owner = $1 AND ($2 = FALSE OR is_active)
            ORDER BY expiration_date ASC, id ASC
            "#
        ))
        .bind(owner.as_str())
        .bind(active_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_credits", e))?;

        rows.iter().map(credit_from_row).collect()
    }

    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    async fn active_balance(&self, owner: &OwnerId) -> Result<f64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0)::DOUBLE PRECISION AS total
            FROM carbon_credits
            WHERE owner = $1 AND is_active
            "#,
        )
        .bind(owner.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_balance", e))?;

        row.try_get("total")
            .map_err(|e| map_sqlx_error("active_balance", e))
    }

    #[instrument(
        skip(self, batch),
        fields(
            debit = batch.debit.is_some(),
            new_credit = batch.new_credit.is_some(),
            records = batch.transactions.len()
        ),
        err
    )]
    async fn commit(&self, batch: WriteBatch) -> Result<Option<CarbonCredit>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut residue = None;
        let debited = match &batch.debit {
            Some(debit) => match debit_credit(&mut tx, debit).await {
                Ok((credit, swept)) => {
                    residue = swept.map(|swept| residue_record(&credit, swept));
                    Some(credit)
                }
                Err(err) => {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Err(err);
                }
            },
            None => None,
        };

        if let Some(credit) = &batch.new_credit {
            insert_credit(&mut tx, credit).await?;
        }

        for record in batch.transactions.iter().chain(residue.as_ref()) {
            insert_transaction(&mut tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(debited)
    }

    #[instrument(skip(self), err)]
    async fn expirable_credits(&self, now: DateTime<Utc>) -> Result<Vec<CarbonCredit>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CREDIT_COLUMNS}
            FROM carbon_credits
            WHERE is_active AND expiration_date <= $1
            ORDER BY expiration_date ASC
            "#
        ))
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expirable_credits", e))?;

        rows.iter().map(credit_from_row).collect()
    }

    #[instrument(skip(self, credit_id), fields(credit_id = %credit_id), err)]
    async fn expire_credit(
        &self,
        credit_id: CreditId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE carbon_credits
            SET is_active = FALSE
            WHERE id = $1 AND is_active AND expiration_date <= $2
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(credit_id.as_uuid())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("expire_credit", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };

        let credit = credit_from_row(&row)?;
        let record = Transaction::expire(&credit, now);
        insert_transaction(&mut tx, &record).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Some(record))
    }

    #[instrument(skip(self), err)]
    async fn transactions(&self, owner: Option<&OwnerId>) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&history_query())
        .bind(owner.map(|o| o.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;

        rows.iter().map(transaction_from_row).collect()
    }
}

/// Conditionally decrement a credit inside `tx`.
///
/// Returns the updated credit and the residue swept to zero, if any. When no
/// row matches, the credit is re-read so the refusal can be reported
/// precisely (missing, wrong owner, inactive, insufficient).
async fn debit_credit(
    tx: &mut SqlTransaction<'_, Postgres>,
    debit: &Debit,
) -> Result<(CarbonCredit, Option<f64>), StoreError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE carbon_credits
        SET amount = amount - $2
        WHERE id = $1
            AND is_active
            AND amount >= $2
            AND ($3::TEXT IS NULL OR owner = $3)
        RETURNING {CREDIT_COLUMNS}
        "#
    ))
    .bind(debit.credit_id.as_uuid())
    .bind(debit.amount)
    .bind(debit.owner.as_ref().map(|o| o.as_str()))
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("debit_credit", e))?;

    if let Some(row) = row {
        let mut credit = credit_from_row(&row)?;
        let residue = credit.settle_remainder();
        if !credit.is_active {
            // The row is locked by the UPDATE above until commit.
            sqlx::query("UPDATE carbon_credits SET amount = 0, is_active = FALSE WHERE id = $1")
                .bind(debit.credit_id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("debit_credit", e))?;
        }
        return Ok((credit, residue));
    }

    let current = sqlx::query(&format!(
        "SELECT {CREDIT_COLUMNS} FROM carbon_credits WHERE id = $1"
    ))
    .bind(debit.credit_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("debit_credit", e))?;

    let Some(current) = current else {
        return Err(StoreError::CreditNotFound(debit.credit_id));
    };

    let credit = credit_from_row(&current)?;
    credit.check_debit(debit.owner.as_ref(), debit.amount)?;

    // The row satisfies the condition now but did not when the UPDATE ran.
    Err(StoreError::Backend(format!(
        "conditional debit of credit {} matched no row",
        debit.credit_id
    )))
}

async fn insert_credit(
    tx: &mut SqlTransaction<'_, Postgres>,
    credit: &CarbonCredit,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO carbon_credits (id, amount, owner, creation_date, expiration_date, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(credit.id.as_uuid())
    .bind(credit.amount)
    .bind(credit.owner.as_str())
    .bind(credit.creation_date)
    .bind(credit.expiration_date)
    .bind(credit.is_active)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_credit", e))?;

    Ok(())
}

async fn insert_transaction(
    tx: &mut SqlTransaction<'_, Postgres>,
    record: &Transaction,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO credit_transactions
            (id, kind, credit_id, related_credit_id, amount, from_owner, to_owner, date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.kind.as_str())
    .bind(record.credit_id.as_uuid())
    .bind(record.related_credit_id.map(Uuid::from))
    .bind(record.amount)
    .bind(record.from_owner.as_ref().map(|o| o.as_str()))
    .bind(record.to_owner.as_ref().map(|o| o.as_str()))
    .bind(record.date)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;

    Ok(())
}

fn credit_from_row(row: &sqlx::postgres::PgRow) -> Result<CarbonCredit, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode credit row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let owner: String = row.try_get("owner").map_err(decode)?;

    Ok(CarbonCredit {
        id: CreditId::from_uuid(id),
        amount: row.try_get("amount").map_err(decode)?,
        owner: OwnerId::new(owner).map_err(|e| StoreError::Backend(e.to_string()))?,
        creation_date: row.try_get("creation_date").map_err(decode)?,
        expiration_date: row.try_get("expiration_date").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
    })
}

fn transaction_from_row(row: &sqlx::postgres::PgRow) -> Result<Transaction, StoreError> {
    let decode =
        |e: sqlx::Error| StoreError::Backend(format!("failed to decode transaction row: {e}"));
    let owner = |value: Option<String>| -> Result<Option<OwnerId>, StoreError> {
        value
            .map(OwnerId::new)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))
    };

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let credit_id: Uuid = row.try_get("credit_id").map_err(decode)?;
    let related: Option<Uuid> = row.try_get("related_credit_id").map_err(decode)?;

    Ok(Transaction {
        id: TransactionId::from_uuid(id),
        kind: kind
            .parse::<TransactionKind>()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        credit_id: CreditId::from_uuid(credit_id),
        related_credit_id: related.map(CreditId::from_uuid),
        amount: row.try_get("amount").map_err(decode)?,
        from_owner: owner(row.try_get("from_owner").map_err(decode)?)?,
        to_owner: owner(row.try_get("to_owner").map_err(decode)?)?,
        date: row.try_get("date").map_err(decode)?,
    })
}

/// History in insert order. Dates are taken before commit, so they can
/// interleave differently from the actual append order under concurrency.
fn history_query() -> String {
    format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM credit_transactions
        WHERE ($1::TEXT IS NULL OR from_owner = $1 OR to_owner = $1)
        ORDER BY seq ASC
        "#
    )
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("{} failed: {}", operation, other)),
    }
}
