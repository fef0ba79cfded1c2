//! Credit storage boundary.
//!
//! The ledger only talks to a `CreditStore`; backends decide how a write batch
//! is made atomic (a lock for the in-memory store, an SQL transaction with a
//! conditional `UPDATE` for Postgres).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryCreditStore;
pub use postgres::PostgresCreditStore;
pub use r#trait::{CreditStore, Debit, StoreError, WriteBatch};
