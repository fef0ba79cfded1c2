//! Infrastructure layer: credit storage backends, the ledger service,
//! background workers and configuration.

pub mod config;
pub mod ledger;
pub mod store;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, LedgerConfig};
pub use ledger::{
    CreditLedger, ExpiryReport, LedgerError, LedgerSettings, OwnerValidation, TradeSide,
};
pub use store::{CreditStore, Debit, InMemoryCreditStore, PostgresCreditStore, StoreError, WriteBatch};
pub use workers::{ExpiryWorker, ExpiryWorkerHandle, SweepStats};
