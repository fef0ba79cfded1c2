//! Carbon credit domain model (credits, transaction records, amount rules).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod amount;
pub mod credit;
pub mod error;
pub mod transaction;

pub use amount::{validate_amount, AMOUNT_EPSILON};
pub use credit::{CarbonCredit, DEFAULT_CREDIT_LIFETIME_DAYS};
pub use error::CreditError;
pub use transaction::{Transaction, TransactionKind};
