//! Background workers.

pub mod expiry_worker;

pub use expiry_worker::{ExpiryWorker, ExpiryWorkerHandle, SweepStats};
