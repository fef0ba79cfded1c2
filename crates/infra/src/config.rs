//! Configuration loading and representation.
//!
//! All settings come from environment variables; unset variables fall back to
//! defaults, malformed ones are rejected.

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use carbonledger_core::OwnerId;
use carbonledger_credits::DEFAULT_CREDIT_LIFETIME_DAYS;

use crate::ledger::{LedgerSettings, OwnerValidation};

pub const ENV_OWNER_VALIDATION: &str = "LEDGER_OWNER_VALIDATION";
pub const ENV_CREDIT_LIFETIME_DAYS: &str = "LEDGER_CREDIT_LIFETIME_DAYS";
pub const ENV_EXPIRY_INTERVAL_SECS: &str = "LEDGER_EXPIRY_INTERVAL_SECS";
pub const ENV_BIND_ADDR: &str = "LEDGER_BIND_ADDR";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_SEED_OWNERS: &str = "LEDGER_SEED_OWNERS";

const DEFAULT_EXPIRY_INTERVAL_SECS: u64 = 3600;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Process configuration for the ledger service.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub owner_validation: OwnerValidation,
    pub credit_lifetime_days: i64,
    pub expiry_interval: StdDuration,
    pub bind_addr: SocketAddr,
    /// When set, credits are stored in Postgres instead of memory.
    pub database_url: Option<String>,
    /// Owners registered in the in-memory store at startup.
    pub seed_owners: Vec<OwnerId>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            owner_validation: OwnerValidation::default(),
            credit_lifetime_days: DEFAULT_CREDIT_LIFETIME_DAYS,
            expiry_interval: StdDuration::from_secs(DEFAULT_EXPIRY_INTERVAL_SECS),
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080))),
            database_url: None,
            seed_owners: Vec::new(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get(ENV_OWNER_VALIDATION) {
            config.owner_validation = raw
                .parse()
                .map_err(|e: carbonledger_core::DomainError| {
                    ConfigError::invalid(ENV_OWNER_VALIDATION, e.to_string())
                })?;
        }

        if let Some(raw) = get(ENV_CREDIT_LIFETIME_DAYS) {
            let days: i64 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_CREDIT_LIFETIME_DAYS, format!("{e}")))?;
            if days <= 0 {
                return Err(ConfigError::invalid(ENV_CREDIT_LIFETIME_DAYS, "must be positive"));
            }
            config.credit_lifetime_days = days;
        }

        if let Some(raw) = get(ENV_EXPIRY_INTERVAL_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_EXPIRY_INTERVAL_SECS, format!("{e}")))?;
            if secs == 0 {
                return Err(ConfigError::invalid(ENV_EXPIRY_INTERVAL_SECS, "must be positive"));
            }
            config.expiry_interval = StdDuration::from_secs(secs);
        }

        if let Some(raw) = get(ENV_BIND_ADDR) {
            config.bind_addr = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_BIND_ADDR, format!("{e}")))?;
        }

        config.database_url = get(ENV_DATABASE_URL);

        if let Some(raw) = get(ENV_SEED_OWNERS) {
            config.seed_owners = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(OwnerId::new)
                .collect::<Result<_, _>>()
                .map_err(|e| ConfigError::invalid(ENV_SEED_OWNERS, e.to_string()))?;
        }

        Ok(config)
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            owner_validation: self.owner_validation,
            credit_lifetime: Duration::days(self.credit_lifetime_days),
        }
    }
}
