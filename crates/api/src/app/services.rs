use std::sync::Arc;

use carbonledger_infra::{
    CreditLedger, CreditStore, InMemoryCreditStore, LedgerConfig, PostgresCreditStore,
};

/// Ledger handle shared by every handler.
pub type SharedLedger = Arc<CreditLedger<Arc<dyn CreditStore>>>;

/// Pick the store from configuration and build the ledger on top of it.
///
/// `DATABASE_URL` selects Postgres; otherwise credits live in memory and the
/// configured seed owners are registered.
pub async fn build_ledger(config: &LedgerConfig) -> anyhow::Result<SharedLedger> {
    let store: Arc<dyn CreditStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresCreditStore::connect(url).await?;
            tracing::info!("using postgres credit store");
            Arc::new(store)
        }
        None => {
            tracing::info!(
                seed_owners = config.seed_owners.len(),
                "using in-memory credit store"
            );
            Arc::new(InMemoryCreditStore::with_owners(config.seed_owners.iter().cloned()))
        }
    };

    Ok(Arc::new(CreditLedger::new(store, config.ledger_settings())))
}

/// In-memory ledger with the given owners registered (tests and local runs).
pub fn in_memory_ledger(config: &LedgerConfig) -> SharedLedger {
    let store: Arc<dyn CreditStore> = Arc::new(InMemoryCreditStore::with_owners(
        config.seed_owners.iter().cloned(),
    ));
    Arc::new(CreditLedger::new(store, config.ledger_settings()))
}
