use carbonledger_infra::{ExpiryWorker, LedgerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carbonledger_observability::init();

    let config = LedgerConfig::from_env()?;
    let ledger = carbonledger_api::app::services::build_ledger(&config).await?;

    // Expiry runs on its own schedule, never inline with requests.
    let expiry = ExpiryWorker::spawn(ledger.clone(), config.expiry_interval);

    let app = carbonledger_api::app::build_app(ledger);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    expiry.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
