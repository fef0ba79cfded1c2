use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::ledger::{CreditLedger, ExpiryReport, LedgerError};
use crate::store::CreditStore;

/// Cumulative statistics of a running expiry worker.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SweepStats {
    pub sweeps_run: u64,
    pub sweeps_failed: u64,
    pub credits_expired: u64,
    pub credit_failures: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
}

/// Handle to control and join the expiry worker.
#[derive(Debug)]
pub struct ExpiryWorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<SweepStats>>,
}

impl ExpiryWorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A sweep in progress is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }

    pub fn stats(&self) -> SweepStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Periodic expiry sweep, independent of request handling.
///
/// The first sweep runs immediately, then once per `interval`. Sweeps are
/// idempotent, so a missed or repeated tick is harmless.
#[derive(Debug)]
pub struct ExpiryWorker;

impl ExpiryWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<S>(ledger: Arc<CreditLedger<S>>, interval: Duration) -> ExpiryWorkerHandle
    where
        S: CreditStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let stats = Arc::new(Mutex::new(SweepStats::default()));
        let join = tokio::spawn(worker_loop(ledger, interval, shutdown_rx, stats.clone()));

        ExpiryWorkerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

async fn worker_loop<S>(
    ledger: Arc<CreditLedger<S>>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats: Arc<Mutex<SweepStats>>,
) where
    S: CreditStore + 'static,
{
    info!(interval_secs = interval.as_secs(), "expiry worker started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                let result = ledger.expire_credits().await;
                record_sweep(&stats, result);
            }
        }
    }

    info!("expiry worker stopped");
}

fn record_sweep(stats: &Mutex<SweepStats>, result: Result<ExpiryReport, LedgerError>) {
    let mut s = match stats.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    s.sweeps_run += 1;
    s.last_sweep_at = Some(Utc::now());
    match result {
        Ok(report) => {
            s.credits_expired += report.expired as u64;
            s.credit_failures += report.failed as u64;
        }
        Err(err) => {
            s.sweeps_failed += 1;
            error!(error = %err, "expiry sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use carbonledger_core::OwnerId;

    use crate::ledger::LedgerSettings;
    use crate::store::InMemoryCreditStore;

    #[tokio::test]
    async fn worker_expires_due_credits_and_stops_on_shutdown() {
        let ledger = Arc::new(CreditLedger::new(
            InMemoryCreditStore::new(),
            LedgerSettings::default(),
        ));
        let owner = OwnerId::new("U1").unwrap();
        let due = ledger
            .issue_credit_with_expiry(9.0, &owner, Utc::now() - ChronoDuration::minutes(1))
            .await
            .unwrap();
        ledger.issue_credit(1.0, &owner).await.unwrap();

        let handle = ExpiryWorker::spawn(ledger.clone(), Duration::from_millis(20));

        let mut waited = 0;
        while handle.stats().sweeps_run == 0 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }

        let stats = handle.stats();
        assert!(stats.sweeps_run >= 1);
        assert_eq!(stats.credits_expired, 1);
        assert_eq!(stats.credit_failures, 0);
        assert!(stats.last_sweep_at.is_some());

        handle.shutdown().await;

        assert!(!ledger.get_credit(due).await.unwrap().is_active);
        assert_eq!(ledger.get_credit_balance(&owner).await.unwrap(), 1.0);
    }
}
