//! Write-back synchronizer
//!
//! Periodically drains dirty markers from the [`LedgerStore`] into a
//! [`PersistenceGateway`]:
//!
//! ```text
//! ┌───────────────────────────┐   collect_pending()   ┌──────────────────────┐
//! │        LedgerStore        │ ────────────────────▶ │  Vec<PendingAccount> │
//! │  (registry lock held only │                       └──────────┬───────────┘
//! │   for copy and clear)     │                                  │ insert / update
//! │                           │   acknowledge()       ┌──────────▼───────────┐
//! │                           │ ◀──────────────────── │  PersistenceGateway  │
//! └───────────────────────────┘                       └──────────────────────┘
//! ```
//!
//! Per account, writes happen in this order: account insert, balance update,
//! deposits in apply order, transactions in apply order. Each gateway call is
//! bounded by a timeout.
//!
//! A gateway failure is fatal. The cycle stops at the failing call and the
//! error is returned to the caller; [`WriteBackSynchronizer::run`] exits with
//! it and the process is expected to terminate.

use crate::{
    config::SyncConfig,
    gateway::{Collection, PersistenceGateway},
    ledger::{LedgerStore, PendingAccount},
    metrics::Metrics,
    Error, Result,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

/// Documents written in one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Account documents inserted
    pub accounts_inserted: usize,
    /// Balance fields updated
    pub balances_updated: usize,
    /// Deposit documents inserted
    pub deposits_inserted: usize,
    /// Transaction documents inserted
    pub transactions_inserted: usize,
}

impl SyncReport {
    /// Total gateway writes
    pub fn total(&self) -> usize {
        self.accounts_inserted
            + self.balances_updated
            + self.deposits_inserted
            + self.transactions_inserted
    }
}

/// Background write-back task
pub struct WriteBackSynchronizer {
    store: Arc<LedgerStore>,
    gateway: Arc<dyn PersistenceGateway>,
    interval: Duration,
    gateway_timeout: Duration,
    metrics: Option<Metrics>,
    /// Serializes cycles (periodic and manual)
    cycle: Mutex<()>,
}

impl WriteBackSynchronizer {
    /// Create synchronizer
    pub fn new(
        store: Arc<LedgerStore>,
        gateway: Arc<dyn PersistenceGateway>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            interval: config.interval(),
            gateway_timeout: config.gateway_timeout(),
            metrics: None,
            cycle: Mutex::new(()),
        }
    }

    /// Attach metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one write-back cycle
    pub async fn flush(&self) -> Result<SyncReport> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();

        let pending = self.store.collect_pending();
        let mut report = SyncReport::default();

        for account in &pending {
            self.flush_account(account, &mut report).await?;
            self.store.acknowledge(account);
        }

        let remaining = self.store.pending_units();
        if let Some(metrics) = &self.metrics {
            metrics.record_sync_cycle(report.total(), started.elapsed().as_secs_f64(), remaining);
        }

        if report.total() > 0 {
            tracing::info!(
                accounts = report.accounts_inserted,
                balances = report.balances_updated,
                deposits = report.deposits_inserted,
                transactions = report.transactions_inserted,
                remaining,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Write-back cycle complete"
            );
        }

        Ok(report)
    }

    async fn flush_account(&self, account: &PendingAccount, report: &mut SyncReport) -> Result<()> {
        let key = account.id.to_string();

        if let Some(record) = &account.insert {
            let document = serde_json::to_value(record)?;
            self.bounded(
                "insert users",
                self.gateway.insert(Collection::Users, &key, document),
            )
            .await?;
            report.accounts_inserted += 1;
        }

        if let Some(balance) = &account.balance {
            let mut fields = Map::new();
            // Same exact string form as the inserted account document
            fields.insert(
                "balance".to_string(),
                Value::String(balance.balance.to_string()),
            );
            self.bounded(
                "update users.balance",
                self.gateway.update_fields(Collection::Users, &key, fields),
            )
            .await?;
            report.balances_updated += 1;
        }

        for (_, deposit) in &account.deposits {
            let document: Value = serde_json::to_value(deposit)?;
            self.bounded(
                "insert deposits",
                self.gateway
                    .insert(Collection::Deposits, &deposit.document_key(), document),
            )
            .await?;
            report.deposits_inserted += 1;
        }

        for (_, transaction) in &account.transactions {
            let document: Value = serde_json::to_value(transaction)?;
            self.bounded(
                "insert transactions",
                self.gateway.insert(
                    Collection::Transactions,
                    &transaction.document_key(),
                    document,
                ),
            )
            .await?;
            report.transactions_inserted += 1;
        }

        Ok(())
    }

    async fn bounded<F>(&self, operation: &str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match timeout(self.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.gateway_timeout.as_millis() as u64,
            }),
        }
    }

    /// Run the periodic loop until shutdown or the first gateway failure.
    ///
    /// On shutdown a final cycle runs before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.gateway_timeout.as_millis() as u64,
            "Write-back synchronizer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::error!(error = %e, "Write-back cycle failed");
                        return Err(e);
                    }
                }

                _ = shutdown.changed() => {
                    tracing::info!("Write-back synchronizer stopping, running final cycle");
                    if let Err(e) = self.flush().await {
                        tracing::error!(error = %e, "Final write-back cycle failed");
                        return Err(e);
                    }
                    return Ok(());
                }
            }
        }
    }
}

/// Handle to a spawned synchronizer
#[derive(Debug)]
pub struct SyncHandle {
    task: JoinHandle<Result<()>>,
    shutdown: watch::Sender<bool>,
    finished: bool,
}

impl SyncHandle {
    /// Wait for the task to end; resolves only on failure or after shutdown
    pub async fn join(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::Concurrency("Synchronizer already joined".to_string()));
        }
        let result = (&mut self.task).await;
        self.finished = true;
        result.map_err(|e| Error::Concurrency(format!("Synchronizer task failed: {}", e)))?
    }

    /// Signal shutdown, wait for the final cycle
    pub async fn shutdown(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        // Receiver gone means the task already ended; join reports how
        let _ = self.shutdown.send(true);
        self.join().await
    }
}

/// Spawn the synchronizer loop
pub fn spawn_synchronizer(synchronizer: Arc<WriteBackSynchronizer>) -> SyncHandle {
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(synchronizer.run(rx));

    SyncHandle {
        task,
        shutdown: tx,
        finished: false,
    }
}
