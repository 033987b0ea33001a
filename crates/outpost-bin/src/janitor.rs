//! Retention sweeper for terminal outbox rows and expired idempotency records.
//!
//! The projector never deletes rows; the janitor is the only removal path.
//! Each sweep deletes terminal (`sent`/`err`/`dead`) outbox rows older than
//! the retention window and expired idempotency records, per tenant. `new`
//! rows are never touched, however old.

use chrono::{Duration as ChronoDuration, Utc};
use outpost_config::Config;
use outpost_database::{queries, AsyncDatabase};
use outpost_idempotency::IdempotencyStore;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Periodic cleanup worker. One instance covers every configured tenant.
pub struct Janitor {
    db: AsyncDatabase,
    stores: Vec<IdempotencyStore>,
    retention: ChronoDuration,
    interval: std::time::Duration,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Janitor {
    pub fn new(db: AsyncDatabase, config: &Config) -> Self {
        let stores = config
            .effective_tenants()
            .into_iter()
            .map(|tenant| IdempotencyStore::new(db.clone(), tenant))
            .collect();
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            db,
            stores,
            retention: ChronoDuration::days(config.retention_days),
            interval: std::time::Duration::from_secs(config.janitor_interval_secs),
            stop_tx,
            stop_rx,
        }
    }

    /// Signal `run_forever` to exit. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Sweep on the configured interval until stopped.
    ///
    /// Sweep failures are logged and the loop keeps going; a broken sweep
    /// must not take the daemon down with it.
    pub async fn run_forever(&self) {
        let mut stop_rx = self.stop_rx.clone();
        loop {
            if *stop_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop_rx.changed() => continue,
            }

            match self.sweep_once().await {
                Ok((purged, expired)) if purged > 0 || expired > 0 => {
                    info!(purged, expired, "janitor removed records");
                }
                Ok(_) => debug!("janitor sweep found nothing to remove"),
                Err(e) => error!(error = %e, "janitor sweep failed"),
            }
        }
        debug!("janitor stopped");
    }

    /// One sweep over every tenant.
    ///
    /// Returns (purged outbox rows, removed idempotency records).
    pub async fn sweep_once(&self) -> anyhow::Result<(usize, usize)> {
        let cutoff = Utc::now() - self.retention;
        let mut purged = 0;
        let mut expired = 0;

        for store in &self.stores {
            let tenant = store.tenant_id().to_string();
            purged += self
                .db
                .call(move |conn| queries::purge_terminal_records(conn, &tenant, cutoff))
                .await?;
            expired += store.cleanup_expired().await?;
        }

        Ok((purged, expired))
    }
}
