//! The projector loop: claim, decode, publish, resolve.

use std::sync::Arc;

use outpost_bus::{EventEnvelope, MessageBus};
use outpost_codec::CodecRegistry;
use outpost_database::queries;
use outpost_database::{AsyncDatabase, OutboxRecord, PublishFailureOutcome};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backoff::IdleBackoff;
use crate::config::ProjectorConfig;
use crate::error::ProjectorResult;

/// Outcome of one bounded unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    /// Rows claimed this cycle.
    pub claimed: usize,
    /// Rows delivered and marked `sent`.
    pub published: usize,
    /// Rows that failed decoding and were marked `err`.
    pub poisoned: usize,
    /// Rows left `new` with an incremented retry count.
    pub retrying: usize,
    /// Rows that hit the retry ceiling and were marked `dead`.
    pub dead: usize,
    /// Whether the caller should poll again promptly instead of idling.
    pub more_work: bool,
}

impl CycleReport {
    /// Whether a publish attempt was made and resolved this cycle.
    ///
    /// A cycle that claimed nothing, or whose entire batch was poison,
    /// handled no work and the caller applies the idle backoff.
    pub fn handled_work(&self) -> bool {
        self.published > 0 || self.retrying > 0 || self.dead > 0
    }

    fn absorb(&mut self, other: CycleReport) {
        self.claimed += other.claimed;
        self.published += other.published;
        self.poisoned += other.poisoned;
        self.retrying += other.retrying;
        self.dead += other.dead;
    }
}

/// Moves committed outbox rows to the message bus for one tenant.
///
/// Any number of instances may run over the same tenant, in or across
/// processes; disjointness comes entirely from the storage claim lease, not
/// from in-process coordination. Delivery is at-least-once: a crash between
/// bus ack and status commit re-delivers the batch after the lease expires.
pub struct OutboxProjector {
    tenant_id: String,
    instance_id: String,
    db: AsyncDatabase,
    registry: Arc<CodecRegistry>,
    bus: Arc<dyn MessageBus>,
    config: ProjectorConfig,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl OutboxProjector {
    pub fn new(
        tenant_id: impl Into<String>,
        db: AsyncDatabase,
        registry: Arc<CodecRegistry>,
        bus: Arc<dyn MessageBus>,
        config: ProjectorConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            tenant_id: tenant_id.into(),
            instance_id: format!("projector-{}", Uuid::new_v4()),
            db,
            registry,
            bus,
            config,
            stop_tx,
            stop_rx,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Unique claim owner id for this instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Signal `run_forever` to exit after its current iteration. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Poll-publish loop; returns only after [`OutboxProjector::stop`].
    ///
    /// Cycle failures (database connectivity) are logged and followed by a
    /// fixed cool-down; they never terminate the loop. Empty polls back off
    /// exponentially up to `sleep_idle_max` and reset on the next work.
    pub async fn run_forever(&self) {
        let mut stop_rx = self.stop_rx.clone();
        let mut backoff = IdleBackoff::new(self.config.sleep_idle, self.config.sleep_idle_max);

        info!(
            tenant_id = %self.tenant_id,
            instance_id = %self.instance_id,
            batch_size = self.config.batch_size,
            "Starting outbox projector loop"
        );

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let sleep_for = match self.process_once().await {
                Ok(report) => {
                    if report.handled_work() {
                        backoff.reset();
                        self.config.sleep_busy
                    } else {
                        backoff.next_idle()
                    }
                }
                Err(e) => {
                    error!(
                        tenant_id = %self.tenant_id,
                        error = %e,
                        "Projector cycle failed, cooling down"
                    );
                    self.config.cooldown
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = stop_rx.changed() => {}
            }
        }

        info!(
            tenant_id = %self.tenant_id,
            instance_id = %self.instance_id,
            "Outbox projector stopped"
        );
    }

    /// Drain the current backlog synchronously.
    ///
    /// Loops `process_once` until a claim returns no rows. Bounded: every
    /// claimed row leaves the pool as `sent`, `err` or `dead`, or runs out
    /// of retry budget within `max_retry_attempts` further cycles.
    pub async fn publish_all(&self) -> ProjectorResult<CycleReport> {
        let mut total = CycleReport::default();
        loop {
            let report = self.process_once().await?;
            if report.claimed == 0 {
                break;
            }
            total.absorb(report);
        }
        Ok(total)
    }

    /// One bounded unit of work: claim, decode, publish, resolve.
    ///
    /// Poison rows resolve to `err` immediately and never block the rest of
    /// the batch. The surviving batch goes to the bus in one call; on success
    /// every row flips to `sent`, on failure every row's retry count rises
    /// and rows at the ceiling are dead-lettered. Claims are cleared whatever
    /// the outcome.
    pub async fn process_once(&self) -> ProjectorResult<CycleReport> {
        let batch = self.claim_batch().await?;
        if batch.is_empty() {
            debug!(tenant_id = %self.tenant_id, "No claimable outbox rows");
            return Ok(CycleReport::default());
        }

        let claimed = batch.len();
        let mut report = CycleReport {
            claimed,
            ..Default::default()
        };

        let (envelopes, survivor_ids) = self.decode_batch(&batch, &mut report).await?;
        if survivor_ids.is_empty() {
            return Ok(report);
        }

        match self.bus.publish(&envelopes).await {
            Ok(()) => {
                report.published = self.mark_sent(survivor_ids).await?;
                report.more_work = claimed == self.config.batch_size;
                debug!(
                    tenant_id = %self.tenant_id,
                    published = report.published,
                    poisoned = report.poisoned,
                    "Batch delivered"
                );
            }
            Err(e) => {
                warn!(
                    tenant_id = %self.tenant_id,
                    batch = survivor_ids.len(),
                    error = %e,
                    "Publish failed, recording retry"
                );
                let outcome = self.record_failure(survivor_ids, e.to_string()).await?;
                report.retrying = outcome.retrying;
                report.dead = outcome.dead;
                // Failed rows are immediately reclaimable; retry promptly.
                report.more_work = outcome.retrying > 0;
                if outcome.dead > 0 {
                    error!(
                        tenant_id = %self.tenant_id,
                        dead = outcome.dead,
                        "Rows exhausted their retry budget and were dead-lettered"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Decode every claimed row, resolving poison rows as it goes.
    async fn decode_batch(
        &self,
        batch: &[OutboxRecord],
        report: &mut CycleReport,
    ) -> ProjectorResult<(Vec<EventEnvelope>, Vec<Uuid>)> {
        let mut envelopes = Vec::with_capacity(batch.len());
        let mut survivor_ids = Vec::with_capacity(batch.len());

        for record in batch {
            match self.registry.decode(&record.event_type, &record.payload) {
                Ok(payload) => {
                    envelopes.push(EventEnvelope {
                        id: record.id,
                        tenant_id: record.tenant_id.clone(),
                        aggregate_id: record.aggregate_id.clone(),
                        event_type: record.event_type.clone(),
                        topic: record.topic.clone(),
                        payload,
                    });
                    survivor_ids.push(record.id);
                }
                Err(e) => {
                    warn!(
                        tenant_id = %self.tenant_id,
                        id = %record.id,
                        event_type = %record.event_type,
                        error = %e,
                        "Poison outbox row, resolving to err without retry"
                    );
                    self.mark_poisoned(record.id, e.to_string()).await?;
                    report.poisoned += 1;
                }
            }
        }

        Ok((envelopes, survivor_ids))
    }

    async fn claim_batch(&self) -> ProjectorResult<Vec<OutboxRecord>> {
        let tenant_id = self.tenant_id.clone();
        let owner = self.instance_id.clone();
        let limit = self.config.batch_size;
        let lease = chrono::Duration::milliseconds(self.config.claim_ttl.as_millis() as i64);
        let batch = self
            .db
            .call(move |conn| queries::claim_outbox_batch(conn, &tenant_id, &owner, limit, lease))
            .await?;
        Ok(batch)
    }

    async fn mark_poisoned(&self, id: Uuid, reason: String) -> ProjectorResult<()> {
        self.db
            .call(move |conn| queries::mark_record_poisoned(conn, id, &reason))
            .await?;
        Ok(())
    }

    async fn mark_sent(&self, ids: Vec<Uuid>) -> ProjectorResult<usize> {
        let sent = self
            .db
            .call(move |conn| queries::mark_records_sent(conn, &ids))
            .await?;
        Ok(sent)
    }

    async fn record_failure(
        &self,
        ids: Vec<Uuid>,
        reason: String,
    ) -> ProjectorResult<PublishFailureOutcome> {
        let max_retry = self.config.max_retry_attempts;
        let outcome = self
            .db
            .call(move |conn| queries::record_publish_failure(conn, &ids, max_retry, &reason))
            .await?;
        Ok(outcome)
    }
}
