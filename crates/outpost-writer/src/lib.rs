//! Transactional write path: business mutation and outbox rows commit as one.
//!
//! A request handler stages domain events on a [`UnitOfWork`] while mutating
//! business state, then commits both through a single SQLite transaction. If
//! the mutation fails, no event is written; if the commit succeeds, delivery
//! is guaranteed by the projector. There is no path that persists one side
//! without the other.

use outpost_database::queries;
use outpost_database::{AsyncDatabase, DatabaseError, NewOutboxRecord};
use rusqlite::Transaction;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WriterError {
    /// SQLite failure inside the business mutation
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Storage failure
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// The business mutation refused to commit
    #[error("unit of work aborted: {0}")]
    Aborted(String),
}

/// Result type alias using WriterError.
pub type WriterResult<T> = Result<T, WriterError>;

/// One domain event staged for atomic insertion alongside a business mutation.
///
/// The id doubles as the outbox row id; staging the same id twice (or
/// re-running a handler that derives ids deterministically) inserts one row.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub id: Uuid,
    pub aggregate_id: Option<String>,
    pub event_type: String,
    pub topic: String,
    pub payload: Value,
}

impl PendingEvent {
    pub fn new(
        event_type: impl Into<String>,
        topic: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: None,
            event_type: event_type.into(),
            topic: topic.into(),
            payload,
        }
    }

    /// Use a caller-chosen id instead of a random one.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_aggregate(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_id = Some(aggregate_id.into());
        self
    }
}

/// Collects pending events during a request and commits them with the
/// caller's business mutation in one transaction.
pub struct UnitOfWork {
    tenant_id: String,
    staged: Vec<PendingEvent>,
}

impl UnitOfWork {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            staged: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Stage an event for the next commit.
    pub fn stage(&mut self, event: PendingEvent) {
        self.staged.push(event);
    }

    pub fn staged(&self) -> &[PendingEvent] {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Run `mutation` and insert every staged event in a single transaction.
    ///
    /// The closure receives the open transaction for its business writes and
    /// may abort with any [`WriterError`]; dropping the transaction rolls
    /// everything back, staged events included. Consumes the unit of work so
    /// events are drained exactly once. Staged events whose id already exists
    /// in the outbox are skipped without failing the commit.
    pub async fn commit<F, T>(self, db: &AsyncDatabase, mutation: F) -> WriterResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> WriterResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let tenant_id = self.tenant_id;
        let staged = self.staged;
        let count = staged.len();

        let outcome: WriterResult<T> = db
            .call_mut(move |conn| {
                let tx = conn.transaction().map_err(DatabaseError::from)?;
                let value = match mutation(&tx) {
                    Ok(value) => value,
                    // Caller abort: drop the transaction, surface their error.
                    Err(e) => return Ok(Err(e)),
                };
                for event in staged {
                    let record = NewOutboxRecord {
                        id: event.id,
                        tenant_id: tenant_id.clone(),
                        aggregate_id: event.aggregate_id,
                        event_type: event.event_type,
                        topic: event.topic,
                        payload: event.payload,
                    };
                    let inserted = queries::insert_outbox_record(&tx, &record)?;
                    if !inserted {
                        debug!(id = %record.id, "staged event already in outbox, skipped");
                    }
                }
                tx.commit().map_err(DatabaseError::from)?;
                Ok(Ok(value))
            })
            .await?;

        if outcome.is_ok() {
            debug!(events = count, "unit of work committed");
        }
        outcome
    }
}
