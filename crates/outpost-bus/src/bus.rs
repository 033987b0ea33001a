//! The publish port and its in-memory implementations.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::envelope::EventEnvelope;
use crate::error::{BusError, BusResult};

/// Port through which the projector hands batches to the transport.
///
/// One call per cycle, carrying the whole claimed batch in order. A returned
/// error means the batch as a unit was not accepted; callers own the retry
/// policy.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an ordered batch of events.
    async fn publish(&self, events: &[EventEnvelope]) -> BusResult<()>;
}

/// Bus that accepts and discards every batch.
///
/// Useful when delivery is irrelevant to the code under test.
pub struct NullBus;

#[async_trait]
impl MessageBus for NullBus {
    async fn publish(&self, _events: &[EventEnvelope]) -> BusResult<()> {
        Ok(())
    }
}

/// Bus that captures accepted batches in memory and can be scripted to fail.
///
/// Failures queued with [`RecordingBus::queue_failure`] are consumed one per
/// `publish` call before any recording happens; once the queue is drained the
/// bus accepts again (or keeps failing if [`RecordingBus::fail_always`] was
/// set). Rejected batches are never recorded.
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<EventEnvelope>>,
    scripted_failures: Mutex<VecDeque<String>>,
    persistent_failure: Mutex<Option<String>>,
    publish_calls: Mutex<usize>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot failure for an upcoming `publish` call.
    pub fn queue_failure(&self, reason: impl Into<String>) {
        self.scripted_failures
            .lock()
            .expect("lock poisoned")
            .push_back(reason.into());
    }

    /// Make every `publish` call fail until [`RecordingBus::accept_again`].
    pub fn fail_always(&self, reason: impl Into<String>) {
        *self.persistent_failure.lock().expect("lock poisoned") = Some(reason.into());
    }

    /// Clear a failure installed by [`RecordingBus::fail_always`].
    pub fn accept_again(&self) {
        *self.persistent_failure.lock().expect("lock poisoned") = None;
    }

    /// Every event accepted so far, in publish order.
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published.lock().expect("lock poisoned").clone()
    }

    /// Total `publish` calls, including rejected ones.
    pub fn publish_calls(&self) -> usize {
        *self.publish_calls.lock().expect("lock poisoned")
    }

    pub fn len(&self) -> usize {
        self.published.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().expect("lock poisoned").is_empty()
    }

    pub fn clear(&self) {
        self.published.lock().expect("lock poisoned").clear();
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, events: &[EventEnvelope]) -> BusResult<()> {
        *self.publish_calls.lock().expect("lock poisoned") += 1;

        if let Some(reason) = self
            .scripted_failures
            .lock()
            .expect("lock poisoned")
            .pop_front()
        {
            return Err(BusError::Rejected(reason));
        }
        if let Some(reason) = self
            .persistent_failure
            .lock()
            .expect("lock poisoned")
            .clone()
        {
            return Err(BusError::Rejected(reason));
        }

        debug!(count = events.len(), "recording published batch");
        self.published
            .lock()
            .expect("lock poisoned")
            .extend_from_slice(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope {
            id: Uuid::new_v4(),
            tenant_id: "alpha".to_string(),
            aggregate_id: Some("order-1".to_string()),
            event_type: event_type.to_string(),
            topic: "orders".to_string(),
            payload: json!({"ok": true}),
        }
    }

    #[tokio::test]
    async fn null_bus_accepts_everything() {
        let bus = NullBus;
        let result = bus.publish(&[envelope("order.created")]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn recording_bus_captures_batches_in_order() {
        let bus = RecordingBus::new();
        bus.publish(&[envelope("a"), envelope("b")]).await.unwrap();
        bus.publish(&[envelope("c")]).await.unwrap();

        let seen: Vec<String> = bus
            .published()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(bus.publish_calls(), 2);
    }

    #[tokio::test]
    async fn queued_failure_rejects_once_then_recovers() {
        let bus = RecordingBus::new();
        bus.queue_failure("broker offline");

        let err = bus.publish(&[envelope("a")]).await.unwrap_err();
        assert!(matches!(err, BusError::Rejected(ref r) if r == "broker offline"));
        assert!(bus.is_empty());

        bus.publish(&[envelope("a")]).await.unwrap();
        assert_eq!(bus.len(), 1);
        assert_eq!(bus.publish_calls(), 2);
    }

    #[tokio::test]
    async fn persistent_failure_holds_until_cleared() {
        let bus = RecordingBus::new();
        bus.fail_always("quota exceeded");

        assert!(bus.publish(&[envelope("a")]).await.is_err());
        assert!(bus.publish(&[envelope("b")]).await.is_err());

        bus.accept_again();
        bus.publish(&[envelope("c")]).await.unwrap();
        assert_eq!(bus.len(), 1);
    }
}
