//! The wire shape of one published event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One event as handed to the message bus.
///
/// The payload has already been validated by the codec registry; whatever
/// reaches an envelope is publishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// The domain event's id, also the outbox row id.
    pub id: Uuid,
    pub tenant_id: String,
    pub aggregate_id: Option<String>,
    pub event_type: String,
    /// Logical destination; the bus maps this to a physical channel.
    pub topic: String,
    pub payload: serde_json::Value,
}
