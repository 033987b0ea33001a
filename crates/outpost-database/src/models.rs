//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbox record - one domain event captured for delivery to the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub aggregate_id: Option<String>,
    pub event_type: String,
    pub topic: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub retry_cnt: i32,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outbox delivery status.
///
/// `New` is the only live state. `Sent`, `Err` and `Dead` are terminal:
/// the projector never touches a row again once it leaves `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    New,
    Sent,
    Err,
    Dead,
}

impl Default for OutboxStatus {
    fn default() -> Self {
        Self::New
    }
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Sent => "sent",
            Self::Err => "err",
            Self::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sent" => Self::Sent,
            "err" => Self::Err,
            "dead" => Self::Dead,
            _ => Self::New,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::New)
    }
}

/// New outbox record for insertion.
///
/// `id` is the domain event's own id. Inserting the same event twice is a
/// duplicate-key no-op, not a second row.
#[derive(Debug, Clone)]
pub struct NewOutboxRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub aggregate_id: Option<String>,
    pub event_type: String,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Idempotency record - the cached outcome of one keyed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub tenant_id: String,
    pub operation: String,
    pub request_hash: Option<String>,
    pub response: Option<serde_json::Value>,
    pub status_code: i32,
    pub state: IdempotencyState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Whether the record's expiry has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Idempotency record state. Two terminal states, no pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyState {
    Completed,
    Failed,
}

impl Default for IdempotencyState {
    fn default() -> Self {
        Self::Completed
    }
}

impl IdempotencyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "completed" => Self::Completed,
            // An unknown state must never replay as a cached success.
            _ => Self::Failed,
        }
    }
}

/// New idempotency record for upsert. Timestamps are computed by the store.
#[derive(Debug, Clone)]
pub struct NewIdempotencyRecord {
    pub idempotency_key: String,
    pub tenant_id: String,
    pub operation: String,
    pub request_hash: Option<String>,
    pub response: Option<serde_json::Value>,
    pub status_code: i32,
    pub state: IdempotencyState,
    pub expires_at: DateTime<Utc>,
}

/// Per-status row counts for one tenant's outbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacklogStats {
    pub new: i64,
    pub sent: i64,
    pub err: i64,
    pub dead: i64,
    pub oldest_new_at: Option<DateTime<Utc>>,
}

/// Result of resolving a failed publish attempt against its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishFailureOutcome {
    /// Rows still `new`, eligible for another attempt.
    pub retrying: usize,
    /// Rows that hit the retry ceiling and were dead-lettered.
    pub dead: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_status_from_str() {
        assert_eq!(OutboxStatus::from_str("new"), OutboxStatus::New);
        assert_eq!(OutboxStatus::from_str("NEW"), OutboxStatus::New);
        assert_eq!(OutboxStatus::from_str("sent"), OutboxStatus::Sent);
        assert_eq!(OutboxStatus::from_str("SENT"), OutboxStatus::Sent);
        assert_eq!(OutboxStatus::from_str("err"), OutboxStatus::Err);
        assert_eq!(OutboxStatus::from_str("ERR"), OutboxStatus::Err);
        assert_eq!(OutboxStatus::from_str("dead"), OutboxStatus::Dead);
        assert_eq!(OutboxStatus::from_str("DEAD"), OutboxStatus::Dead);
        // Unknown maps to New
        assert_eq!(OutboxStatus::from_str("other"), OutboxStatus::New);
        assert_eq!(OutboxStatus::from_str(""), OutboxStatus::New);
    }

    #[test]
    fn test_outbox_status_as_str() {
        assert_eq!(OutboxStatus::New.as_str(), "new");
        assert_eq!(OutboxStatus::Sent.as_str(), "sent");
        assert_eq!(OutboxStatus::Err.as_str(), "err");
        assert_eq!(OutboxStatus::Dead.as_str(), "dead");
    }

    #[test]
    fn test_outbox_status_default() {
        assert_eq!(OutboxStatus::default(), OutboxStatus::New);
    }

    #[test]
    fn test_outbox_status_terminal() {
        assert!(!OutboxStatus::New.is_terminal());
        assert!(OutboxStatus::Sent.is_terminal());
        assert!(OutboxStatus::Err.is_terminal());
        assert!(OutboxStatus::Dead.is_terminal());
    }

    #[test]
    fn test_idempotency_state_from_str() {
        assert_eq!(
            IdempotencyState::from_str("completed"),
            IdempotencyState::Completed
        );
        assert_eq!(
            IdempotencyState::from_str("COMPLETED"),
            IdempotencyState::Completed
        );
        assert_eq!(
            IdempotencyState::from_str("failed"),
            IdempotencyState::Failed
        );
        // Unknown maps to Failed, never to a replayable success
        assert_eq!(
            IdempotencyState::from_str("pending"),
            IdempotencyState::Failed
        );
        assert_eq!(IdempotencyState::from_str(""), IdempotencyState::Failed);
    }

    #[test]
    fn test_idempotency_state_as_str() {
        assert_eq!(IdempotencyState::Completed.as_str(), "completed");
        assert_eq!(IdempotencyState::Failed.as_str(), "failed");
    }

    #[test]
    fn test_idempotency_record_expiry() {
        let now = Utc::now();
        let record = IdempotencyRecord {
            idempotency_key: "key-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            operation: "create_order".to_string(),
            request_hash: None,
            response: None,
            status_code: 200,
            state: IdempotencyState::Completed,
            created_at: now,
            expires_at: now + chrono::Duration::hours(24),
        };

        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + chrono::Duration::hours(25)));
        // Boundary: exactly at expires_at counts as expired
        assert!(record.is_expired(now + chrono::Duration::hours(24)));
    }
}
