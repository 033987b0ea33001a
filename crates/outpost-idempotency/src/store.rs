//! Tenant-scoped idempotency store over the shared database.

use chrono::{Duration, Utc};
use outpost_database::queries;
use outpost_database::{AsyncDatabase, DatabaseError, IdempotencyRecord, IdempotencyState, NewIdempotencyRecord};
use tracing::{debug, warn};

use crate::error::{IdempotencyError, IdempotencyResult};

/// Default lifetime of a stored response.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Read/write API for cached request outcomes, scoped to one tenant.
///
/// Records have two terminal states, `completed` and `failed`; there is no
/// `pending` lock state. Two concurrent requests with the same key may both
/// execute; the later `store_response` wins and both callers observe a single
/// effective result. Expired records are treated as absent on every read and
/// physically removed by [`IdempotencyStore::cleanup_expired`].
#[derive(Clone)]
pub struct IdempotencyStore {
    db: AsyncDatabase,
    tenant_id: String,
    default_ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(db: AsyncDatabase, tenant_id: impl Into<String>) -> Self {
        Self::with_default_ttl(db, tenant_id, Duration::hours(DEFAULT_TTL_HOURS))
    }

    /// Store whose unspecified-TTL writes expire after `default_ttl`.
    pub fn with_default_ttl(
        db: AsyncDatabase,
        tenant_id: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            db,
            tenant_id: tenant_id.into(),
            default_ttl,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Cached response for `key`, if a live `completed` record exists.
    pub async fn get_response(&self, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let record = self.fetch(key).await?;
        let now = Utc::now();
        Ok(record.filter(|r| r.state == IdempotencyState::Completed && !r.is_expired(now)))
    }

    /// Look up an existing record before executing an operation.
    ///
    /// Returns the live record for `key` regardless of state; callers replay
    /// a `completed` record's response and may re-execute on `failed`. A
    /// supplied `request_hash` that differs from the stored one is a hard
    /// [`IdempotencyError::Conflict`]: the key was reused for a different
    /// request body. Absent or expired records return `None` and the caller
    /// proceeds, finishing with [`IdempotencyStore::store_response`].
    pub async fn lock(
        &self,
        key: &str,
        operation: &str,
        request_hash: Option<&str>,
    ) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let Some(record) = self.fetch(key).await? else {
            return Ok(None);
        };
        if record.is_expired(Utc::now()) {
            debug!(tenant_id = %self.tenant_id, key, "expired idempotency record ignored");
            return Ok(None);
        }
        if let (Some(supplied), Some(stored)) = (request_hash, record.request_hash.as_deref()) {
            if supplied != stored {
                warn!(
                    tenant_id = %self.tenant_id,
                    key,
                    operation,
                    "idempotency key reused with a different request fingerprint"
                );
                return Err(IdempotencyError::Conflict {
                    key: key.to_string(),
                });
            }
        }
        Ok(Some(record))
    }

    /// Upsert a `completed` record expiring `ttl` (default 24h) from now.
    ///
    /// Last write wins when two concurrent executions of the same key both
    /// reach this point.
    pub async fn store_response(
        &self,
        key: &str,
        response: Option<serde_json::Value>,
        status_code: i32,
        operation: &str,
        request_hash: Option<&str>,
        ttl: Option<Duration>,
    ) -> IdempotencyResult<IdempotencyRecord> {
        let expires_at = Utc::now() + ttl.unwrap_or(self.default_ttl);
        let record = NewIdempotencyRecord {
            idempotency_key: key.to_string(),
            tenant_id: self.tenant_id.clone(),
            operation: operation.to_string(),
            request_hash: request_hash.map(str::to_string),
            response,
            status_code,
            state: IdempotencyState::Completed,
            expires_at,
        };
        let stored = self
            .db
            .call(move |conn| {
                queries::upsert_idempotency_record(conn, &record)?;
                queries::get_idempotency_record(conn, &record.tenant_id, &record.idempotency_key)
            })
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!("idempotency record '{key}' after upsert"))
            })?;
        debug!(
            tenant_id = %self.tenant_id,
            key,
            status_code,
            "stored idempotent response"
        );
        Ok(stored)
    }

    /// Flip an existing record to `failed` so it no longer replays.
    ///
    /// Returns whether a record existed.
    pub async fn mark_failed(&self, key: &str) -> IdempotencyResult<bool> {
        let tenant_id = self.tenant_id.clone();
        let key = key.to_string();
        let flipped = self
            .db
            .call(move |conn| queries::mark_idempotency_failed(conn, &tenant_id, &key))
            .await?;
        Ok(flipped)
    }

    /// Delete this tenant's expired records. Returns the count removed.
    pub async fn cleanup_expired(&self) -> IdempotencyResult<usize> {
        let tenant_id = self.tenant_id.clone();
        let removed = self
            .db
            .call(move |conn| queries::delete_expired_idempotency(conn, &tenant_id, Utc::now()))
            .await?;
        if removed > 0 {
            debug!(tenant_id = %self.tenant_id, removed, "purged expired idempotency records");
        }
        Ok(removed)
    }

    async fn fetch(&self, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let tenant_id = self.tenant_id.clone();
        let key = key.to_string();
        let record = self
            .db
            .call(move |conn| queries::get_idempotency_record(conn, &tenant_id, &key))
            .await?;
        Ok(record)
    }
}
