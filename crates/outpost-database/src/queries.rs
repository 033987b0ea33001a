//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! inside an `AsyncDatabase::call` closure or an open transaction.

use crate::{
    BacklogStats, DatabaseResult, IdempotencyRecord, IdempotencyState, NewIdempotencyRecord,
    NewOutboxRecord, OutboxRecord, OutboxStatus, PublishFailureOutcome,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

// ==========================================
// Outbox
// ==========================================

/// Insert a new outbox record.
///
/// The row id is the domain event's own id, so re-inserting the same event
/// is a no-op rather than a second row. Returns whether a row was written.
pub fn insert_outbox_record(conn: &Connection, record: &NewOutboxRecord) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "INSERT OR IGNORE INTO outbox (id, tenant_id, aggregate_id, event_type, topic, payload, status, retry_cnt, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'new', 0, ?7)",
        params![
            record.id.to_string(),
            record.tenant_id,
            record.aggregate_id,
            record.event_type,
            record.topic,
            record.payload.to_string(),
            now,
        ],
    )?;
    Ok(count == 1)
}

/// Get an outbox record by id.
pub fn get_outbox_record(conn: &Connection, id: Uuid) -> DatabaseResult<Option<OutboxRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, tenant_id, aggregate_id, event_type, topic, payload, status, retry_cnt, claimed_by, claimed_until, last_error, created_at
         FROM outbox WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok(OutboxRecord {
            id: parse_uuid(row.get::<_, String>(0)?),
            tenant_id: row.get(1)?,
            aggregate_id: row.get(2)?,
            event_type: row.get(3)?,
            topic: row.get(4)?,
            payload: row.get(5)?,
            status: OutboxStatus::from_str(&row.get::<_, String>(6)?),
            retry_cnt: row.get(7)?,
            claimed_by: row.get(8)?,
            claimed_until: row.get::<_, Option<String>>(9)?.map(parse_datetime),
            last_error: row.get(10)?,
            created_at: parse_datetime(row.get::<_, String>(11)?),
        })
    });

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Claim a batch of deliverable records for one tenant.
///
/// Stamps up to `limit` unclaimed (or lease-expired) `new` rows with this
/// owner and a lease deadline, then returns them in `created_at` order.
/// The stamp is a single UPDATE and a row under a live lease never matches
/// its subselect, so concurrent claimers always receive disjoint sets. Rows
/// left behind by a crashed claimer return to the pool when their lease
/// expires.
pub fn claim_outbox_batch(
    conn: &Connection,
    tenant_id: &str,
    owner: &str,
    limit: usize,
    lease: Duration,
) -> DatabaseResult<Vec<OutboxRecord>> {
    let now = Utc::now();
    let lease_until = (now + lease).to_rfc3339();
    let now = now.to_rfc3339();

    conn.execute(
        "UPDATE outbox
         SET claimed_by = ?1, claimed_until = ?2
         WHERE id IN (
             SELECT id FROM outbox
             WHERE tenant_id = ?3
               AND status = 'new'
               AND (claimed_until IS NULL OR claimed_until <= ?4)
             ORDER BY created_at ASC, id ASC
             LIMIT ?5
         )",
        params![owner, lease_until, tenant_id, now, limit as i64],
    )?;

    // The exact lease timestamp scopes the select to rows stamped by the
    // UPDATE above, not to leftovers from an earlier claim by this owner.
    let mut stmt = conn.prepare_cached(
        "SELECT id, tenant_id, aggregate_id, event_type, topic, payload, status, retry_cnt, claimed_by, claimed_until, last_error, created_at
         FROM outbox
         WHERE tenant_id = ?1 AND claimed_by = ?2 AND claimed_until = ?3 AND status = 'new'
         ORDER BY created_at ASC, id ASC",
    )?;

    let records = stmt
        .query_map(params![tenant_id, owner, lease_until], |row| {
            Ok(OutboxRecord {
                id: parse_uuid(row.get::<_, String>(0)?),
                tenant_id: row.get(1)?,
                aggregate_id: row.get(2)?,
                event_type: row.get(3)?,
                topic: row.get(4)?,
                payload: row.get(5)?,
                status: OutboxStatus::from_str(&row.get::<_, String>(6)?),
                retry_cnt: row.get(7)?,
                claimed_by: row.get(8)?,
                claimed_until: row.get::<_, Option<String>>(9)?.map(parse_datetime),
                last_error: row.get(10)?,
                created_at: parse_datetime(row.get::<_, String>(11)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Mark published records as sent and release their claims.
///
/// Only `new` rows are touched; `sent`, `err` and `dead` rows stay immutable.
pub fn mark_records_sent(conn: &Connection, ids: &[Uuid]) -> DatabaseResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let placeholders = std::iter::repeat("?").take(id_strings.len()).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "UPDATE outbox
         SET status = 'sent', claimed_by = NULL, claimed_until = NULL, last_error = NULL
         WHERE id IN ({}) AND status = 'new'",
        placeholders
    );

    let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(id_strings.len());
    for id in &id_strings {
        params_vec.push(id);
    }

    let count = conn.execute(&sql, params_vec.as_slice())?;
    Ok(count)
}

/// Dead-end a row whose payload failed to decode.
///
/// `retry_cnt` is untouched: the event was never attempted on the bus.
pub fn mark_record_poisoned(conn: &Connection, id: Uuid, error: &str) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE outbox
         SET status = 'err', claimed_by = NULL, claimed_until = NULL, last_error = ?1
         WHERE id = ?2 AND status = 'new'",
        params![error, id.to_string()],
    )?;
    Ok(count == 1)
}

/// Resolve a failed publish attempt for a claimed batch.
///
/// Every row gets the failed attempt counted; rows reaching `max_retry` are
/// dead-lettered; the rest return to the claimable pool. Claims are held
/// until each row's final state is written, then released.
pub fn record_publish_failure(
    conn: &Connection,
    ids: &[Uuid],
    max_retry: i32,
    error: &str,
) -> DatabaseResult<PublishFailureOutcome> {
    if ids.is_empty() {
        return Ok(PublishFailureOutcome { retrying: 0, dead: 0 });
    }
    let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let placeholders = std::iter::repeat("?").take(id_strings.len()).collect::<Vec<_>>().join(", ");

    let sql = format!(
        "UPDATE outbox
         SET retry_cnt = retry_cnt + 1, last_error = ?1
         WHERE id IN ({}) AND status = 'new'",
        placeholders
    );
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(id_strings.len() + 1);
    params_vec.push(&error);
    for id in &id_strings {
        params_vec.push(id);
    }
    conn.execute(&sql, params_vec.as_slice())?;

    let sql = format!(
        "UPDATE outbox
         SET status = 'dead', claimed_by = NULL, claimed_until = NULL
         WHERE retry_cnt >= ?1 AND status = 'new' AND id IN ({})",
        placeholders
    );
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(id_strings.len() + 1);
    params_vec.push(&max_retry);
    for id in &id_strings {
        params_vec.push(id);
    }
    let dead = conn.execute(&sql, params_vec.as_slice())?;

    let sql = format!(
        "UPDATE outbox
         SET claimed_by = NULL, claimed_until = NULL
         WHERE id IN ({}) AND status = 'new'",
        placeholders
    );
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(id_strings.len());
    for id in &id_strings {
        params_vec.push(id);
    }
    let retrying = conn.execute(&sql, params_vec.as_slice())?;

    Ok(PublishFailureOutcome { retrying, dead })
}

/// Reset a terminal `err`/`dead` row for re-delivery.
///
/// The operator escape hatch for dead-lettered rows. Returns false when the
/// row does not exist or is not in a replayable state.
pub fn replay_outbox_record(conn: &Connection, id: Uuid) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE outbox
         SET status = 'new', retry_cnt = 0, claimed_by = NULL, claimed_until = NULL, last_error = NULL
         WHERE id = ?1 AND status IN ('err', 'dead')",
        params![id.to_string()],
    )?;
    Ok(count == 1)
}

/// Delete terminal rows older than the retention cutoff for one tenant.
///
/// `new` rows are never deleted, however old.
pub fn purge_terminal_records(
    conn: &Connection,
    tenant_id: &str,
    older_than: DateTime<Utc>,
) -> DatabaseResult<usize> {
    let count = conn.execute(
        "DELETE FROM outbox
         WHERE tenant_id = ?1 AND status IN ('sent', 'err', 'dead') AND created_at < ?2",
        params![tenant_id, older_than.to_rfc3339()],
    )?;
    Ok(count)
}

/// Per-status counts and oldest undelivered timestamp for one tenant.
pub fn outbox_backlog_stats(conn: &Connection, tenant_id: &str) -> DatabaseResult<BacklogStats> {
    let mut stats = BacklogStats::default();

    let mut stmt = conn.prepare_cached(
        "SELECT status, COUNT(*) FROM outbox WHERE tenant_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![tenant_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        match OutboxStatus::from_str(&status) {
            OutboxStatus::New => stats.new = count,
            OutboxStatus::Sent => stats.sent = count,
            OutboxStatus::Err => stats.err = count,
            OutboxStatus::Dead => stats.dead = count,
        }
    }

    let oldest: Option<String> = conn.query_row(
        "SELECT MIN(created_at) FROM outbox WHERE tenant_id = ?1 AND status = 'new'",
        params![tenant_id],
        |row| row.get(0),
    )?;
    stats.oldest_new_at = oldest.map(parse_datetime);

    Ok(stats)
}

// ==========================================
// Idempotency
// ==========================================

/// Get an idempotency record by key, expired or not.
pub fn get_idempotency_record(
    conn: &Connection,
    tenant_id: &str,
    key: &str,
) -> DatabaseResult<Option<IdempotencyRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT idempotency_key, tenant_id, operation, request_hash, response, status_code, state, created_at, expires_at
         FROM idempotency WHERE tenant_id = ?1 AND idempotency_key = ?2",
    )?;

    let result = stmt.query_row(params![tenant_id, key], |row| {
        Ok(IdempotencyRecord {
            idempotency_key: row.get(0)?,
            tenant_id: row.get(1)?,
            operation: row.get(2)?,
            request_hash: row.get(3)?,
            response: row.get::<_, Option<String>>(4)?.map(parse_json),
            status_code: row.get(5)?,
            state: IdempotencyState::from_str(&row.get::<_, String>(6)?),
            created_at: parse_datetime(row.get::<_, String>(7)?),
            expires_at: parse_datetime(row.get::<_, String>(8)?),
        })
    });

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Upsert the cached outcome for a key.
///
/// Last write wins: two concurrent requests that both passed the lock check
/// resolve to one record. `created_at` of the original row is preserved.
pub fn upsert_idempotency_record(
    conn: &Connection,
    record: &NewIdempotencyRecord,
) -> DatabaseResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO idempotency (tenant_id, idempotency_key, operation, request_hash, response, status_code, state, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(tenant_id, idempotency_key) DO UPDATE SET
             operation = excluded.operation,
             request_hash = excluded.request_hash,
             response = excluded.response,
             status_code = excluded.status_code,
             state = excluded.state,
             expires_at = excluded.expires_at",
        params![
            record.tenant_id,
            record.idempotency_key,
            record.operation,
            record.request_hash,
            record.response.as_ref().map(|v| v.to_string()),
            record.status_code,
            record.state.as_str(),
            now,
            record.expires_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Flip a record to `failed` so a later retry bypasses the cached result.
pub fn mark_idempotency_failed(
    conn: &Connection,
    tenant_id: &str,
    key: &str,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE idempotency SET state = 'failed' WHERE tenant_id = ?1 AND idempotency_key = ?2",
        params![tenant_id, key],
    )?;
    Ok(count == 1)
}

/// Delete this tenant's records whose expiry has passed. Returns the count.
pub fn delete_expired_idempotency(
    conn: &Connection,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<usize> {
    let count = conn.execute(
        "DELETE FROM idempotency WHERE tenant_id = ?1 AND expires_at <= ?2",
        params![tenant_id, now.to_rfc3339()],
    )?;
    Ok(count)
}

// ==========================================
// Helpers
// ==========================================

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or(Uuid::nil())
}

fn parse_json(s: String) -> serde_json::Value {
    serde_json::from_str(&s).unwrap_or(serde_json::Value::Null)
}
