//! Idempotency layer for request handlers.
//!
//! Callers guard a mutating operation with a client-supplied idempotency key:
//! `lock` checks for a prior execution (and rejects key reuse with a
//! different request fingerprint), `store_response` caches the outcome, and
//! duplicates replay the cached response instead of re-executing. Keys are
//! scoped per tenant and expire after a TTL.

mod error;
mod fingerprint;
mod store;

pub use error::{IdempotencyError, IdempotencyResult};
pub use fingerprint::request_fingerprint;
pub use store::{IdempotencyStore, DEFAULT_TTL_HOURS};
