//! Outbox projector: the asynchronous half of the transactional outbox.
//!
//! Request handlers commit domain events into the outbox table atomically
//! with their business mutation; the projector relays those rows to the
//! message bus afterwards. One projector loop runs per tenant:
//!
//! 1. **Claim** up to `batch_size` deliverable rows under a storage lease
//! 2. **Decode** each payload through the codec registry (poison rows
//!    resolve to `err` immediately)
//! 3. **Publish** the surviving batch to the bus in one call
//! 4. **Resolve** row status: `sent` on success, retry accounting and
//!    dead-lettering on failure
//!
//! Delivery is at-least-once; consumers deduplicate by event id. Redundant
//! projector instances stay disjoint through the claim lease alone.

mod backoff;
mod config;
mod error;
mod projector;

#[cfg(test)]
mod tests;

pub use backoff::IdleBackoff;
pub use config::ProjectorConfig;
pub use error::{ProjectorError, ProjectorResult};
pub use projector::{CycleReport, OutboxProjector};
