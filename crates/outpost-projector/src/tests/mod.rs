//! Integration tests for the outbox projector.
//!
//! Test organization:
//!
//! - `harness.rs`   - temp database, recording bus, row seeding helpers
//! - `delivery.rs`  - happy-path batches, ordering, terminal immutability
//! - `retry.rs`     - publish failure accounting up to the dead-letter ceiling
//! - `poison.rs`    - undecodable rows resolve without blocking the batch
//! - `isolation.rs` - tenant scoping and concurrent-claimer disjointness
//! - `lifecycle.rs` - run_forever/stop behavior and loop resilience
//! - `operator.rs`  - replay and lease-expiry recovery

mod delivery;
