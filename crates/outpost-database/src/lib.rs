//! SQLite storage layer for the outpost daemon.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Database migrations for the outbox and idempotency tables
//! - Model types and status enums
//! - Query helpers for claiming, resolving, replaying and purging rows
//!
//! # Architecture
//!
//! The `AsyncDatabase` uses a single dedicated thread for all SQLite
//! operations. Queries are sent through a channel and executed in FIFO order.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let batch = db.call(move |conn| {
//!     queries::claim_outbox_batch(conn, &tenant, &owner, 200, lease)
//! }).await?;
//! ```
//!
//! **Important**: Only SQL operations should run inside `db.call()`.
//! Bus publishes and codec work must happen outside.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::run_migrations;
pub use models::*;
