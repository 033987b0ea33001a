//! Message bus port for outbox delivery.
//!
//! This crate provides:
//! - `EventEnvelope`: the wire shape of one published event
//! - `MessageBus`: the object-safe async port the projector publishes through
//! - `HttpBus`: HTTP transport posting one batch per call
//! - `RecordingBus` / `NullBus`: test doubles with scripted failures
//!
//! The bus contract is a single `publish` call per cycle carrying the whole
//! ordered batch. Transports do not retry internally; retry accounting lives
//! with the outbox rows, so a failed batch surfaces immediately as an error.

mod bus;
mod envelope;
mod error;
mod http;

pub use bus::{MessageBus, NullBus, RecordingBus};
pub use envelope::EventEnvelope;
pub use error::{BusError, BusResult};
pub use http::{HttpBus, HttpBusConfig};
