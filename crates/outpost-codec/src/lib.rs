//! Event codec registry.
//!
//! Outbox payloads are stored as raw JSON text. Before a batch goes to the
//! bus, each row's payload is decoded through the codec registered for its
//! event type; a row that fails here is poison and never reaches the bus.
//!
//! The registry is an explicit value constructed at startup and handed to
//! each projector. There is no process-wide registration, so tests install
//! isolated registries with exactly the codecs they need.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use thiserror::Error;

/// Codec error type.
#[derive(Error, Debug)]
pub enum CodecError {
    /// No codec registered for the event type
    #[error("no codec registered for event type '{0}'")]
    UnknownEventType(String),

    /// Payload did not match the registered codec's shape
    #[error("payload for event type '{event_type}' failed to decode: {reason}")]
    DecodeFailed { event_type: String, reason: String },
}

/// Result type alias using CodecError.
pub type CodecResult<T> = Result<T, CodecError>;

/// Decodes one event type's raw payload into its canonical JSON form.
pub trait EventCodec: Send + Sync {
    /// Validate and normalize a raw payload.
    fn decode(&self, payload: &str) -> serde_json::Result<serde_json::Value>;
}

/// Codec that round-trips a payload through a typed struct.
///
/// Decoding succeeds only when the payload deserializes as `T`, which is
/// what flags a poison row before it reaches the bus.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventCodec for JsonCodec<T>
where
    T: DeserializeOwned + Serialize + Send + Sync,
{
    fn decode(&self, payload: &str) -> serde_json::Result<serde_json::Value> {
        let event: T = serde_json::from_str(payload)?;
        serde_json::to_value(event)
    }
}

/// Codec that accepts any well-formed JSON without a schema.
///
/// For event types whose payloads are forwarded verbatim.
#[derive(Debug, Default)]
pub struct PassthroughCodec;

impl EventCodec for PassthroughCodec {
    fn decode(&self, payload: &str) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(payload)
    }
}

/// Explicit mapping from event type name to codec.
///
/// Built once at startup, then shared read-only by every projector.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Box<dyn EventCodec>>,
    fallback: Option<Box<dyn EventCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec for an event type. Replaces any existing entry.
    pub fn register(&mut self, event_type: impl Into<String>, codec: Box<dyn EventCodec>) {
        self.codecs.insert(event_type.into(), codec);
    }

    /// Install a codec consulted when an event type has no registered entry.
    ///
    /// Without a fallback, unregistered types are poison.
    pub fn set_fallback(&mut self, codec: Box<dyn EventCodec>) {
        self.fallback = Some(codec);
    }

    /// Register a typed JSON codec for an event type.
    pub fn register_json<T>(&mut self, event_type: impl Into<String>)
    where
        T: DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        self.register(event_type, Box::new(JsonCodec::<T>::new()));
    }

    /// Whether a codec is registered for the event type.
    pub fn contains(&self, event_type: &str) -> bool {
        self.codecs.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Decode a raw payload through the codec registered for `event_type`.
    pub fn decode(&self, event_type: &str, payload: &str) -> CodecResult<serde_json::Value> {
        let codec = self
            .codecs
            .get(event_type)
            .or(self.fallback.as_ref())
            .ok_or_else(|| CodecError::UnknownEventType(event_type.to_string()))?;
        codec.decode(payload).map_err(|e| CodecError::DecodeFailed {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        })
    }
}
