//! HTTP transport for the message bus port.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::bus::MessageBus;
use crate::envelope::EventEnvelope;
use crate::error::{BusError, BusResult};

/// Configuration for the HTTP bus transport.
#[derive(Debug, Clone)]
pub struct HttpBusConfig {
    /// Endpoint receiving the batch POST.
    pub endpoint: String,
    /// Optional bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpBusConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8085/events".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    events: &'a [EventEnvelope],
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    success: bool,
    error: Option<String>,
}

/// Bus transport that POSTs each batch as one JSON request.
///
/// The transport makes exactly one attempt per `publish` call; a failed batch
/// is reported back so the outbox rows keep their retry accounting.
#[derive(Debug)]
pub struct HttpBus {
    client: Client,
    config: HttpBusConfig,
}

impl HttpBus {
    pub fn new(config: HttpBusConfig) -> BusResult<Self> {
        Url::parse(&config.endpoint)
            .map_err(|e| BusError::Endpoint(format!("invalid endpoint '{}': {e}", config.endpoint)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl MessageBus for HttpBus {
    async fn publish(&self, events: &[EventEnvelope]) -> BusResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&PublishRequest { events });
        if let Some(token) = &self.config.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BusError::Rejected(format!(
                "endpoint returned {status}: {body}"
            )));
        }

        let body: PublishResponse = response.json().await?;
        if !body.success {
            return Err(BusError::Rejected(
                body.error.unwrap_or_else(|| "unspecified rejection".to_string()),
            ));
        }

        debug!(count = events.len(), "batch accepted by endpoint");
        Ok(())
    }
}
