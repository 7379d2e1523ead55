//! Delivery transport seam. Production uses HTTP webhooks; tests swap in
//! an in-memory recorder.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::registry::EndpointEntry;
use super::Envelope;

/// Header carrying the recipient's registered token.
pub const TOKEN_HEADER: &str = "X-Agent-Token";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("delivery timed out")]
    Timeout,

    #[error("endpoint rejected delivery with status {0}")]
    Rejected(u16),

    #[error("transport failure: {0}")]
    Http(String),
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one envelope to one endpoint. Must complete in bounded time.
    async fn deliver(
        &self,
        endpoint: &EndpointEntry,
        envelope: &Envelope,
    ) -> Result<(), TransportError>;
}

/// HTTP delivery: POST the JSON envelope to the registered URL.
pub struct WebhookTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookTransport {
    pub fn new(request_timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(request_timeout_secs),
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn deliver(
        &self,
        endpoint: &EndpointEntry,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&endpoint.url)
            .header(TOKEN_HEADER, &endpoint.token)
            .timeout(self.timeout)
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
