//! At-least-once event fan-out with bounded retry.
//!
//! Delivery is strictly downstream of state: every path here logs and
//! records health, none returns an error to the state change that produced
//! the event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::events::ForumEvent;
use crate::store::SharedStore;

use super::registry::{EndpointEntry, SharedRegistry};
use super::transport::NotificationTransport;
use super::Envelope;

pub struct Dispatcher {
    store: SharedStore,
    registry: SharedRegistry,
    transport: Arc<dyn NotificationTransport>,
    cfg: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: SharedStore,
        registry: SharedRegistry,
        transport: Arc<dyn NotificationTransport>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            cfg,
        }
    }

    /// Fan one event out to every registered endpoint except its author.
    /// Always succeeds from the caller's point of view.
    pub async fn notify(&self, event: &ForumEvent) {
        let recipients = match self.registry.read() {
            Ok(registry) => registry.recipients_excluding(event.author()),
            Err(_) => {
                warn!(event_type = event.event_type(), "endpoint registry poisoned, skipping fan-out");
                return;
            }
        };
        if recipients.is_empty() {
            return;
        }

        let deliveries = recipients
            .into_iter()
            .map(|endpoint| self.deliver_with_retry(endpoint, event));
        join_all(deliveries).await;
    }

    async fn deliver_with_retry(&self, endpoint: EndpointEntry, event: &ForumEvent) {
        let envelope = self.envelope_for(&endpoint.agent_id, event);

        for attempt in 1..=self.cfg.max_attempts {
            let started = Instant::now();
            match self.transport.deliver(&endpoint, &envelope).await {
                Ok(()) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    if let Ok(mut registry) = self.registry.write() {
                        registry.record_success(&endpoint.agent_id, latency_ms);
                    }
                    debug!(
                        agent = %endpoint.agent_id,
                        event_type = event.event_type(),
                        attempt,
                        latency_ms,
                        "notification delivered"
                    );
                    return;
                }
                Err(e) => {
                    if let Ok(mut registry) = self.registry.write() {
                        registry.record_failure(&endpoint.agent_id, &e.to_string());
                    }
                    warn!(
                        agent = %endpoint.agent_id,
                        event_type = event.event_type(),
                        attempt,
                        error = %e,
                        "notification delivery failed"
                    );
                    if attempt < self.cfg.max_attempts {
                        let backoff = self.cfg.retry_backoff_ms * u64::from(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }
        warn!(
            agent = %endpoint.agent_id,
            event_type = event.event_type(),
            attempts = self.cfg.max_attempts,
            "notification abandoned"
        );
    }

    /// Build the per-recipient envelope. The quota snapshot reflects the
    /// recipient's standing on the event's post at send time; stale by the
    /// time it lands, which is why consumers re-query when it matters.
    fn envelope_for(&self, recipient: &str, event: &ForumEvent) -> Envelope {
        let quota = event.post_id().and_then(|post_id| {
            self.store
                .get_quota(recipient, post_id)
                .ok()
                .flatten()
                .map(|entry| entry.snapshot())
        });
        Envelope {
            event_id: ForumEvent::new_id(),
            recipient: recipient.to_string(),
            event: event.clone(),
            quota,
            sent_at: Utc::now(),
        }
    }

    /// Drain a bus subscription until the bus is dropped.
    pub async fn run_receiver(self: Arc<Self>, mut receiver: Receiver<ForumEvent>) {
        info!("dispatcher loop started");
        loop {
            match receiver.recv().await {
                Ok(event) => self.notify(&event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "dispatcher lagged behind the bus");
                }
                Err(RecvError::Closed) => {
                    info!("event bus closed, dispatcher loop exiting");
                    return;
                }
            }
        }
    }
}
