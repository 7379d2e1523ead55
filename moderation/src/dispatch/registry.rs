//! Registered agent endpoints with live delivery health.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::types::AgentId;

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Live health metadata for an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    /// Whether the endpoint is currently reachable.
    pub available: bool,
    /// Average response latency in milliseconds (rolling window).
    pub avg_latency_ms: u64,
    /// Number of successful deliveries in the last window.
    pub success_count: u64,
    /// Number of failed deliveries in the last window.
    pub error_count: u64,
    /// Last time health was updated (Unix timestamp seconds).
    pub last_checked_secs: u64,
    /// Optional human-readable status message.
    pub status_message: Option<String>,
}

impl EndpointHealth {
    /// Create a default healthy state.
    pub fn healthy() -> Self {
        Self {
            available: true,
            avg_latency_ms: 0,
            success_count: 0,
            error_count: 0,
            last_checked_secs: unix_now(),
            status_message: None,
        }
    }

    /// Compute success rate (0.0 - 1.0).
    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f32 / total as f32
        }
    }

    /// Record a successful delivery with latency.
    pub fn record_success(&mut self, latency_ms: u64) {
        self.avg_latency_ms =
            (self.avg_latency_ms * self.success_count + latency_ms) / (self.success_count + 1);
        self.success_count += 1;
        self.available = true;
        self.last_checked_secs = unix_now();
    }

    /// Record a failed delivery attempt.
    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.error_count += 1;
        self.status_message = Some(reason.into());
        self.last_checked_secs = unix_now();
    }
}

/// A registered delivery target for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub agent_id: AgentId,
    /// Webhook URL the agent listens on.
    pub url: String,
    /// Per-agent token echoed back in the auth header.
    pub token: String,
    pub health: EndpointHealth,
}

impl EndpointEntry {
    pub fn new(agent_id: &str, url: &str, token: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            url: url.to_string(),
            token: token.to_string(),
            health: EndpointHealth::healthy(),
        }
    }
}

pub type SharedRegistry = Arc<RwLock<EndpointRegistry>>;

/// All registered endpoints, keyed by agent.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<AgentId, EndpointEntry>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Register or replace an agent's endpoint. Health resets on replace.
    pub fn register(&mut self, agent_id: &str, url: &str, token: &str) {
        self.endpoints
            .insert(agent_id.to_string(), EndpointEntry::new(agent_id, url, token));
    }

    pub fn unregister(&mut self, agent_id: &str) -> bool {
        self.endpoints.remove(agent_id).is_some()
    }

    pub fn get(&self, agent_id: &str) -> Option<&EndpointEntry> {
        self.endpoints.get(agent_id)
    }

    /// Delivery targets for an event, excluding the agent whose action
    /// produced it.
    pub fn recipients_excluding(&self, author: Option<&str>) -> Vec<EndpointEntry> {
        self.endpoints
            .values()
            .filter(|e| Some(e.agent_id.as_str()) != author)
            .cloned()
            .collect()
    }

    pub fn record_success(&mut self, agent_id: &str, latency_ms: u64) {
        if let Some(entry) = self.endpoints.get_mut(agent_id) {
            entry.health.record_success(latency_ms);
        }
    }

    pub fn record_failure(&mut self, agent_id: &str, reason: &str) {
        if let Some(entry) = self.endpoints.get_mut(agent_id) {
            entry.health.record_failure(reason);
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_success_rate() {
        let mut health = EndpointHealth::healthy();
        assert_eq!(health.success_rate(), 1.0);

        health.record_success(100);
        health.record_failure("connection refused");
        assert_eq!(health.success_rate(), 0.5);
        assert_eq!(health.error_count, 1);
    }

    #[test]
    fn test_rolling_latency() {
        let mut health = EndpointHealth::healthy();
        health.record_success(100);
        health.record_success(300);
        assert_eq!(health.avg_latency_ms, 200);
    }

    #[test]
    fn test_recipients_exclude_author() {
        let mut registry = EndpointRegistry::new();
        registry.register("bot-1", "http://one/hook", "t1");
        registry.register("bot-2", "http://two/hook", "t2");

        let recipients = registry.recipients_excluding(Some("bot-1"));
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].agent_id, "bot-2");

        let all = registry.recipients_excluding(None);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_reregister_resets_health() {
        let mut registry = EndpointRegistry::new();
        registry.register("bot-1", "http://one/hook", "t1");
        registry.record_failure("bot-1", "timeout");
        registry.register("bot-1", "http://one/hook2", "t1");
        let entry = registry.get("bot-1").unwrap();
        assert_eq!(entry.health.error_count, 0);
        assert_eq!(entry.url, "http://one/hook2");
    }
}
