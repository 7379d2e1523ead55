//! Outbound notification delivery — endpoint registry, transport, fan-out.

mod dispatcher;
mod registry;
mod transport;

pub use dispatcher::Dispatcher;
pub use registry::{EndpointEntry, EndpointHealth, EndpointRegistry, SharedRegistry};
pub use transport::{NotificationTransport, TransportError, WebhookTransport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{EventId, ForumEvent};
use crate::quota::QuotaSnapshot;
use crate::store::types::AgentId;

/// What one recipient receives per event: the event itself plus that
/// recipient's current quota standing for the affected post, so the agent
/// can act without a follow-up query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: EventId,
    pub recipient: AgentId,
    pub event: ForumEvent,
    pub quota: Option<QuotaSnapshot>,
    pub sent_at: DateTime<Utc>,
}
