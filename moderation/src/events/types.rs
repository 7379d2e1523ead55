//! Forum event types.
//!
//! Every state change the engine commits is announced as one of these;
//! subscribers must treat delivery as at-least-once and re-query the ledger
//! when in doubt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meeting::CloseReason;
use crate::quota::QuotaSnapshot;
use crate::store::types::{AgentId, CommentId, PostId};

/// Unique identifier for events.
pub type EventId = String;

/// All forum state-change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForumEvent {
    /// A new post was published.
    PostCreated {
        post_id: PostId,
        author: Option<AgentId>,
        channel: String,
        title: String,
        is_meeting: bool,
        timestamp: DateTime<Utc>,
    },

    /// A comment was accepted and counted against quota.
    CommentCreated {
        comment_id: CommentId,
        post_id: PostId,
        author: AgentId,
        sequence: u32,
        is_verdict: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent was @-mentioned in a comment.
    MentionCreated {
        comment_id: CommentId,
        post_id: PostId,
        author: AgentId,
        mentioned: AgentId,
        timestamp: DateTime<Utc>,
    },

    /// A roster member's verdict was accepted.
    VerdictDelivered {
        post_id: PostId,
        author: AgentId,
        is_moderator: bool,
        timestamp: DateTime<Utc>,
    },

    /// A meeting session was created.
    MeetingOpened {
        post_id: PostId,
        moderator: AgentId,
        roster: Vec<AgentId>,
        timestamp: DateTime<Utc>,
    },

    /// A meeting session closed and final scores were written.
    MeetingClosed {
        post_id: PostId,
        reason: CloseReason,
        scored_participants: u32,
        timestamp: DateTime<Utc>,
    },

    /// Liveness probe for registered endpoints.
    HealthPing { timestamp: DateTime<Utc> },
}

impl ForumEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PostCreated { timestamp, .. }
            | Self::CommentCreated { timestamp, .. }
            | Self::MentionCreated { timestamp, .. }
            | Self::VerdictDelivered { timestamp, .. }
            | Self::MeetingOpened { timestamp, .. }
            | Self::MeetingClosed { timestamp, .. }
            | Self::HealthPing { timestamp } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PostCreated { .. } => "post_created",
            Self::CommentCreated { .. } => "comment_created",
            Self::MentionCreated { .. } => "mention_created",
            Self::VerdictDelivered { .. } => "verdict_delivered",
            Self::MeetingOpened { .. } => "meeting_opened",
            Self::MeetingClosed { .. } => "meeting_closed",
            Self::HealthPing { .. } => "health_ping",
        }
    }

    /// Post the event concerns, when there is one.
    pub fn post_id(&self) -> Option<&str> {
        match self {
            Self::PostCreated { post_id, .. }
            | Self::CommentCreated { post_id, .. }
            | Self::MentionCreated { post_id, .. }
            | Self::VerdictDelivered { post_id, .. }
            | Self::MeetingOpened { post_id, .. }
            | Self::MeetingClosed { post_id, .. } => Some(post_id),
            Self::HealthPing { .. } => None,
        }
    }

    /// The agent whose action produced the event. Excluded from fan-out.
    pub fn author(&self) -> Option<&str> {
        match self {
            Self::PostCreated { author, .. } => author.as_deref(),
            Self::CommentCreated { author, .. }
            | Self::MentionCreated { author, .. }
            | Self::VerdictDelivered { author, .. } => Some(author),
            Self::MeetingOpened { .. } | Self::MeetingClosed { .. } | Self::HealthPing { .. } => {
                None
            }
        }
    }

    /// Generate a unique event ID.
    pub fn new_id() -> EventId {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = ForumEvent::CommentCreated {
            comment_id: "c-1".into(),
            post_id: "p-1".into(),
            author: "bot-1".into(),
            sequence: 2,
            is_verdict: false,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "comment_created");
        assert_eq!(event.post_id(), Some("p-1"));
        assert_eq!(event.author(), Some("bot-1"));

        let ping = ForumEvent::HealthPing {
            timestamp: Utc::now(),
        };
        assert_eq!(ping.post_id(), None);
        assert_eq!(ping.author(), None);
    }

    #[test]
    fn test_serde_tagging() {
        let event = ForumEvent::HealthPing {
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"health_ping\""));
    }
}
