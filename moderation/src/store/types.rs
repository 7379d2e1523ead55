//! Core domain records shared by every engine component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque agent identifier.
pub type AgentId = String;

/// Post identifier.
pub type PostId = String;

/// Comment identifier.
pub type CommentId = String;

/// Author of a post — humans post too, but only agents are moderated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Author {
    Human { name: String },
    Agent { id: AgentId },
}

impl Author {
    /// The agent id, when the author is an agent.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Author::Agent { id } => Some(id),
            Author::Human { .. } => None,
        }
    }
}

/// A registered agent. Never deleted — deactivated instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Display name, used for @mention and inline-rating resolution.
    pub name: String,
    pub active: bool,
    /// Rolling window of past meeting outcomes, newest last.
    pub history: Vec<MeetingScore>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Consensus score from the most recent meeting this agent was scored in.
    pub fn latest_meeting_score(&self) -> Option<f64> {
        self.history.last().map(|s| s.score)
    }
}

/// One scored meeting in an agent's performance history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingScore {
    pub meeting_id: PostId,
    /// Outlier-filtered mean of peer ratings.
    pub score: f64,
    /// Ratings that survived the anti-collusion filter.
    pub ratings_counted: usize,
    pub recorded_at: DateTime<Utc>,
}

/// A forum post. Immutable after creation except for the aggregate counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub channel: String,
    pub author: Author,
    pub title: String,
    pub body: String,
    pub is_meeting: bool,
    /// Maintained by the engine on each accepted comment.
    pub comment_count: u64,
    /// Maintained by the engine on each vote upsert.
    pub vote_total: i64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(
        id: impl Into<PostId>,
        channel: impl Into<String>,
        author: Author,
        title: impl Into<String>,
        body: impl Into<String>,
        is_meeting: bool,
    ) -> Self {
        Self {
            id: id.into(),
            channel: channel.into(),
            author,
            title: title.into(),
            body: body.into(),
            is_meeting,
            comment_count: 0,
            vote_total: 0,
            created_at: Utc::now(),
        }
    }
}

/// A comment. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: AgentId,
    /// Monotonic per (post, agent), assigned by the quota ledger.
    pub sequence: u32,
    pub body: String,
    pub is_verdict: bool,
    pub created_at: DateTime<Utc>,
}

/// A peer rating given inside a meeting. Unique by (rater, ratee, meeting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rater: AgentId,
    pub ratee: AgentId,
    pub meeting_id: PostId,
    /// Closed interval [0, 10].
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_agent_id() {
        let a = Author::Agent {
            id: "bot-1".to_string(),
        };
        assert_eq!(a.agent_id(), Some("bot-1"));

        let h = Author::Human {
            name: "alice".to_string(),
        };
        assert_eq!(h.agent_id(), None);
    }

    #[test]
    fn test_latest_meeting_score() {
        let mut agent = Agent::new("bot-1", "Yilin");
        assert_eq!(agent.latest_meeting_score(), None);

        agent.history.push(MeetingScore {
            meeting_id: "m-1".to_string(),
            score: 6.5,
            ratings_counted: 3,
            recorded_at: Utc::now(),
        });
        agent.history.push(MeetingScore {
            meeting_id: "m-2".to_string(),
            score: 8.0,
            ratings_counted: 4,
            recorded_at: Utc::now(),
        });
        assert_eq!(agent.latest_meeting_score(), Some(8.0));
    }

    #[test]
    fn test_new_post_counters_start_at_zero() {
        let post = Post::new(
            "p-1",
            "ai-news",
            Author::Agent {
                id: "bot-1".to_string(),
            },
            "title",
            "body",
            false,
        );
        assert_eq!(post.comment_count, 0);
        assert_eq!(post.vote_total, 0);
        assert!(!post.is_meeting);
    }
}
