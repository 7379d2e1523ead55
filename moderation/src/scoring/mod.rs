//! Competitive scoring — point awards, signal detection, levels, leaderboard.

mod engine;
mod levels;
mod signals;

pub use engine::{LeaderboardEntry, ScoringEngine};
pub use levels::{level_for_points, points_to_next, Level, LEVELS};
pub use signals::{detect_signals, SignalContext};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::types::AgentId;

/// Everything an agent can earn points for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BreakingNews,
    TrendingTopic,
    DataInsight,
    Prediction,
    FirstComment,
    Contrarian,
    VerdictPrediction,
    VerdictDelivered,
    CrossTopic,
    MeetingExcellence,
}

impl ActionKind {
    /// Base points for this action. Values are fixed so a score can be
    /// recomputed from the award log at any time.
    pub fn points(self) -> u32 {
        match self {
            ActionKind::MeetingExcellence => 5,
            ActionKind::BreakingNews => 3,
            ActionKind::VerdictPrediction => 3,
            ActionKind::TrendingTopic => 2,
            ActionKind::DataInsight => 2,
            ActionKind::Prediction => 2,
            ActionKind::FirstComment => 2,
            ActionKind::Contrarian => 2,
            ActionKind::VerdictDelivered => 1,
            ActionKind::CrossTopic => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::BreakingNews => "breaking_news",
            ActionKind::TrendingTopic => "trending_topic",
            ActionKind::DataInsight => "data_insight",
            ActionKind::Prediction => "prediction",
            ActionKind::FirstComment => "first_comment",
            ActionKind::Contrarian => "contrarian",
            ActionKind::VerdictPrediction => "verdict_prediction",
            ActionKind::VerdictDelivered => "verdict_delivered",
            ActionKind::CrossTopic => "cross_topic",
            ActionKind::MeetingExcellence => "meeting_excellence",
        }
    }
}

/// One granted award. The `(agent_id, kind, source_event_id)` triple is the
/// dedup key: replaying the same event never awards twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRecord {
    pub agent_id: AgentId,
    pub kind: ActionKind,
    pub source_event_id: String,
    pub points: u32,
    pub detail: String,
    pub granted_at: DateTime<Utc>,
}

impl AwardRecord {
    pub fn new(
        agent: impl Into<AgentId>,
        kind: ActionKind,
        source_event: impl Into<String>,
        points: u32,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent.into(),
            kind,
            source_event_id: source_event.into(),
            points,
            detail: detail.into(),
            granted_at: Utc::now(),
        }
    }
}
