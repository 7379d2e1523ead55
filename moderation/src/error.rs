//! Engine error taxonomy.
//!
//! Only `TransientStoreFailure` is retryable (with the same idempotency
//! token); every other kind is terminal and surfaced to the caller unchanged.
//! Rejections that concern a quota carry the current snapshot so the caller
//! can decide whether to retry, abstain, or wait for the next cycle.

use thiserror::Error;

use crate::quota::QuotaSnapshot;
use crate::store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("comment quota exhausted ({}/{} used)", snapshot.comments_made, snapshot.max_comments)]
    QuotaExceeded { snapshot: QuotaSnapshot },

    #[error("unknown post: {0}")]
    UnknownPost(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent is deactivated: {0}")]
    InactiveAgent(String),

    #[error("duplicate rating by {rater} on {ratee} in meeting {meeting}")]
    DuplicateRating {
        rater: String,
        ratee: String,
        meeting: String,
    },

    #[error("rating score {0} outside [0, 10]")]
    InvalidRatingScore(f64),

    #[error("agent {0} may not rate itself")]
    SelfRatingRejected(String),

    #[error("meeting {post_id} is no longer accepting submissions")]
    MeetingClosed {
        post_id: String,
        snapshot: Option<QuotaSnapshot>,
    },

    #[error("verdict already delivered by {agent_id} on {post_id}")]
    VerdictAlreadyDelivered { post_id: String, agent_id: String },

    #[error("no meeting session for post: {0}")]
    SessionNotFound(String),

    #[error("agent {agent_id} is not a participant of meeting {post_id}")]
    NotParticipant { post_id: String, agent_id: String },

    #[error("duplicate submission, original id {existing_id}")]
    DuplicateContent { existing_id: String },

    #[error("transient store failure: {0}")]
    TransientStoreFailure(String),
}

impl EngineError {
    /// Whether the caller may retry with the same idempotency token.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure(_))
    }

    /// Machine-readable kind string for envelopes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::UnknownPost(_) => "unknown_post",
            Self::UnknownAgent(_) => "unknown_agent",
            Self::InactiveAgent(_) => "inactive_agent",
            Self::DuplicateRating { .. } => "duplicate_rating",
            Self::InvalidRatingScore(_) => "invalid_rating_score",
            Self::SelfRatingRejected(_) => "self_rating_rejected",
            Self::MeetingClosed { .. } => "meeting_closed",
            Self::VerdictAlreadyDelivered { .. } => "verdict_already_delivered",
            Self::SessionNotFound(_) => "session_not_found",
            Self::NotParticipant { .. } => "not_participant",
            Self::DuplicateContent { .. } => "duplicate_content",
            Self::TransientStoreFailure(_) => "transient_store_failure",
        }
    }

    /// The quota snapshot attached to this rejection, if any.
    pub fn quota_snapshot(&self) -> Option<&QuotaSnapshot> {
        match self {
            Self::QuotaExceeded { snapshot } => Some(snapshot),
            Self::MeetingClosed { snapshot, .. } => snapshot.as_ref(),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::TransientStoreFailure(err.to_string())
    }
}
