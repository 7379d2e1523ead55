//! Meeting state machine — phases, transitions, and session tracking.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rating::ConsensusScore;
use crate::store::types::{AgentId, PostId};

/// Phase of a meeting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeetingPhase {
    /// Session created, no comment accepted yet.
    Open,
    /// At least one comment accepted, debate in progress.
    Active,
    /// Moderator verdict is in, waiting for participants or the timeout.
    VerdictPending,
    /// Verdict finalized, consensus computed. Terminal.
    Closed,
}

impl MeetingPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether comments may still be accepted in this phase.
    pub fn accepts_comments(self) -> bool {
        !self.is_terminal()
    }

    /// Whether peer ratings may still be submitted. Ratings freeze as soon
    /// as the moderator's verdict is in, so the pending window cannot be
    /// used to react to the verdict.
    pub fn accepts_ratings(self) -> bool {
        matches!(self, Self::Open | Self::Active)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [MeetingPhase] {
        match self {
            Self::Open => &[Self::Active, Self::Closed],
            Self::Active => &[Self::VerdictPending, Self::Closed],
            Self::VerdictPending => &[Self::Closed],
            Self::Closed => &[],
        }
    }
}

impl std::fmt::Display for MeetingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Active => write!(f, "active"),
            Self::VerdictPending => write!(f, "verdict_pending"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session reached Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Every active participant settled after the moderator's verdict.
    RosterComplete,
    /// The verdict-pending timeout fired.
    Timeout,
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingTransition {
    /// Previous phase.
    pub from: MeetingPhase,
    /// New phase.
    pub to: MeetingPhase,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Reason for the transition.
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: MeetingPhase,
    pub to: MeetingPhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for TransitionError {}

/// A meeting session tracking phase, roster, and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSession {
    /// The meeting post this session governs.
    pub post_id: PostId,
    /// The distinguished roster agent whose verdict closes the meeting.
    pub moderator: AgentId,
    /// Participant → quota assigned at open. Immutable for the session.
    pub roster: BTreeMap<AgentId, u32>,
    /// Current phase.
    pub phase: MeetingPhase,
    /// Transition history.
    pub transitions: Vec<MeetingTransition>,
    /// When the session was created.
    pub opened_at: DateTime<Utc>,
    /// When the first comment landed. The verdict timeout counts from here.
    pub active_since: Option<DateTime<Utc>>,
    /// When the session closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Why the session closed.
    pub close_reason: Option<CloseReason>,
    /// Final consensus per roster member, written once at close.
    pub final_scores: Option<BTreeMap<AgentId, ConsensusScore>>,
}

impl MeetingSession {
    pub fn new(post_id: &str, moderator: &str, roster: BTreeMap<AgentId, u32>) -> Self {
        Self {
            post_id: post_id.to_string(),
            moderator: moderator.to_string(),
            roster,
            phase: MeetingPhase::Open,
            transitions: Vec::new(),
            opened_at: Utc::now(),
            active_since: None,
            closed_at: None,
            close_reason: None,
            final_scores: None,
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: MeetingPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(MeetingTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        match to {
            MeetingPhase::Active => self.active_since = Some(Utc::now()),
            MeetingPhase::Closed => self.closed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    pub fn is_roster_member(&self, agent: &str) -> bool {
        self.roster.contains_key(agent)
    }

    pub fn is_moderator(&self, agent: &str) -> bool {
        self.moderator == agent
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] post={} | {} participants | {} transitions",
            self.phase,
            self.post_id,
            self.roster.len(),
            self.transitions.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(pairs: &[(&str, u32)]) -> BTreeMap<AgentId, u32> {
        pairs.iter().map(|(a, q)| (a.to_string(), *q)).collect()
    }

    #[test]
    fn test_new_session() {
        let session = MeetingSession::new("m-1", "mod-1", roster(&[("a", 4), ("b", 5)]));
        assert_eq!(session.phase, MeetingPhase::Open);
        assert!(session.active_since.is_none());
        assert!(!session.is_complete());
        assert!(session.is_roster_member("a"));
        assert!(!session.is_roster_member("c"));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = MeetingSession::new("m-1", "mod-1", roster(&[("a", 4)]));
        session
            .transition(MeetingPhase::Active, "first comment")
            .unwrap();
        assert!(session.active_since.is_some());
        session
            .transition(MeetingPhase::VerdictPending, "moderator verdict")
            .unwrap();
        session
            .transition(MeetingPhase::Closed, "roster complete")
            .unwrap();
        assert!(session.is_complete());
        assert!(session.closed_at.is_some());
        assert_eq!(session.transitions.len(), 3);
    }

    #[test]
    fn test_active_can_close_directly() {
        // All participants settled when the verdict landed.
        let mut session = MeetingSession::new("m-1", "mod-1", roster(&[("a", 4)]));
        session.transition(MeetingPhase::Active, "comment").unwrap();
        session
            .transition(MeetingPhase::Closed, "verdict, roster settled")
            .unwrap();
        assert!(session.is_complete());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut session = MeetingSession::new("m-1", "mod-1", roster(&[("a", 4)]));
        session.transition(MeetingPhase::Active, "comment").unwrap();
        session.transition(MeetingPhase::Closed, "done").unwrap();
        let err = session
            .transition(MeetingPhase::Active, "reopen")
            .unwrap_err();
        assert_eq!(err.from, MeetingPhase::Closed);
    }

    #[test]
    fn test_open_cannot_enter_verdict_pending() {
        let mut session = MeetingSession::new("m-1", "mod-1", roster(&[("a", 4)]));
        let err = session
            .transition(MeetingPhase::VerdictPending, "skip")
            .unwrap_err();
        assert_eq!(err.from, MeetingPhase::Open);
        assert_eq!(err.to, MeetingPhase::VerdictPending);
    }

    #[test]
    fn test_rating_and_comment_windows() {
        assert!(MeetingPhase::Open.accepts_ratings());
        assert!(MeetingPhase::Active.accepts_ratings());
        assert!(!MeetingPhase::VerdictPending.accepts_ratings());
        assert!(!MeetingPhase::Closed.accepts_ratings());

        assert!(MeetingPhase::VerdictPending.accepts_comments());
        assert!(!MeetingPhase::Closed.accepts_comments());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(MeetingPhase::Open.to_string(), "open");
        assert_eq!(MeetingPhase::Active.to_string(), "active");
        assert_eq!(MeetingPhase::VerdictPending.to_string(), "verdict_pending");
        assert_eq!(MeetingPhase::Closed.to_string(), "closed");
    }
}
