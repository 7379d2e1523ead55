//! Session-level meeting logic: roster setup, verdict handling, close.
//!
//! The orchestrator is deliberately lock-free; the engine facade serializes
//! calls per meeting post, so every method here runs with exclusive access
//! to the session it was handed.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::MeetingConfig;
use crate::error::{EngineError, EngineResult};
use crate::quota::QuotaLedger;
use crate::rating::{ConsensusScore, RatingAggregator};
use crate::scoring::ScoringEngine;
use crate::store::types::AgentId;
use crate::store::SharedStore;

use super::state::{CloseReason, MeetingPhase, MeetingSession};

/// What a moderator verdict resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum VerdictDisposition {
    /// Every active participant was already settled; the session closed.
    Closed,
    /// Some participant still has quota; close deferred to settlement or
    /// the deadline.
    Pending { deadline: DateTime<Utc> },
}

pub struct MeetingOrchestrator {
    store: SharedStore,
    ledger: QuotaLedger,
    aggregator: RatingAggregator,
    scoring: ScoringEngine,
    cfg: MeetingConfig,
}

impl MeetingOrchestrator {
    pub fn new(
        store: SharedStore,
        ledger: QuotaLedger,
        aggregator: RatingAggregator,
        scoring: ScoringEngine,
        cfg: MeetingConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            aggregator,
            scoring,
            cfg,
        }
    }

    /// Quota earned by a participant's most recent meeting performance.
    /// Linear in the prior consensus score, clamped to the configured band;
    /// no prior meeting gets the default.
    pub fn quota_for(&self, prior_score: Option<f64>) -> u32 {
        let Some(score) = prior_score else {
            return self.cfg.default_quota;
        };
        let scaled = self.cfg.quota_floor as f64 + (score - 4.0) / 2.0;
        let rounded = scaled.round();
        let floor = f64::from(self.cfg.quota_floor);
        let ceiling = f64::from(self.cfg.quota_ceiling);
        rounded.clamp(floor, ceiling) as u32
    }

    /// Create the session for a meeting post. Each roster member's quota is
    /// derived from their prior meeting once, here, and pinned on the ledger
    /// entry for the rest of the session.
    pub fn open_meeting(
        &self,
        post_id: &str,
        moderator: &str,
        participants: &[AgentId],
    ) -> EngineResult<MeetingSession> {
        let mut roster = BTreeMap::new();
        let mut members: Vec<&str> = vec![moderator];
        members.extend(participants.iter().map(String::as_str));

        for member in members {
            if roster.contains_key(member) {
                continue;
            }
            let agent = self
                .store
                .get_agent(member)?
                .ok_or_else(|| EngineError::UnknownAgent(member.to_string()))?;
            if !agent.active {
                return Err(EngineError::InactiveAgent(member.to_string()));
            }
            let quota = self.quota_for(agent.latest_meeting_score());
            self.ledger.initialize(member, post_id, quota)?;
            roster.insert(member.to_string(), quota);
        }

        let session = MeetingSession::new(post_id, moderator, roster);
        self.store.put_session(&session)?;
        info!(
            post_id,
            moderator,
            participants = session.roster.len(),
            "meeting opened"
        );
        Ok(session)
    }

    /// Add a late joiner to the roster with the default quota. Open
    /// participation, same as any other member from here on.
    pub fn enroll(&self, session: &mut MeetingSession, agent: &str) -> EngineResult<u32> {
        let quota = self.cfg.default_quota;
        self.ledger.initialize(agent, &session.post_id, quota)?;
        session.roster.insert(agent.to_string(), quota);
        self.store.put_session(session)?;
        debug!(post_id = %session.post_id, agent, quota, "participant enrolled");
        Ok(quota)
    }

    /// Record that a comment was accepted; the first one activates the
    /// session.
    pub fn note_activity(&self, session: &mut MeetingSession) -> EngineResult<()> {
        if session.phase == MeetingPhase::Open {
            session
                .transition(MeetingPhase::Active, "first comment accepted")
                .map_err(|_| self.closed_err(session))?;
            self.store.put_session(session)?;
        }
        Ok(())
    }

    /// The moderator's verdict is in (quota already marked). Close now if
    /// the roster is settled or the deadline has passed, otherwise enter
    /// VerdictPending until one of those holds.
    pub fn handle_moderator_verdict(
        &self,
        session: &mut MeetingSession,
    ) -> EngineResult<VerdictDisposition> {
        if session.phase.is_terminal() {
            return Err(self.closed_err(session));
        }
        if self.roster_settled(session)? {
            self.close(session, CloseReason::RosterComplete)?;
            return Ok(VerdictDisposition::Closed);
        }

        let deadline = self.deadline(session);
        if Utc::now() >= deadline {
            self.close(session, CloseReason::Timeout)?;
            return Ok(VerdictDisposition::Closed);
        }

        session
            .transition(MeetingPhase::VerdictPending, "moderator verdict delivered")
            .map_err(|_| self.closed_err(session))?;
        self.store.put_session(session)?;
        Ok(VerdictDisposition::Pending { deadline })
    }

    /// Deferred-close check after a participant action in VerdictPending.
    pub fn try_resolve_pending(&self, session: &mut MeetingSession) -> EngineResult<bool> {
        if session.phase != MeetingPhase::VerdictPending {
            return Ok(false);
        }
        if self.roster_settled(session)? {
            self.close(session, CloseReason::RosterComplete)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// When the verdict-pending wait expires, counted from first activity.
    pub fn deadline(&self, session: &MeetingSession) -> DateTime<Utc> {
        let base = session.active_since.unwrap_or(session.opened_at);
        base + Duration::seconds(self.cfg.verdict_timeout_secs as i64)
    }

    /// A participant blocks closure only while partway through their quota
    /// without a verdict of their own. Silent members never block.
    fn roster_settled(&self, session: &MeetingSession) -> EngineResult<bool> {
        for agent in session.roster.keys() {
            if let Some(entry) = self.store.get_quota(agent, &session.post_id)? {
                let blocking = entry.comments_made > 0
                    && entry.comments_made < entry.max_comments
                    && !entry.verdict_delivered;
                if blocking {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Finalize: freeze ratings, compute consensus for roster members who
    /// spoke, fold results into agent histories, persist the session.
    pub fn close(
        &self,
        session: &mut MeetingSession,
        reason: CloseReason,
    ) -> EngineResult<BTreeMap<AgentId, ConsensusScore>> {
        let reason_str = match reason {
            CloseReason::RosterComplete => "roster complete",
            CloseReason::Timeout => "verdict timeout elapsed",
        };
        session
            .transition(MeetingPhase::Closed, reason_str)
            .map_err(|_| self.closed_err(session))?;
        session.close_reason = Some(reason);

        // Ratings are frozen now; this read is the authoritative one.
        let consensus = self.aggregator.compute_consensus(&session.post_id)?;

        let mut final_scores = BTreeMap::new();
        for agent in session.roster.keys() {
            let commented = self
                .store
                .get_quota(agent, &session.post_id)?
                .is_some_and(|q| q.comments_made > 0);
            if !commented {
                continue;
            }
            let score = consensus
                .get(agent)
                .cloned()
                .unwrap_or(ConsensusScore::InsufficientData { ratings_seen: 0 });
            self.scoring
                .record_meeting_result(agent, &session.post_id, &score)?;
            final_scores.insert(agent.clone(), score);
        }

        session.final_scores = Some(final_scores.clone());
        self.store.put_session(session)?;
        info!(
            post_id = %session.post_id,
            reason = reason_str,
            scored = final_scores.len(),
            "meeting closed"
        );
        if matches!(reason, CloseReason::Timeout) {
            warn!(post_id = %session.post_id, "meeting closed by timeout with unsettled roster");
        }
        Ok(final_scores)
    }

    fn closed_err(&self, session: &MeetingSession) -> EngineError {
        EngineError::MeetingClosed {
            post_id: session.post_id.clone(),
            snapshot: None,
        }
    }
}
