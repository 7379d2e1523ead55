//! Award bookkeeping, meeting history, and the leaderboard.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::rating::ConsensusScore;
use crate::store::types::{AgentId, MeetingScore};
use crate::store::SharedStore;

use super::signals::{detect_signals, SignalContext};
use super::{level_for_points, ActionKind, AwardRecord, Level};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub total_points: u32,
    pub award_count: usize,
    pub level: Level,
}

/// Applies the point table and keeps derived views consistent with the
/// award log. The log is the source of truth: totals and the leaderboard
/// are always recomputable from it.
#[derive(Clone)]
pub struct ScoringEngine {
    store: SharedStore,
    history_window: usize,
    excellence_threshold: f64,
}

impl ScoringEngine {
    pub fn new(store: SharedStore, history_window: usize, excellence_threshold: f64) -> Self {
        Self {
            store,
            history_window,
            excellence_threshold,
        }
    }

    /// Grant one award unless the `(agent, kind, source_event)` triple was
    /// already granted. Returns the record when newly granted.
    pub fn grant(
        &self,
        agent: &str,
        kind: ActionKind,
        source_event: &str,
        detail: &str,
    ) -> EngineResult<Option<AwardRecord>> {
        let record = AwardRecord::new(agent, kind, source_event, kind.points(), detail);
        if !self.store.insert_award(&record)? {
            debug!(agent, kind = kind.as_str(), source_event, "award replayed, skipping");
            return Ok(None);
        }
        info!(
            agent,
            kind = kind.as_str(),
            points = record.points,
            "award granted"
        );
        Ok(Some(record))
    }

    /// Run the detectors over content and grant whatever fires. The event id
    /// keys the dedup, so re-delivery of the same content awards nothing.
    pub fn score_content(
        &self,
        agent: &str,
        event_id: &str,
        text: &str,
        ctx: SignalContext,
    ) -> EngineResult<Vec<AwardRecord>> {
        let mut granted = Vec::new();
        for (kind, detail) in detect_signals(text, ctx) {
            if let Some(record) = self.grant(agent, kind, event_id, detail)? {
                granted.push(record);
            }
        }
        Ok(granted)
    }

    pub fn total_points(&self, agent: &str) -> EngineResult<u32> {
        let awards = self.store.awards_for_agent(agent)?;
        Ok(awards.iter().map(|a| a.points).sum())
    }

    /// Points and counts per action kind.
    pub fn breakdown(&self, agent: &str) -> EngineResult<HashMap<ActionKind, (u32, usize)>> {
        let mut out: HashMap<ActionKind, (u32, usize)> = HashMap::new();
        for award in self.store.awards_for_agent(agent)? {
            let entry = out.entry(award.kind).or_default();
            entry.0 += award.points;
            entry.1 += 1;
        }
        Ok(out)
    }

    /// Leaderboard sorted by points descending, agent id ascending on ties,
    /// recomputed from the award log. Agents with no awards are omitted.
    pub fn leaderboard(&self, limit: usize) -> EngineResult<Vec<LeaderboardEntry>> {
        let mut totals: HashMap<AgentId, (u32, usize)> = HashMap::new();
        for award in self.store.all_awards()? {
            let entry = totals.entry(award.agent_id.clone()).or_default();
            entry.0 += award.points;
            entry.1 += 1;
        }

        let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(totals.len());
        for (agent_id, (total_points, award_count)) in totals {
            let agent = self
                .store
                .get_agent(&agent_id)?
                .ok_or_else(|| EngineError::UnknownAgent(agent_id.clone()))?;
            entries.push(LeaderboardEntry {
                agent_id,
                agent_name: agent.name,
                total_points,
                award_count,
                level: level_for_points(total_points),
            });
        }
        entries.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Fold one closed meeting into an agent's history. Scored consensus is
    /// appended (window-truncated, newest last) and an excellence award is
    /// granted at or above the threshold; insufficient data leaves the
    /// history untouched.
    pub fn record_meeting_result(
        &self,
        agent: &str,
        meeting_id: &str,
        consensus: &ConsensusScore,
    ) -> EngineResult<()> {
        let (mean, counted) = match consensus {
            ConsensusScore::Scored {
                mean,
                ratings_counted,
                ..
            } => (*mean, *ratings_counted),
            ConsensusScore::InsufficientData { ratings_seen } => {
                debug!(
                    agent,
                    meeting_id, ratings_seen, "insufficient ratings, history unchanged"
                );
                return Ok(());
            }
        };

        let entry = MeetingScore {
            meeting_id: meeting_id.to_string(),
            score: mean,
            ratings_counted: counted,
            recorded_at: Utc::now(),
        };
        let window = self.history_window;
        let updated = self.store.update_agent(agent, &mut |a| {
            a.history.push(entry.clone());
            if a.history.len() > window {
                let excess = a.history.len() - window;
                a.history.drain(..excess);
            }
        })?;
        if !updated {
            return Err(EngineError::UnknownAgent(agent.to_string()));
        }

        if mean >= self.excellence_threshold {
            self.grant(
                agent,
                ActionKind::MeetingExcellence,
                meeting_id,
                "meeting consensus at or above excellence bar",
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Agent;
    use crate::store::{ForumStore, MemoryStore};

    fn engine_with_agents(ids: &[&str]) -> (ScoringEngine, SharedStore) {
        let store = MemoryStore::shared();
        for id in ids {
            store.put_agent(&Agent::new(*id, *id)).unwrap();
        }
        let shared: SharedStore = store;
        (ScoringEngine::new(shared.clone(), 10, 8.0), shared)
    }

    #[test]
    fn test_grant_is_idempotent_per_source_event() {
        let (engine, _) = engine_with_agents(&["bot-1"]);
        let first = engine
            .grant("bot-1", ActionKind::DataInsight, "c-1", "data")
            .unwrap();
        assert!(first.is_some());
        let replay = engine
            .grant("bot-1", ActionKind::DataInsight, "c-1", "data")
            .unwrap();
        assert!(replay.is_none());
        assert_eq!(engine.total_points("bot-1").unwrap(), 2);

        // Different kind on the same event is a distinct award.
        engine
            .grant("bot-1", ActionKind::Contrarian, "c-1", "contrarian")
            .unwrap();
        assert_eq!(engine.total_points("bot-1").unwrap(), 4);
    }

    #[test]
    fn test_leaderboard_order_and_ties() {
        let (engine, _) = engine_with_agents(&["alpha", "beta", "gamma"]);
        engine
            .grant("beta", ActionKind::BreakingNews, "p-1", "news")
            .unwrap();
        engine
            .grant("alpha", ActionKind::VerdictPrediction, "c-1", "verdict")
            .unwrap();
        engine
            .grant("gamma", ActionKind::VerdictDelivered, "c-2", "verdict")
            .unwrap();

        let board = engine.leaderboard(10).unwrap();
        let ids: Vec<&str> = board.iter().map(|e| e.agent_id.as_str()).collect();
        // alpha and beta tie at 3 points; alpha wins the tie by id.
        assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
        assert_eq!(board[0].level, Level::Newcomer);
    }

    #[test]
    fn test_meeting_history_window_truncates_oldest() {
        let store = MemoryStore::shared();
        store.put_agent(&Agent::new("bot-1", "bot-1")).unwrap();
        let shared: SharedStore = store.clone();
        let engine = ScoringEngine::new(shared, 3, 8.0);

        for i in 0..5 {
            let consensus = ConsensusScore::Scored {
                mean: f64::from(i),
                ratings_counted: 2,
                discarded: 0,
            };
            engine
                .record_meeting_result("bot-1", &format!("m-{i}"), &consensus)
                .unwrap();
        }
        let agent = store.get_agent("bot-1").unwrap().unwrap();
        let meetings: Vec<&str> = agent.history.iter().map(|h| h.meeting_id.as_str()).collect();
        assert_eq!(meetings, vec!["m-2", "m-3", "m-4"]);
        assert_eq!(agent.latest_meeting_score(), Some(4.0));
    }

    #[test]
    fn test_excellence_award_at_threshold() {
        let (engine, store) = engine_with_agents(&["bot-1", "bot-2"]);
        engine
            .record_meeting_result(
                "bot-1",
                "m-1",
                &ConsensusScore::Scored {
                    mean: 8.0,
                    ratings_counted: 3,
                    discarded: 0,
                },
            )
            .unwrap();
        engine
            .record_meeting_result(
                "bot-2",
                "m-1",
                &ConsensusScore::Scored {
                    mean: 7.9,
                    ratings_counted: 3,
                    discarded: 0,
                },
            )
            .unwrap();
        assert_eq!(engine.total_points("bot-1").unwrap(), 5);
        assert_eq!(engine.total_points("bot-2").unwrap(), 0);
        // History recorded for both regardless of the award.
        assert_eq!(store.get_agent("bot-2").unwrap().unwrap().history.len(), 1);
    }

    #[test]
    fn test_insufficient_data_leaves_history_alone() {
        let (engine, store) = engine_with_agents(&["bot-1"]);
        engine
            .record_meeting_result(
                "bot-1",
                "m-1",
                &ConsensusScore::InsufficientData { ratings_seen: 1 },
            )
            .unwrap();
        assert!(store.get_agent("bot-1").unwrap().unwrap().history.is_empty());
    }
}
