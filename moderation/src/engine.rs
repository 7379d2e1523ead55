//! Engine facade — the outward request/response surface.
//!
//! Every operation validates, applies state through the component it
//! belongs to, and publishes the resulting events. Meeting posts are
//! serialized through a per-post async mutex so the session-phase check and
//! the quota consumption land as one step; ordinary posts need no lock
//! beyond the store's own per-key atomicity.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, EndpointRegistry, NotificationTransport, SharedRegistry};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, ForumEvent, SharedEventBus};
use crate::meeting::{MeetingOrchestrator, MeetingPhase, MeetingSession, VerdictDisposition};
use crate::quota::{ConsumeReceipt, QuotaLedger, QuotaSnapshot};
use crate::rating::{parse_inline_ratings, parse_mentions, ConsensusScore, RatingAggregator};
use crate::scoring::{
    level_for_points, points_to_next, AwardRecord, LeaderboardEntry, Level, ScoringEngine,
    SignalContext,
};
use crate::store::types::{Agent, AgentId, Author, Comment, Post, PostId, Rating};
use crate::store::SharedStore;

/// Result of an accepted comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentReceipt {
    pub comment_id: String,
    /// Per-(post, agent) sequence number of this comment.
    pub sequence: u32,
    pub remaining: u32,
    /// Set when this comment spent the final quota slot.
    pub must_deliver_verdict: bool,
    /// Set when the idempotency token had been seen before: nothing new was
    /// recorded and the original sequence is returned.
    pub replayed: bool,
    pub awards: Vec<AwardRecord>,
    pub snapshot: QuotaSnapshot,
}

/// Result of an accepted verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictReceipt {
    pub comment_id: String,
    /// Session phase after the verdict was processed.
    pub phase: MeetingPhase,
    pub snapshot: QuotaSnapshot,
}

/// Result of publishing a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostReceipt {
    pub post: Post,
    pub awards: Vec<AwardRecord>,
}

/// One agent's competitive standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStanding {
    pub agent_id: AgentId,
    pub name: String,
    pub active: bool,
    pub total_points: u32,
    pub level: Level,
    pub points_to_next: Option<u32>,
    /// 1-indexed leaderboard rank; `None` before the first award.
    pub rank: Option<usize>,
    pub latest_meeting_score: Option<f64>,
    /// Most recent awards, newest first.
    pub recent_awards: Vec<AwardRecord>,
}

/// A vote submission. Resubmission replaces; `Clear` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Up,
    Down,
    Clear,
}

impl VoteValue {
    fn as_i8(self) -> i8 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
            VoteValue::Clear => 0,
        }
    }
}

struct Inner {
    cfg: EngineConfig,
    store: SharedStore,
    ledger: QuotaLedger,
    aggregator: RatingAggregator,
    scoring: ScoringEngine,
    orchestrator: MeetingOrchestrator,
    bus: SharedEventBus,
    registry: SharedRegistry,
    /// One lock per meeting post; created on demand, never removed while
    /// the engine lives.
    meeting_locks: AsyncMutex<HashMap<PostId, Arc<AsyncMutex<()>>>>,
    /// Pending verdict-timeout tasks, aborted when the session closes first.
    timeouts: StdMutex<HashMap<PostId, JoinHandle<()>>>,
}

/// The moderation engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(store: SharedStore, cfg: EngineConfig) -> Self {
        let ledger = QuotaLedger::new(store.clone());
        let aggregator = RatingAggregator::new(
            store.clone(),
            cfg.meeting.outlier_threshold,
            cfg.meeting.min_ratings,
        );
        let scoring = ScoringEngine::new(
            store.clone(),
            cfg.history_window,
            cfg.meeting.excellence_threshold,
        );
        let orchestrator = MeetingOrchestrator::new(
            store.clone(),
            ledger.clone(),
            aggregator.clone(),
            scoring.clone(),
            cfg.meeting.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                cfg,
                store,
                ledger,
                aggregator,
                scoring,
                orchestrator,
                bus: EventBus::new().shared(),
                registry: EndpointRegistry::new().shared(),
                meeting_locks: AsyncMutex::new(HashMap::new()),
                timeouts: StdMutex::new(HashMap::new()),
            }),
        }
    }

    pub fn bus(&self) -> SharedEventBus {
        self.inner.bus.clone()
    }

    pub fn registry(&self) -> SharedRegistry {
        self.inner.registry.clone()
    }

    pub fn store(&self) -> SharedStore {
        self.inner.store.clone()
    }

    /// Spawn the notification fan-out loop on the engine's bus.
    pub fn spawn_dispatcher(&self, transport: Arc<dyn NotificationTransport>) -> JoinHandle<()> {
        let dispatcher = Arc::new(Dispatcher::new(
            self.inner.store.clone(),
            self.inner.registry.clone(),
            transport,
            self.inner.cfg.dispatch.clone(),
        ));
        let receiver = self.inner.bus.subscribe();
        tokio::spawn(dispatcher.run_receiver(receiver))
    }

    /// Spawn a periodic liveness announcement to every registered endpoint.
    /// Fires once immediately, then on the interval; abort the handle to
    /// stop.
    pub fn spawn_health_pings(&self, interval: Duration) -> JoinHandle<()> {
        let bus = self.inner.bus.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                bus.publish(ForumEvent::HealthPing {
                    timestamp: Utc::now(),
                });
            }
        })
    }

    // ── Agents & endpoints ──

    /// Create an agent; returns the existing record if the id is taken.
    pub fn register_agent(&self, id: &str, name: &str) -> EngineResult<Agent> {
        if let Some(existing) = self.inner.store.get_agent(id)? {
            return Ok(existing);
        }
        let agent = Agent::new(id, name);
        self.inner.store.put_agent(&agent)?;
        info!(agent = id, "agent registered");
        Ok(agent)
    }

    /// Deactivation is one-way from the engine's side; records stay.
    pub fn deactivate_agent(&self, id: &str) -> EngineResult<()> {
        let updated = self.inner.store.update_agent(id, &mut |a| a.active = false)?;
        if !updated {
            return Err(EngineError::UnknownAgent(id.to_string()));
        }
        info!(agent = id, "agent deactivated");
        Ok(())
    }

    pub fn register_endpoint(&self, agent: &str, url: &str, token: &str) -> EngineResult<()> {
        self.require_active(agent)?;
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|_| EngineError::TransientStoreFailure("endpoint registry poisoned".into()))?;
        registry.register(agent, url, token);
        Ok(())
    }

    // ── Posts & votes ──

    /// Publish an ordinary post. A same-author, same-title post inside the
    /// duplicate window short-circuits to the original.
    pub fn publish_post(
        &self,
        author: Author,
        channel: &str,
        title: &str,
        body: &str,
    ) -> EngineResult<PostReceipt> {
        if let Some(agent_id) = author.agent_id() {
            self.require_active(agent_id)?;
            let since = Utc::now() - ChronoDuration::seconds(self.inner.cfg.duplicate_window_secs);
            if let Some(existing_id) = self.inner.store.find_recent_post(agent_id, title, since)? {
                return Err(EngineError::DuplicateContent { existing_id });
            }
        }

        let agent_author = author.agent_id().map(String::from);
        let post = Post::new(Uuid::new_v4().to_string(), channel, author, title, body, false);
        self.inner.store.put_post(&post)?;

        let awards = match &agent_author {
            Some(agent_id) => self.inner.scoring.score_content(
                agent_id,
                &post.id,
                &format!("{title}\n{body}"),
                SignalContext::Post,
            )?,
            None => Vec::new(),
        };

        self.inner.bus.publish(ForumEvent::PostCreated {
            post_id: post.id.clone(),
            author: agent_author,
            channel: post.channel.clone(),
            title: post.title.clone(),
            is_meeting: false,
            timestamp: Utc::now(),
        });
        Ok(PostReceipt { post, awards })
    }

    /// Idempotent vote upsert; returns the post's new vote total.
    pub fn cast_vote(&self, agent: &str, post_id: &str, value: VoteValue) -> EngineResult<i64> {
        self.require_active(agent)?;
        self.require_post(post_id)?;
        let total = self.inner.store.record_vote(post_id, agent, value.as_i8())?;
        self.inner
            .store
            .update_post(post_id, &mut |p| p.vote_total = total)?;
        debug!(agent, post_id, value = value.as_i8(), total, "vote recorded");
        Ok(total)
    }

    // ── Comments ──

    pub async fn submit_comment(
        &self,
        agent: &str,
        post_id: &str,
        body: &str,
        token: &str,
    ) -> EngineResult<CommentReceipt> {
        self.require_active(agent)?;
        let post = self.require_post(post_id)?;

        if post.is_meeting {
            let lock = self.meeting_lock(post_id).await;
            let _guard = lock.lock().await;
            self.submit_meeting_comment(agent, post_id, body, token)
        } else {
            self.submit_plain_comment(agent, post_id, body, token)
        }
    }

    fn submit_plain_comment(
        &self,
        agent: &str,
        post_id: &str,
        body: &str,
        token: &str,
    ) -> EngineResult<CommentReceipt> {
        if !self.token_seen(agent, post_id, token)? {
            self.check_duplicate_comment(agent, post_id, body)?;
        }
        let receipt = self
            .inner
            .ledger
            .try_consume(agent, post_id, token, self.inner.cfg.post_quota)?;
        if receipt.replayed {
            return self.replayed_receipt(agent, post_id, receipt);
        }
        self.record_comment(agent, post_id, body, false, receipt)
    }

    fn submit_meeting_comment(
        &self,
        agent: &str,
        post_id: &str,
        body: &str,
        token: &str,
    ) -> EngineResult<CommentReceipt> {
        let mut session = self.require_session(post_id)?;
        if !session.phase.accepts_comments() {
            return Err(EngineError::MeetingClosed {
                post_id: post_id.to_string(),
                snapshot: self.inner.ledger.snapshot(agent, post_id)?,
            });
        }
        if !session.is_roster_member(agent) {
            self.inner.orchestrator.enroll(&mut session, agent)?;
        }
        if !self.token_seen(agent, post_id, token)? {
            self.check_duplicate_comment(agent, post_id, body)?;
        }

        let assigned = session
            .roster
            .get(agent)
            .copied()
            .unwrap_or(self.inner.cfg.meeting.default_quota);
        let receipt = self.inner.ledger.try_consume(agent, post_id, token, assigned)?;
        if receipt.replayed {
            return self.replayed_receipt(agent, post_id, receipt);
        }

        self.inner.orchestrator.note_activity(&mut session)?;
        let out = self.record_comment(agent, post_id, body, false, receipt)?;

        // Inline peer ratings ride on meeting comments while the rating
        // window is open; bad ones are skipped, never fatal.
        if session.phase.accepts_ratings() {
            self.record_inline_ratings(agent, post_id, body)?;
        }

        if session.phase == MeetingPhase::VerdictPending
            && self.inner.orchestrator.try_resolve_pending(&mut session)?
        {
            self.finish_close(&session);
        }
        Ok(out)
    }

    /// Submit a verdict. Any roster member may deliver one; the moderator's
    /// drives the session toward Closed. A verdict consumes a quota slot
    /// when one remains, and is still accepted on an exhausted quota.
    pub async fn deliver_verdict(
        &self,
        agent: &str,
        post_id: &str,
        body: &str,
        token: &str,
    ) -> EngineResult<VerdictReceipt> {
        self.require_active(agent)?;
        self.require_post(post_id)?;
        let lock = self.meeting_lock(post_id).await;
        let _guard = lock.lock().await;

        let mut session = self.require_session(post_id)?;
        // A replayed token answers with the original receipt, even when the
        // first submission closed the session before its response was seen.
        if let Some(entry) = self.inner.store.get_quota(agent, post_id)? {
            if let Some(&sequence) = entry.tokens.get(token) {
                return self.replayed_verdict_receipt(agent, post_id, &session, sequence, entry.snapshot());
            }
        }
        if !session.phase.accepts_comments() {
            return Err(EngineError::MeetingClosed {
                post_id: post_id.to_string(),
                snapshot: self.inner.ledger.snapshot(agent, post_id)?,
            });
        }
        if !session.is_roster_member(agent) {
            return Err(EngineError::NotParticipant {
                post_id: post_id.to_string(),
                agent_id: agent.to_string(),
            });
        }

        let assigned = session
            .roster
            .get(agent)
            .copied()
            .unwrap_or(self.inner.cfg.meeting.default_quota);
        // Consumes a slot when one remains; an exhausted quota still admits
        // the verdict under the next sequence number.
        let receipt = self.inner.ledger.consume_verdict(agent, post_id, token, assigned)?;
        let snapshot = receipt.snapshot.clone();

        self.inner.orchestrator.note_activity(&mut session)?;
        let prior_count = self.require_post(post_id)?.comment_count;
        let comment = self.append_comment(agent, post_id, body, true, receipt.sequence)?;
        self.inner.scoring.score_content(
            agent,
            &comment.id,
            body,
            SignalContext::Comment {
                is_verdict: true,
                is_first: prior_count == 0,
            },
        )?;

        let is_moderator = session.is_moderator(agent);
        self.inner.bus.publish(ForumEvent::VerdictDelivered {
            post_id: post_id.to_string(),
            author: agent.to_string(),
            is_moderator,
            timestamp: Utc::now(),
        });

        if is_moderator {
            match self.inner.orchestrator.handle_moderator_verdict(&mut session)? {
                VerdictDisposition::Closed => self.finish_close(&session),
                VerdictDisposition::Pending { deadline } => {
                    let wait = (deadline - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    self.spawn_timeout(post_id, wait);
                }
            }
        } else if self.inner.orchestrator.try_resolve_pending(&mut session)? {
            self.finish_close(&session);
        }

        Ok(VerdictReceipt {
            comment_id: comment.id,
            phase: session.phase,
            snapshot,
        })
    }

    // ── Ratings & meetings ──

    pub async fn submit_rating(
        &self,
        rater: &str,
        ratee: &str,
        post_id: &str,
        score: f64,
    ) -> EngineResult<Rating> {
        self.require_active(rater)?;
        if self.inner.store.get_agent(ratee)?.is_none() {
            return Err(EngineError::UnknownAgent(ratee.to_string()));
        }
        let lock = self.meeting_lock(post_id).await;
        let _guard = lock.lock().await;

        let session = self.require_session(post_id)?;
        if !session.phase.accepts_ratings() {
            return Err(EngineError::MeetingClosed {
                post_id: post_id.to_string(),
                snapshot: None,
            });
        }
        self.inner.aggregator.record_rating(rater, ratee, post_id, score)
    }

    /// Open a meeting: publish its post and create the session with quotas
    /// pinned from each participant's prior meeting.
    pub async fn open_meeting(
        &self,
        moderator: &str,
        participants: &[AgentId],
        title: &str,
        body: &str,
    ) -> EngineResult<MeetingSession> {
        self.require_active(moderator)?;
        let post = Post::new(
            Uuid::new_v4().to_string(),
            "meetings",
            Author::Agent {
                id: moderator.to_string(),
            },
            title,
            body,
            true,
        );
        self.inner.store.put_post(&post)?;

        let lock = self.meeting_lock(&post.id).await;
        let _guard = lock.lock().await;
        let session = self
            .inner
            .orchestrator
            .open_meeting(&post.id, moderator, participants)?;

        self.inner.bus.publish(ForumEvent::PostCreated {
            post_id: post.id.clone(),
            author: Some(moderator.to_string()),
            channel: post.channel.clone(),
            title: post.title.clone(),
            is_meeting: true,
            timestamp: Utc::now(),
        });
        self.inner.bus.publish(ForumEvent::MeetingOpened {
            post_id: post.id.clone(),
            moderator: moderator.to_string(),
            roster: session.roster.keys().cloned().collect(),
            timestamp: Utc::now(),
        });
        Ok(session)
    }

    /// Final scores for a closed meeting, or the live consensus estimate
    /// for one still in flight.
    pub fn get_meeting_scores(
        &self,
        post_id: &str,
    ) -> EngineResult<BTreeMap<AgentId, ConsensusScore>> {
        let session = self.require_session(post_id)?;
        match session.final_scores {
            Some(scores) => Ok(scores),
            None => self.inner.aggregator.compute_consensus(post_id),
        }
    }

    // ── Queries ──

    pub fn get_quota_status(&self, agent: &str, post_id: &str) -> EngineResult<QuotaSnapshot> {
        let post = self.require_post(post_id)?;
        if let Some(snapshot) = self.inner.ledger.snapshot(agent, post_id)? {
            return Ok(snapshot);
        }
        // No entry yet: report the limit a first comment would get.
        let max_comments = if post.is_meeting {
            let session = self.require_session(post_id)?;
            session
                .roster
                .get(agent)
                .copied()
                .unwrap_or(self.inner.cfg.meeting.default_quota)
        } else {
            self.inner.cfg.post_quota
        };
        Ok(QuotaSnapshot {
            comments_made: 0,
            max_comments,
            remaining: max_comments,
            verdict_delivered: false,
        })
    }

    pub fn get_leaderboard(&self, limit: usize) -> EngineResult<Vec<LeaderboardEntry>> {
        self.inner.scoring.leaderboard(limit)
    }

    pub fn get_agent_standing(&self, agent_id: &str) -> EngineResult<AgentStanding> {
        let agent = self
            .inner
            .store
            .get_agent(agent_id)?
            .ok_or_else(|| EngineError::UnknownAgent(agent_id.to_string()))?;
        let total_points = self.inner.scoring.total_points(agent_id)?;
        let rank = self
            .inner
            .scoring
            .leaderboard(usize::MAX)?
            .iter()
            .position(|e| e.agent_id == agent_id)
            .map(|i| i + 1);

        let mut recent_awards = self.inner.store.awards_for_agent(agent_id)?;
        recent_awards.reverse();
        recent_awards.truncate(10);

        Ok(AgentStanding {
            latest_meeting_score: agent.latest_meeting_score(),
            agent_id: agent.id,
            name: agent.name,
            active: agent.active,
            total_points,
            level: level_for_points(total_points),
            points_to_next: points_to_next(total_points),
            rank,
            recent_awards,
        })
    }

    // ── Internals ──

    async fn meeting_lock(&self, post_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.meeting_locks.lock().await;
        locks
            .entry(post_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn require_active(&self, agent: &str) -> EngineResult<Agent> {
        let agent_rec = self
            .inner
            .store
            .get_agent(agent)?
            .ok_or_else(|| EngineError::UnknownAgent(agent.to_string()))?;
        if !agent_rec.active {
            return Err(EngineError::InactiveAgent(agent.to_string()));
        }
        Ok(agent_rec)
    }

    fn require_post(&self, post_id: &str) -> EngineResult<Post> {
        self.inner
            .store
            .get_post(post_id)?
            .ok_or_else(|| EngineError::UnknownPost(post_id.to_string()))
    }

    fn require_session(&self, post_id: &str) -> EngineResult<MeetingSession> {
        self.inner
            .store
            .get_session(post_id)?
            .ok_or_else(|| EngineError::SessionNotFound(post_id.to_string()))
    }

    /// Whether an idempotency token already has a recorded sequence. Known
    /// tokens bypass the duplicate-content window so a faithful retry gets
    /// its original receipt back.
    fn token_seen(&self, agent: &str, post_id: &str, token: &str) -> EngineResult<bool> {
        Ok(self
            .inner
            .store
            .get_quota(agent, post_id)?
            .map(|entry| entry.tokens.contains_key(token))
            .unwrap_or(false))
    }

    fn check_duplicate_comment(&self, agent: &str, post_id: &str, body: &str) -> EngineResult<()> {
        let since = Utc::now() - ChronoDuration::seconds(self.inner.cfg.duplicate_window_secs);
        if let Some(existing_id) = self
            .inner
            .store
            .find_recent_comment(agent, post_id, body, since)?
        {
            return Err(EngineError::DuplicateContent { existing_id });
        }
        Ok(())
    }

    /// Append the comment, bump the post counter, run the detectors, and
    /// publish the created/mention events.
    fn record_comment(
        &self,
        agent: &str,
        post_id: &str,
        body: &str,
        is_verdict: bool,
        receipt: ConsumeReceipt,
    ) -> EngineResult<CommentReceipt> {
        let prior_count = self
            .require_post(post_id)
            .map(|p| p.comment_count)
            .unwrap_or(0);
        let comment = self.append_comment(agent, post_id, body, is_verdict, receipt.sequence)?;

        let awards = self.inner.scoring.score_content(
            agent,
            &comment.id,
            body,
            SignalContext::Comment {
                is_verdict,
                is_first: prior_count == 0,
            },
        )?;

        self.publish_mentions(&comment)?;
        self.inner.bus.publish(ForumEvent::CommentCreated {
            comment_id: comment.id.clone(),
            post_id: post_id.to_string(),
            author: agent.to_string(),
            sequence: comment.sequence,
            is_verdict,
            timestamp: Utc::now(),
        });

        Ok(CommentReceipt {
            comment_id: comment.id,
            sequence: receipt.sequence,
            remaining: receipt.remaining,
            must_deliver_verdict: receipt.must_deliver_verdict,
            replayed: false,
            awards,
            snapshot: receipt.snapshot,
        })
    }

    fn append_comment(
        &self,
        agent: &str,
        post_id: &str,
        body: &str,
        is_verdict: bool,
        sequence: u32,
    ) -> EngineResult<Comment> {
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author: agent.to_string(),
            sequence,
            body: body.to_string(),
            is_verdict,
            created_at: Utc::now(),
        };
        self.inner.store.append_comment(&comment)?;
        self.inner
            .store
            .update_post(post_id, &mut |p| p.comment_count += 1)?;
        Ok(comment)
    }

    /// Answer a replayed token with the originally assigned sequence.
    fn replayed_receipt(
        &self,
        agent: &str,
        post_id: &str,
        receipt: ConsumeReceipt,
    ) -> EngineResult<CommentReceipt> {
        let comment_id = self
            .inner
            .store
            .comments_for_post(post_id)?
            .into_iter()
            .find(|c| c.author == agent && c.sequence == receipt.sequence)
            .map(|c| c.id)
            .unwrap_or_default();
        debug!(agent, post_id, sequence = receipt.sequence, "duplicate submission replayed");
        Ok(CommentReceipt {
            comment_id,
            sequence: receipt.sequence,
            remaining: receipt.remaining,
            must_deliver_verdict: receipt.must_deliver_verdict,
            replayed: true,
            awards: Vec::new(),
            snapshot: receipt.snapshot,
        })
    }

    /// Answer a replayed verdict token with the originally recorded comment
    /// and the session's current phase.
    fn replayed_verdict_receipt(
        &self,
        agent: &str,
        post_id: &str,
        session: &MeetingSession,
        sequence: u32,
        snapshot: QuotaSnapshot,
    ) -> EngineResult<VerdictReceipt> {
        let comment_id = self
            .inner
            .store
            .comments_for_post(post_id)?
            .into_iter()
            .find(|c| c.author == agent && c.sequence == sequence)
            .map(|c| c.id)
            .unwrap_or_default();
        debug!(agent, post_id, sequence, "duplicate verdict submission replayed");
        Ok(VerdictReceipt {
            comment_id,
            phase: session.phase,
            snapshot,
        })
    }

    fn record_inline_ratings(&self, rater: &str, post_id: &str, body: &str) -> EngineResult<()> {
        let parsed = parse_inline_ratings(body);
        if parsed.is_empty() {
            return Ok(());
        }
        let names = self.agent_name_map()?;
        for (name, score) in parsed {
            let Some(ratee) = names.get(&name.to_lowercase()) else {
                debug!(rater, post_id, name, "inline rating for unknown name skipped");
                continue;
            };
            match self.inner.aggregator.record_rating(rater, ratee, post_id, score) {
                Ok(_) => {}
                Err(e) => debug!(rater, ratee = %ratee, post_id, error = %e, "inline rating skipped"),
            }
        }
        Ok(())
    }

    fn publish_mentions(&self, comment: &Comment) -> EngineResult<()> {
        let mentioned = parse_mentions(&comment.body);
        if mentioned.is_empty() {
            return Ok(());
        }
        let names = self.agent_name_map()?;
        for name in mentioned {
            let Some(agent_id) = names.get(&name.to_lowercase()) else {
                continue;
            };
            if *agent_id == comment.author {
                continue;
            }
            self.inner.bus.publish(ForumEvent::MentionCreated {
                comment_id: comment.id.clone(),
                post_id: comment.post_id.clone(),
                author: comment.author.clone(),
                mentioned: agent_id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Display names and ids, lowercased, to resolve @-references.
    fn agent_name_map(&self) -> EngineResult<HashMap<String, AgentId>> {
        let mut map = HashMap::new();
        for agent in self.inner.store.list_agents()? {
            map.insert(agent.name.to_lowercase(), agent.id.clone());
            map.insert(agent.id.to_lowercase(), agent.id);
        }
        Ok(map)
    }

    /// Session just closed: cancel its timeout and announce the result.
    fn finish_close(&self, session: &MeetingSession) {
        if let Ok(mut timeouts) = self.inner.timeouts.lock() {
            if let Some(handle) = timeouts.remove(&session.post_id) {
                handle.abort();
            }
        }
        let scored = session
            .final_scores
            .as_ref()
            .map(|s| s.len() as u32)
            .unwrap_or(0);
        if let Some(reason) = session.close_reason {
            self.inner.bus.publish(ForumEvent::MeetingClosed {
                post_id: session.post_id.clone(),
                reason,
                scored_participants: scored,
                timestamp: Utc::now(),
            });
        }
    }

    fn spawn_timeout(&self, post_id: &str, wait: Duration) {
        let engine = self.clone();
        let post = post_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            engine.close_by_timeout(&post).await;
        });
        if let Ok(mut timeouts) = self.inner.timeouts.lock() {
            if let Some(previous) = timeouts.insert(post_id.to_string(), handle) {
                previous.abort();
            }
        }
    }

    async fn close_by_timeout(&self, post_id: &str) {
        let lock = self.meeting_lock(post_id).await;
        let _guard = lock.lock().await;
        let mut session = match self.inner.store.get_session(post_id) {
            Ok(Some(s)) => s,
            Ok(None) => return,
            Err(e) => {
                warn!(post_id, error = %e, "timeout close could not load session");
                return;
            }
        };
        if session.phase != MeetingPhase::VerdictPending {
            return;
        }
        match self
            .inner
            .orchestrator
            .close(&mut session, crate::meeting::CloseReason::Timeout)
        {
            Ok(_) => self.finish_close(&session),
            Err(e) => warn!(post_id, error = %e, "timeout close failed"),
        }
    }
}
