//! In-memory `ForumStore` backed by a single `RwLock`.
//!
//! Holding the write lock for the duration of each mutating call is what
//! makes the conditional quota update and the unique rating/award inserts
//! atomic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::types::{Agent, Comment, CommentId, Post, PostId, Rating};
use super::{ForumStore, StoreError, StoreResult};
use crate::meeting::MeetingSession;
use crate::quota::QuotaEntry;
use crate::scoring::{ActionKind, AwardRecord};

#[derive(Default)]
struct Inner {
    agents: HashMap<String, Agent>,
    posts: HashMap<String, Post>,
    comments: HashMap<PostId, Vec<Comment>>,
    quotas: HashMap<(String, String), QuotaEntry>,
    ratings: HashMap<PostId, Vec<Rating>>,
    rating_keys: HashSet<(String, String, String)>,
    sessions: HashMap<PostId, MeetingSession>,
    awards: Vec<AwardRecord>,
    award_keys: HashSet<(String, ActionKind, String)>,
    votes: HashMap<PostId, HashMap<String, i8>>,
}

/// In-memory store. Cheap to clone behind an `Arc`; the default backend for
/// tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared trait-object reference to a fresh store.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ForumStore for MemoryStore {
    fn put_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.write()?.agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn get_agent(&self, id: &str) -> StoreResult<Option<Agent>> {
        Ok(self.read()?.agents.get(id).cloned())
    }

    fn list_agents(&self) -> StoreResult<Vec<Agent>> {
        let mut agents: Vec<Agent> = self.read()?.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    fn update_agent(&self, id: &str, apply: &mut dyn FnMut(&mut Agent)) -> StoreResult<bool> {
        let mut inner = self.write()?;
        match inner.agents.get_mut(id) {
            Some(agent) => {
                apply(agent);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn put_post(&self, post: &Post) -> StoreResult<()> {
        self.write()?.posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    fn get_post(&self, id: &str) -> StoreResult<Option<Post>> {
        Ok(self.read()?.posts.get(id).cloned())
    }

    fn update_post(&self, id: &str, apply: &mut dyn FnMut(&mut Post)) -> StoreResult<bool> {
        let mut inner = self.write()?;
        match inner.posts.get_mut(id) {
            Some(post) => {
                apply(post);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_recent_post(
        &self,
        agent: &str,
        title: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PostId>> {
        Ok(self
            .read()?
            .posts
            .values()
            .filter(|p| {
                p.author.agent_id() == Some(agent) && p.title == title && p.created_at >= since
            })
            .max_by_key(|p| p.created_at)
            .map(|p| p.id.clone()))
    }

    fn append_comment(&self, comment: &Comment) -> StoreResult<()> {
        self.write()?
            .comments
            .entry(comment.post_id.clone())
            .or_default()
            .push(comment.clone());
        Ok(())
    }

    fn comments_for_post(&self, post: &str) -> StoreResult<Vec<Comment>> {
        Ok(self.read()?.comments.get(post).cloned().unwrap_or_default())
    }

    fn find_recent_comment(
        &self,
        agent: &str,
        post: &str,
        body: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<CommentId>> {
        Ok(self.read()?.comments.get(post).and_then(|comments| {
            comments
                .iter()
                .filter(|c| c.author == agent && c.body == body && c.created_at >= since)
                .max_by_key(|c| c.created_at)
                .map(|c| c.id.clone())
        }))
    }

    fn with_quota(
        &self,
        agent: &str,
        post: &str,
        default_max: u32,
        apply: &mut dyn FnMut(&mut QuotaEntry),
    ) -> StoreResult<()> {
        let mut inner = self.write()?;
        let entry = inner
            .quotas
            .entry((agent.to_string(), post.to_string()))
            .or_insert_with(|| QuotaEntry::new(agent, post, default_max));
        apply(entry);
        Ok(())
    }

    fn get_quota(&self, agent: &str, post: &str) -> StoreResult<Option<QuotaEntry>> {
        Ok(self
            .read()?
            .quotas
            .get(&(agent.to_string(), post.to_string()))
            .cloned())
    }

    fn quotas_for_post(&self, post: &str) -> StoreResult<Vec<QuotaEntry>> {
        let mut entries: Vec<QuotaEntry> = self
            .read()?
            .quotas
            .values()
            .filter(|q| q.post_id == post)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(entries)
    }

    fn insert_rating(&self, rating: &Rating) -> StoreResult<bool> {
        let mut inner = self.write()?;
        let key = (
            rating.rater.clone(),
            rating.ratee.clone(),
            rating.meeting_id.clone(),
        );
        if !inner.rating_keys.insert(key) {
            return Ok(false);
        }
        inner
            .ratings
            .entry(rating.meeting_id.clone())
            .or_default()
            .push(rating.clone());
        Ok(true)
    }

    fn ratings_for_meeting(&self, meeting: &str) -> StoreResult<Vec<Rating>> {
        Ok(self.read()?.ratings.get(meeting).cloned().unwrap_or_default())
    }

    fn put_session(&self, session: &MeetingSession) -> StoreResult<()> {
        self.write()?
            .sessions
            .insert(session.post_id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, post: &str) -> StoreResult<Option<MeetingSession>> {
        Ok(self.read()?.sessions.get(post).cloned())
    }

    fn insert_award(&self, award: &AwardRecord) -> StoreResult<bool> {
        let mut inner = self.write()?;
        let key = (
            award.agent_id.clone(),
            award.kind,
            award.source_event_id.clone(),
        );
        if !inner.award_keys.insert(key) {
            return Ok(false);
        }
        inner.awards.push(award.clone());
        Ok(true)
    }

    fn awards_for_agent(&self, agent: &str) -> StoreResult<Vec<AwardRecord>> {
        Ok(self
            .read()?
            .awards
            .iter()
            .filter(|a| a.agent_id == agent)
            .cloned()
            .collect())
    }

    fn all_awards(&self) -> StoreResult<Vec<AwardRecord>> {
        Ok(self.read()?.awards.clone())
    }

    fn record_vote(&self, post: &str, agent: &str, value: i8) -> StoreResult<i64> {
        let mut inner = self.write()?;
        let votes = inner.votes.entry(post.to_string()).or_default();
        if value == 0 {
            votes.remove(agent);
        } else {
            votes.insert(agent.to_string(), value);
        }
        Ok(votes.values().map(|v| *v as i64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Author;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[test]
    fn test_agent_roundtrip() {
        let s = store();
        s.put_agent(&Agent::new("bot-1", "Yilin")).unwrap();
        let agent = s.get_agent("bot-1").unwrap().unwrap();
        assert_eq!(agent.name, "Yilin");
        assert!(s.get_agent("nope").unwrap().is_none());
    }

    #[test]
    fn test_quota_conditional_update_creates_lazily() {
        let s = store();
        let mut seen = 0;
        s.with_quota("bot-1", "p-1", 20, &mut |q| {
            q.try_consume("t-1");
            seen = q.comments_made;
        })
        .unwrap();
        assert_eq!(seen, 1);

        let entry = s.get_quota("bot-1", "p-1").unwrap().unwrap();
        assert_eq!(entry.max_comments, 20);
        assert_eq!(entry.comments_made, 1);
    }

    #[test]
    fn test_rating_insert_is_unique() {
        let s = store();
        let rating = Rating {
            rater: "a".to_string(),
            ratee: "b".to_string(),
            meeting_id: "m-1".to_string(),
            score: 7.0,
            created_at: Utc::now(),
        };
        assert!(s.insert_rating(&rating).unwrap());
        assert!(!s.insert_rating(&rating).unwrap());
        assert_eq!(s.ratings_for_meeting("m-1").unwrap().len(), 1);
    }

    #[test]
    fn test_award_insert_is_unique() {
        let s = store();
        let award = AwardRecord::new("bot-1", ActionKind::DataInsight, "c-1", 2, "data");
        assert!(s.insert_award(&award).unwrap());
        assert!(!s.insert_award(&award).unwrap());
        assert_eq!(s.awards_for_agent("bot-1").unwrap().len(), 1);
    }

    #[test]
    fn test_vote_upsert_and_removal() {
        let s = store();
        assert_eq!(s.record_vote("p-1", "bot-1", 1).unwrap(), 1);
        assert_eq!(s.record_vote("p-1", "bot-2", 1).unwrap(), 2);
        // Re-vote replaces, never stacks.
        assert_eq!(s.record_vote("p-1", "bot-1", -1).unwrap(), 0);
        // Zero removes.
        assert_eq!(s.record_vote("p-1", "bot-1", 0).unwrap(), 1);
    }

    #[test]
    fn test_find_recent_post() {
        let s = store();
        let post = Post::new(
            "p-1",
            "ai-news",
            Author::Agent {
                id: "bot-1".to_string(),
            },
            "Breaking",
            "body",
            false,
        );
        s.put_post(&post).unwrap();

        let since = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(
            s.find_recent_post("bot-1", "Breaking", since).unwrap(),
            Some("p-1".to_string())
        );
        assert!(s.find_recent_post("bot-2", "Breaking", since).unwrap().is_none());
        assert!(s.find_recent_post("bot-1", "Other", since).unwrap().is_none());
    }
}
