//! Persistence contract for the engine.
//!
//! Every mutation funnels through a `ForumStore`: the trait guarantees the
//! atomic primitives the rest of the engine leans on — a conditional update
//! per (agent, post) quota key, unique check-and-insert for ratings and
//! awards, and durable append of immutable comment records. The default
//! implementation is the in-memory `MemoryStore`.

mod memory;
pub mod types;

pub use memory::MemoryStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::meeting::MeetingSession;
use crate::quota::QuotaEntry;
use crate::scoring::AwardRecord;
use types::{Agent, Comment, CommentId, Post, PostId, Rating};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lock poisoned")]
    LockPoisoned,

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a store implementation.
pub type SharedStore = Arc<dyn ForumStore>;

/// Key-addressed durable storage with the atomic primitives from the
/// engine's contract. All methods complete in bounded time.
pub trait ForumStore: Send + Sync {
    // Agents
    fn put_agent(&self, agent: &Agent) -> StoreResult<()>;
    fn get_agent(&self, id: &str) -> StoreResult<Option<Agent>>;
    fn list_agents(&self) -> StoreResult<Vec<Agent>>;
    /// Apply a mutation to an agent under the store lock. Returns `false`
    /// when the agent does not exist.
    fn update_agent(&self, id: &str, apply: &mut dyn FnMut(&mut Agent)) -> StoreResult<bool>;

    // Posts
    fn put_post(&self, post: &Post) -> StoreResult<()>;
    fn get_post(&self, id: &str) -> StoreResult<Option<Post>>;
    fn update_post(&self, id: &str, apply: &mut dyn FnMut(&mut Post)) -> StoreResult<bool>;
    /// Most recent post by `agent` with the given title at or after `since`.
    /// Backs the duplicate-submission short-circuit.
    fn find_recent_post(
        &self,
        agent: &str,
        title: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PostId>>;

    // Comments (append-only)
    fn append_comment(&self, comment: &Comment) -> StoreResult<()>;
    fn comments_for_post(&self, post: &str) -> StoreResult<Vec<Comment>>;
    fn find_recent_comment(
        &self,
        agent: &str,
        post: &str,
        body: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<CommentId>>;

    // Quota entries — the conditional-update primitive. The closure runs
    // exactly once, under the write lock for the (agent, post) key; a missing
    // entry is created with `default_max` first.
    fn with_quota(
        &self,
        agent: &str,
        post: &str,
        default_max: u32,
        apply: &mut dyn FnMut(&mut QuotaEntry),
    ) -> StoreResult<()>;
    fn get_quota(&self, agent: &str, post: &str) -> StoreResult<Option<QuotaEntry>>;
    fn quotas_for_post(&self, post: &str) -> StoreResult<Vec<QuotaEntry>>;

    // Ratings — atomic check-and-insert, unique by (rater, ratee, meeting).
    /// Returns `false` when the triple was already recorded.
    fn insert_rating(&self, rating: &Rating) -> StoreResult<bool>;
    fn ratings_for_meeting(&self, meeting: &str) -> StoreResult<Vec<Rating>>;

    // Meeting sessions
    fn put_session(&self, session: &MeetingSession) -> StoreResult<()>;
    fn get_session(&self, post: &str) -> StoreResult<Option<MeetingSession>>;

    // Awards — atomic check-and-insert, unique by (agent, kind, source).
    /// Returns `false` when this key was already awarded (redelivery no-op).
    fn insert_award(&self, award: &AwardRecord) -> StoreResult<bool>;
    fn awards_for_agent(&self, agent: &str) -> StoreResult<Vec<AwardRecord>>;
    fn all_awards(&self) -> StoreResult<Vec<AwardRecord>>;

    // Votes — idempotent upsert per (agent, post); value 0 removes.
    /// Returns the post's new vote total.
    fn record_vote(&self, post: &str, agent: &str, value: i8) -> StoreResult<i64>;
}
