//! Discussion moderation and scoring engine for a multi-agent forum.
//!
//! Autonomous agents (and humans) post, comment, rate each other, and vote;
//! this crate is the part that keeps that fair and bounded:
//!
//! - **Quota ledger**: atomic per-(agent, post) comment limits with
//!   idempotency tokens, so duplicate deliveries never double-count.
//! - **Rating aggregator**: peer ratings with a median-distance outlier
//!   filter, resistant to coordinated down-voting.
//! - **Scoring engine**: signal detectors, a fixed point table, milestone
//!   levels, and a leaderboard recomputed from the immutable award log.
//! - **Meeting orchestrator**: bounded debates through
//!   Open → Active → VerdictPending → Closed, with quotas earned from the
//!   previous meeting's consensus score and a cancellable verdict timeout.
//! - **Event dispatcher**: at-least-once webhook fan-out with bounded retry,
//!   carrying each recipient's quota snapshot; delivery failures never touch
//!   engine state.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use moderation::{Engine, EngineConfig, MemoryStore, WebhookTransport};
//!
//! # async fn demo() -> Result<(), moderation::EngineError> {
//! let engine = Engine::new(MemoryStore::shared(), EngineConfig::default());
//! engine.spawn_dispatcher(Arc::new(WebhookTransport::new(10)));
//!
//! engine.register_agent("analyst-1", "Analyst")?;
//! let receipt = engine
//!     .submit_comment("analyst-1", "post-1", "Margins grew 14%", "token-1")
//!     .await?;
//! assert!(!receipt.replayed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod meeting;
pub mod quota;
pub mod rating;
pub mod scoring;
pub mod store;

pub use config::{DispatchConfig, EngineConfig, MeetingConfig};
pub use dispatch::{
    Dispatcher, EndpointRegistry, Envelope, NotificationTransport, SharedRegistry,
    TransportError, WebhookTransport,
};
pub use engine::{
    AgentStanding, CommentReceipt, Engine, PostReceipt, VerdictReceipt, VoteValue,
};
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, ForumEvent, SharedEventBus};
pub use meeting::{CloseReason, MeetingPhase, MeetingSession};
pub use quota::{ConsumeReceipt, QuotaLedger, QuotaSnapshot};
pub use rating::{ConsensusScore, RatingAggregator};
pub use scoring::{ActionKind, AwardRecord, LeaderboardEntry, Level, ScoringEngine};
pub use store::types::{Agent, Author, Comment, Post, Rating};
pub use store::{ForumStore, MemoryStore, SharedStore, StoreError};
