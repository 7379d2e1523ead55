//! Quota ledger — bounds how much any single agent may contribute to a post.
//!
//! The entry itself (`QuotaEntry`) carries the whole invariant: the counter
//! never exceeds the limit, replayed idempotency tokens answer with the
//! previously assigned sequence number, and the verdict flag is a one-way
//! transition.

mod ledger;

pub use ledger::{ConsumeReceipt, QuotaLedger};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::types::{AgentId, PostId};

/// Caller-facing view of one (agent, post) quota entry. Attached to event
/// envelopes and to rejections so agents can decide to retry or abstain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub comments_made: u32,
    pub max_comments: u32,
    pub remaining: u32,
    pub verdict_delivered: bool,
}

/// Outcome of one atomic consume attempt against a `QuotaEntry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A slot was allocated (or re-read for a replayed token).
    Granted {
        sequence: u32,
        must_deliver_verdict: bool,
        replayed: bool,
    },
    /// The entry is full; state was left unchanged.
    Exhausted,
    /// A verdict was already delivered; no further comments are allowed.
    VerdictLocked,
}

/// Per (agent, post) quota state. Created lazily on first comment for
/// ordinary posts, eagerly at session open for meeting posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaEntry {
    pub agent_id: AgentId,
    pub post_id: PostId,
    pub comments_made: u32,
    pub max_comments: u32,
    pub verdict_delivered: bool,
    /// Idempotency token → allocated sequence number. Retried network calls
    /// for an already-recorded sequence answer from here without counting.
    pub tokens: HashMap<String, u32>,
}

impl QuotaEntry {
    pub fn new(agent_id: impl Into<AgentId>, post_id: impl Into<PostId>, max_comments: u32) -> Self {
        Self {
            agent_id: agent_id.into(),
            post_id: post_id.into(),
            comments_made: 0,
            max_comments,
            verdict_delivered: false,
            tokens: HashMap::new(),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.max_comments.saturating_sub(self.comments_made)
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            comments_made: self.comments_made,
            max_comments: self.max_comments,
            remaining: self.remaining(),
            verdict_delivered: self.verdict_delivered,
        }
    }

    /// Whether this agent is done contributing: quota spent or verdict given.
    pub fn is_settled(&self) -> bool {
        self.verdict_delivered || self.comments_made >= self.max_comments
    }

    /// Atomic compare-and-increment. Must be called under the store's
    /// conditional-update lock for the (agent, post) key.
    pub fn try_consume(&mut self, token: &str) -> ConsumeOutcome {
        if let Some(&sequence) = self.tokens.get(token) {
            return ConsumeOutcome::Granted {
                sequence,
                must_deliver_verdict: self.comments_made == self.max_comments,
                replayed: true,
            };
        }
        if self.verdict_delivered {
            return ConsumeOutcome::VerdictLocked;
        }
        if self.comments_made >= self.max_comments {
            return ConsumeOutcome::Exhausted;
        }
        self.comments_made += 1;
        let sequence = self.comments_made;
        self.tokens.insert(token.to_string(), sequence);
        ConsumeOutcome::Granted {
            sequence,
            must_deliver_verdict: self.comments_made == self.max_comments,
            replayed: false,
        }
    }

    /// Atomic verdict submission. Consumes a slot when one remains; an
    /// exhausted quota still admits the verdict under the next sequence
    /// number without counting it. The verdict flag is one-way: a replayed
    /// token answers with the original allocation, any other token after
    /// the verdict — including the loser of two racing submissions — gets
    /// `VerdictLocked`.
    pub fn try_consume_verdict(&mut self, token: &str) -> ConsumeOutcome {
        if let Some(&sequence) = self.tokens.get(token) {
            return ConsumeOutcome::Granted {
                sequence,
                must_deliver_verdict: false,
                replayed: true,
            };
        }
        if self.verdict_delivered {
            return ConsumeOutcome::VerdictLocked;
        }
        let sequence = if self.comments_made < self.max_comments {
            self.comments_made += 1;
            self.comments_made
        } else {
            self.comments_made + 1
        };
        self.tokens.insert(token.to_string(), sequence);
        self.verdict_delivered = true;
        ConsumeOutcome::Granted {
            sequence,
            must_deliver_verdict: false,
            replayed: false,
        }
    }
}
