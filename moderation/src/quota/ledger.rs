//! Store-backed quota operations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ConsumeOutcome, QuotaSnapshot};
use crate::error::{EngineError, EngineResult};
use crate::store::SharedStore;

/// Result of a successful quota consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeReceipt {
    /// Sequence number allocated to this comment, monotonic per (post, agent).
    pub sequence: u32,
    pub remaining: u32,
    /// Set on the call that spends the final slot.
    pub must_deliver_verdict: bool,
    /// Set when the idempotency token was seen before; nothing was counted.
    pub replayed: bool,
    pub snapshot: QuotaSnapshot,
}

/// The quota ledger. All consumption goes through the store's conditional
/// update for the (agent, post) key, so concurrent and duplicate calls
/// serialize there.
#[derive(Clone)]
pub struct QuotaLedger {
    store: SharedStore,
}

impl QuotaLedger {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Create the quota entry for a meeting participant with its assigned
    /// limit. Called once at session open; the limit is never recomputed.
    pub fn initialize(&self, agent: &str, post: &str, max_comments: u32) -> EngineResult<()> {
        self.store
            .with_quota(agent, post, max_comments, &mut |_entry| {})?;
        Ok(())
    }

    /// Atomically consume one comment slot. `default_max` seeds the entry on
    /// first use for posts without a pre-assigned limit.
    pub fn try_consume(
        &self,
        agent: &str,
        post: &str,
        token: &str,
        default_max: u32,
    ) -> EngineResult<ConsumeReceipt> {
        let mut result: Option<(ConsumeOutcome, QuotaSnapshot)> = None;
        self.store.with_quota(agent, post, default_max, &mut |entry| {
            let outcome = entry.try_consume(token);
            result = Some((outcome, entry.snapshot()));
        })?;
        let (outcome, snapshot) = result.ok_or_else(|| {
            EngineError::TransientStoreFailure("quota update was not applied".to_string())
        })?;

        match outcome {
            ConsumeOutcome::Granted {
                sequence,
                must_deliver_verdict,
                replayed,
            } => {
                if replayed {
                    debug!(agent, post, token, sequence, "idempotency token replayed");
                }
                Ok(ConsumeReceipt {
                    sequence,
                    remaining: snapshot.remaining,
                    must_deliver_verdict,
                    replayed,
                    snapshot,
                })
            }
            ConsumeOutcome::Exhausted => Err(EngineError::QuotaExceeded { snapshot }),
            ConsumeOutcome::VerdictLocked => Err(EngineError::VerdictAlreadyDelivered {
                post_id: post.to_string(),
                agent_id: agent.to_string(),
            }),
        }
    }

    /// Atomic verdict submission for (agent, post). A replayed token answers
    /// with the originally allocated sequence; any later token — including
    /// the loser of two racing submissions — gets `VerdictAlreadyDelivered`.
    pub fn consume_verdict(
        &self,
        agent: &str,
        post: &str,
        token: &str,
        default_max: u32,
    ) -> EngineResult<ConsumeReceipt> {
        let mut result: Option<(ConsumeOutcome, QuotaSnapshot)> = None;
        self.store.with_quota(agent, post, default_max, &mut |entry| {
            let outcome = entry.try_consume_verdict(token);
            result = Some((outcome, entry.snapshot()));
        })?;
        let (outcome, snapshot) = result.ok_or_else(|| {
            EngineError::TransientStoreFailure("quota update was not applied".to_string())
        })?;

        match outcome {
            ConsumeOutcome::Granted {
                sequence,
                must_deliver_verdict,
                replayed,
            } => {
                if replayed {
                    debug!(agent, post, token, sequence, "verdict token replayed");
                }
                Ok(ConsumeReceipt {
                    sequence,
                    remaining: snapshot.remaining,
                    must_deliver_verdict,
                    replayed,
                    snapshot,
                })
            }
            ConsumeOutcome::Exhausted => Err(EngineError::QuotaExceeded { snapshot }),
            ConsumeOutcome::VerdictLocked => Err(EngineError::VerdictAlreadyDelivered {
                post_id: post.to_string(),
                agent_id: agent.to_string(),
            }),
        }
    }

    /// Current snapshot for (agent, post); `None` if the entry does not
    /// exist yet.
    pub fn snapshot(&self, agent: &str, post: &str) -> EngineResult<Option<QuotaSnapshot>> {
        Ok(self.store.get_quota(agent, post)?.map(|e| e.snapshot()))
    }
}
