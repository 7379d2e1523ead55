//! Rating validation and the anti-collusion consensus computation.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::store::types::{AgentId, Rating};
use crate::store::SharedStore;

/// Consensus result for one ratee in one meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsensusScore {
    /// Outlier-filtered mean of the surviving ratings.
    Scored {
        mean: f64,
        ratings_counted: usize,
        discarded: usize,
    },
    /// Fewer than the minimum surviving ratings — reported, never zeroed.
    InsufficientData { ratings_seen: usize },
}

impl ConsensusScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            ConsensusScore::Scored { mean, .. } => Some(*mean),
            ConsensusScore::InsufficientData { .. } => None,
        }
    }
}

/// Collects peer ratings and computes the filtered consensus.
///
/// `compute_consensus` is a pure function of the stored ratings: it is safe
/// to run at any time for a live estimate, and the close-time run over the
/// frozen ratings matches whatever was displayed.
#[derive(Clone)]
pub struct RatingAggregator {
    store: SharedStore,
    /// Absolute deviation from the per-ratee median beyond which a rating
    /// is discarded. A fixed threshold, not a statistical estimator, so the
    /// filter stays deterministic and auditable.
    outlier_threshold: f64,
    /// Minimum surviving ratings for a consensus score.
    min_ratings: usize,
}

impl RatingAggregator {
    pub fn new(store: SharedStore, outlier_threshold: f64, min_ratings: usize) -> Self {
        Self {
            store,
            outlier_threshold,
            min_ratings,
        }
    }

    /// Validate and record one rating. The session-phase check happens in the
    /// engine facade under the meeting lock; this enforces everything local
    /// to the rating itself.
    pub fn record_rating(
        &self,
        rater: &str,
        ratee: &str,
        meeting: &str,
        score: f64,
    ) -> EngineResult<Rating> {
        if !(0.0..=10.0).contains(&score) {
            return Err(EngineError::InvalidRatingScore(score));
        }
        if rater == ratee {
            return Err(EngineError::SelfRatingRejected(rater.to_string()));
        }

        let rating = Rating {
            rater: rater.to_string(),
            ratee: ratee.to_string(),
            meeting_id: meeting.to_string(),
            score,
            created_at: Utc::now(),
        };
        if !self.store.insert_rating(&rating)? {
            return Err(EngineError::DuplicateRating {
                rater: rater.to_string(),
                ratee: ratee.to_string(),
                meeting: meeting.to_string(),
            });
        }
        debug!(rater, ratee, meeting, score, "rating recorded");
        Ok(rating)
    }

    /// Consensus per ratee over everything stored for the meeting.
    pub fn compute_consensus(
        &self,
        meeting: &str,
    ) -> EngineResult<BTreeMap<AgentId, ConsensusScore>> {
        let ratings = self.store.ratings_for_meeting(meeting)?;

        let mut per_ratee: BTreeMap<AgentId, Vec<f64>> = BTreeMap::new();
        for rating in &ratings {
            per_ratee
                .entry(rating.ratee.clone())
                .or_default()
                .push(rating.score);
        }

        let mut consensus = BTreeMap::new();
        for (ratee, scores) in per_ratee {
            consensus.insert(ratee, self.score_one(&scores));
        }
        Ok(consensus)
    }

    fn score_one(&self, scores: &[f64]) -> ConsensusScore {
        let med = median(scores);
        let surviving: Vec<f64> = scores
            .iter()
            .copied()
            .filter(|s| (s - med).abs() <= self.outlier_threshold)
            .collect();
        let discarded = scores.len() - surviving.len();

        if surviving.len() < self.min_ratings {
            return ConsensusScore::InsufficientData {
                ratings_seen: scores.len(),
            };
        }
        let mean = surviving.iter().sum::<f64>() / surviving.len() as f64;
        ConsensusScore::Scored {
            mean,
            ratings_counted: surviving.len(),
            discarded,
        }
    }
}

/// Median of a non-empty slice; mean of the two middle values for even
/// lengths. Returns 0.0 for an empty slice (no ratings to filter).
fn median(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn aggregator() -> RatingAggregator {
        RatingAggregator::new(MemoryStore::shared(), 3.0, 2)
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[9.0, 8.0, 10.0, 2.0]), 8.5);
        assert_eq!(median(&[5.0]), 5.0);
    }

    #[test]
    fn test_score_bounds() {
        let agg = aggregator();
        assert!(matches!(
            agg.record_rating("a", "b", "m-1", 10.5),
            Err(EngineError::InvalidRatingScore(_))
        ));
        assert!(matches!(
            agg.record_rating("a", "b", "m-1", -0.1),
            Err(EngineError::InvalidRatingScore(_))
        ));
        assert!(agg.record_rating("a", "b", "m-1", 10.0).is_ok());
        assert!(agg.record_rating("a", "c", "m-1", 0.0).is_ok());
    }

    #[test]
    fn test_self_rating_rejected() {
        let agg = aggregator();
        assert!(matches!(
            agg.record_rating("a", "a", "m-1", 5.0),
            Err(EngineError::SelfRatingRejected(_))
        ));
    }

    #[test]
    fn test_duplicate_triple_rejected() {
        let agg = aggregator();
        agg.record_rating("a", "b", "m-1", 7.0).unwrap();
        assert!(matches!(
            agg.record_rating("a", "b", "m-1", 9.0),
            Err(EngineError::DuplicateRating { .. })
        ));
        // Same pair in a different meeting is fine.
        assert!(agg.record_rating("a", "b", "m-2", 9.0).is_ok());
    }

    // {9, 8, 10, 2} → median 8.5, the 2 is 6.5 away and is
    // discarded, consensus = mean(9, 8, 10) = 9.0.
    #[test]
    fn test_collusion_outlier_discarded() {
        let agg = aggregator();
        for (rater, score) in [("r1", 9.0), ("r2", 8.0), ("r3", 10.0), ("r4", 2.0)] {
            agg.record_rating(rater, "target", "m-1", score).unwrap();
        }
        let consensus = agg.compute_consensus("m-1").unwrap();
        assert_eq!(
            consensus["target"],
            ConsensusScore::Scored {
                mean: 9.0,
                ratings_counted: 3,
                discarded: 1,
            }
        );
    }

    // Boundary: deviation of exactly 3.00 is retained, 3.01 is discarded.
    #[test]
    fn test_outlier_boundary_is_inclusive() {
        let agg = aggregator();
        // Median of {7, 7, 4} is 7; the 4 deviates by exactly 3.0.
        for (rater, score) in [("r1", 7.0), ("r2", 7.0), ("r3", 4.0)] {
            agg.record_rating(rater, "kept", "m-1", score).unwrap();
        }
        // Median of {7, 7, 3.99} is 7; the 3.99 deviates by 3.01.
        for (rater, score) in [("r1", 7.0), ("r2", 7.0), ("r3", 3.99)] {
            agg.record_rating(rater, "cut", "m-1", score).unwrap();
        }

        let consensus = agg.compute_consensus("m-1").unwrap();
        match &consensus["kept"] {
            ConsensusScore::Scored {
                ratings_counted,
                discarded,
                mean,
            } => {
                assert_eq!(*ratings_counted, 3);
                assert_eq!(*discarded, 0);
                assert!((mean - 6.0).abs() < 1e-9);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &consensus["cut"] {
            ConsensusScore::Scored {
                ratings_counted,
                discarded,
                ..
            } => {
                assert_eq!(*ratings_counted, 2);
                assert_eq!(*discarded, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_insufficient_data_never_zero() {
        let agg = aggregator();
        agg.record_rating("r1", "lonely", "m-1", 9.0).unwrap();
        let consensus = agg.compute_consensus("m-1").unwrap();
        assert_eq!(
            consensus["lonely"],
            ConsensusScore::InsufficientData { ratings_seen: 1 }
        );
        assert_eq!(consensus["lonely"].value(), None);
    }

    #[test]
    fn test_consensus_is_deterministic() {
        let agg = aggregator();
        for (rater, ratee, score) in [
            ("r1", "a", 6.0),
            ("r2", "a", 7.5),
            ("r3", "a", 8.0),
            ("r1", "b", 4.0),
            ("r3", "b", 5.0),
        ] {
            agg.record_rating(rater, ratee, "m-1", score).unwrap();
        }
        let first = agg.compute_consensus("m-1").unwrap();
        let second = agg.compute_consensus("m-1").unwrap();
        assert_eq!(first, second);
    }
}
