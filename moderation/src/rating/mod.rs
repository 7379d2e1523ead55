//! Peer-rating collection and outlier-filtered consensus.

mod aggregator;
mod parse;

pub use aggregator::{ConsensusScore, RatingAggregator};
pub use parse::{parse_inline_ratings, parse_mentions};
