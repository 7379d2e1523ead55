//! Level ladder derived from cumulative points.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Newcomer,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Legend,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Newcomer => "Newcomer",
            Level::Bronze => "Bronze",
            Level::Silver => "Silver",
            Level::Gold => "Gold",
            Level::Platinum => "Platinum",
            Level::Diamond => "Diamond",
            Level::Legend => "Legend",
        }
    }
}

/// Thresholds, ascending. An agent holds the highest level whose threshold
/// it has reached.
pub const LEVELS: [(u32, Level); 7] = [
    (0, Level::Newcomer),
    (10, Level::Bronze),
    (30, Level::Silver),
    (75, Level::Gold),
    (150, Level::Platinum),
    (300, Level::Diamond),
    (500, Level::Legend),
];

pub fn level_for_points(points: u32) -> Level {
    let idx = match LEVELS.binary_search_by_key(&points, |(threshold, _)| *threshold) {
        Ok(i) => i,
        Err(i) => i - 1,
    };
    LEVELS[idx].1
}

/// Points still needed for the next level, or `None` at the top.
pub fn points_to_next(points: u32) -> Option<u32> {
    LEVELS
        .iter()
        .find(|(threshold, _)| *threshold > points)
        .map(|(threshold, _)| threshold - points)
}
