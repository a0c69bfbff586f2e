//! Lane scoring and rating deltas.
//!
//! Pure functions only. Writing history and touching stored ratings is the
//! server's job.

use serde::{Deserialize, Serialize};

use crate::state::{Side, LANE_COUNT};

/// Outcome of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneResult {
    /// One side had strictly more power.
    Won(Side),
    /// Equal power.
    Tie,
}

/// Outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    /// A clear winner.
    Side(Side),
    /// Nobody took a majority of lanes.
    Tie,
}

impl Winner {
    /// The winning side, if any.
    #[must_use]
    pub const fn side(self) -> Option<Side> {
        match self {
            Self::Side(side) => Some(side),
            Self::Tie => None,
        }
    }
}

/// Final board evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchScore {
    /// Per-lane outcome.
    pub lanes: [LaneResult; LANE_COUNT],
    /// Final lane powers, `[lane][side]`.
    pub powers: [[u32; 2]; LANE_COUNT],
    /// Match verdict.
    pub winner: Winner,
}

impl MatchScore {
    /// Lanes won by `side`.
    #[must_use]
    pub fn lanes_won(&self, side: Side) -> usize {
        self.lanes
            .iter()
            .filter(|r| **r == LaneResult::Won(side))
            .count()
    }

    /// Sum of `side`'s power across all lanes.
    #[must_use]
    pub fn total_power(&self, side: Side) -> u32 {
        self.powers
            .iter()
            .map(|p| p[side.index()])
            .fold(0u32, u32::saturating_add)
    }
}

/// Score a final board.
///
/// A lane goes to the side with strictly more power. The match goes to the
/// side holding a strict majority (two or more) of the three lanes;
/// anything else is a tie.
///
/// ```
/// use clash_core::result::{score_lanes, Winner};
/// use clash_core::state::Side;
///
/// let score = score_lanes([[10, 5], [3, 8], [7, 7]]);
/// assert_eq!(score.winner, Winner::Tie);
///
/// let score = score_lanes([[10, 5], [9, 8], [0, 70]]);
/// assert_eq!(score.winner, Winner::Side(Side::A));
/// ```
#[must_use]
pub fn score_lanes(powers: [[u32; 2]; LANE_COUNT]) -> MatchScore {
    let mut lanes = [LaneResult::Tie; LANE_COUNT];
    for (result, [a, b]) in lanes.iter_mut().zip(powers) {
        *result = match a.cmp(&b) {
            std::cmp::Ordering::Greater => LaneResult::Won(Side::A),
            std::cmp::Ordering::Less => LaneResult::Won(Side::B),
            std::cmp::Ordering::Equal => LaneResult::Tie,
        };
    }

    let mut score = MatchScore {
        lanes,
        powers,
        winner: Winner::Tie,
    };
    let majority = LANE_COUNT / 2 + 1;
    for side in Side::BOTH {
        if score.lanes_won(side) >= majority {
            score.winner = Winner::Side(side);
        }
    }
    score
}

/// Rating ("aura") change for a decisive result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRule {
    /// Added to the winner.
    pub win_gain: u32,
    /// Taken from the loser, stopping at zero.
    pub loss_penalty: u32,
}

impl Default for RatingRule {
    fn default() -> Self {
        Self {
            win_gain: 50,
            loss_penalty: 40,
        }
    }
}

impl RatingRule {
    /// New `(winner, loser)` ratings.
    #[must_use]
    pub const fn apply(&self, winner: u32, loser: u32) -> (u32, u32) {
        (
            winner.saturating_add(self.win_gain),
            loser.saturating_sub(self.loss_penalty),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_lanes_win() {
        let score = score_lanes([[1, 0], [0, 100], [5, 4]]);
        assert_eq!(score.winner, Winner::Side(Side::A));
        assert_eq!(score.lanes_won(Side::A), 2);
        assert_eq!(score.total_power(Side::B), 104);
    }

    #[test]
    fn test_one_win_and_two_ties_is_tie() {
        let score = score_lanes([[1, 0], [4, 4], [0, 0]]);
        assert_eq!(score.winner, Winner::Tie);
    }

    #[test]
    fn test_split_is_tie() {
        let score = score_lanes([[9, 1], [1, 9], [3, 3]]);
        assert_eq!(score.lanes, [LaneResult::Won(Side::A), LaneResult::Won(Side::B), LaneResult::Tie]);
        assert_eq!(score.winner, Winner::Tie);
    }

    #[test]
    fn test_rating_floor() {
        let rule = RatingRule::default();
        assert_eq!(rule.apply(1000, 1000), (1050, 960));
        assert_eq!(rule.apply(0, 25), (50, 0));
    }
}
