//! Balance testing utilities.
//!
//! Runs many CPU-vs-CPU matches to check that no deck or seat wins far more
//! often than it should.

use serde::{Deserialize, Serialize};

use clash_core::ability::AbilityBook;
use clash_core::deck::ValidatedDeck;
use clash_core::result::Winner;
use clash_core::state::Side;
use clash_core::turn::EngineConfig;

use crate::determinism::play_cpu_match;

/// Result of one simulated match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Seed the match ran with.
    pub seed: u64,
    /// Verdict.
    pub winner: Winner,
    /// Lanes won by seat A.
    pub lanes_a: usize,
    /// Lanes won by seat B.
    pub lanes_b: usize,
    /// Final board power of seat A.
    pub power_a: u32,
    /// Final board power of seat B.
    pub power_b: u32,
}

/// Statistics for a set of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    /// Total matches run.
    pub total_matches: u32,
    /// Wins for seat A.
    pub wins_a: u32,
    /// Wins for seat B.
    pub wins_b: u32,
    /// Ties.
    pub ties: u32,
    /// Average final power margin (A minus B).
    pub avg_power_margin: f64,
}

impl MatchStats {
    /// Aggregate individual results.
    #[must_use]
    pub fn from_results(results: &[MatchResult]) -> Self {
        let mut stats = Self::default();
        let mut margin_sum = 0i64;
        for r in results {
            stats.total_matches += 1;
            match r.winner {
                Winner::Side(Side::A) => stats.wins_a += 1,
                Winner::Side(Side::B) => stats.wins_b += 1,
                Winner::Tie => stats.ties += 1,
            }
            margin_sum += i64::from(r.power_a) - i64::from(r.power_b);
        }
        if stats.total_matches > 0 {
            stats.avg_power_margin = margin_sum as f64 / f64::from(stats.total_matches);
        }
        stats
    }

    /// Win rate for seat A (0.0 to 1.0).
    pub fn win_rate_a(&self) -> f64 {
        if self.total_matches == 0 {
            return 0.5;
        }
        f64::from(self.wins_a) / f64::from(self.total_matches)
    }

    /// Win rate for seat B (0.0 to 1.0).
    pub fn win_rate_b(&self) -> f64 {
        if self.total_matches == 0 {
            return 0.5;
        }
        f64::from(self.wins_b) / f64::from(self.total_matches)
    }

    /// Tie rate (0.0 to 1.0).
    pub fn tie_rate(&self) -> f64 {
        if self.total_matches == 0 {
            return 0.0;
        }
        f64::from(self.ties) / f64::from(self.total_matches)
    }

    /// Check if the matchup is balanced (seat A's share of decisive games
    /// within the given range).
    pub fn is_balanced(&self, min_rate: f64, max_rate: f64) -> bool {
        let decisive = self.wins_a + self.wins_b;
        if decisive == 0 {
            return true;
        }
        let rate = f64::from(self.wins_a) / f64::from(decisive);
        rate >= min_rate && rate <= max_rate
    }
}

/// Run one CPU-vs-CPU match and summarize it.
#[must_use]
pub fn run_match(
    seed: u64,
    decks: [ValidatedDeck; 2],
    book: &AbilityBook,
    config: EngineConfig,
) -> MatchResult {
    let state = play_cpu_match(seed, decks, book, config, |_| Side::A);
    let (winner, lanes_a, lanes_b) = state.score().map_or((Winner::Tie, 0, 0), |score| {
        (
            score.winner,
            score.lanes_won(Side::A),
            score.lanes_won(Side::B),
        )
    });
    MatchResult {
        seed,
        winner,
        lanes_a,
        lanes_b,
        power_a: state.total_power(Side::A),
        power_b: state.total_power(Side::B),
    }
}

/// Run `count` matches with seeds `seed_start..seed_start + count`.
pub fn run_matches<F>(
    count: u32,
    seed_start: u64,
    decks: F,
    book: &AbilityBook,
    config: EngineConfig,
) -> MatchStats
where
    F: Fn() -> [ValidatedDeck; 2],
{
    let results: Vec<MatchResult> = (0..u64::from(count))
        .map(|i| run_match(seed_start + i, decks(), book, config))
        .collect();
    let stats = MatchStats::from_results(&results);
    tracing::info!(
        matches = stats.total_matches,
        wins_a = stats.wins_a,
        wins_b = stats.wins_b,
        ties = stats.ties,
        "balance run complete"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_stats_rates() {
        let results = vec![
            MatchResult {
                seed: 0,
                winner: Winner::Side(Side::A),
                lanes_a: 2,
                lanes_b: 1,
                power_a: 50,
                power_b: 30,
            },
            MatchResult {
                seed: 1,
                winner: Winner::Tie,
                lanes_a: 1,
                lanes_b: 1,
                power_a: 30,
                power_b: 30,
            },
        ];
        let stats = MatchStats::from_results(&results);
        assert_eq!(stats.total_matches, 2);
        assert!((stats.win_rate_a() - 0.5).abs() < f64::EPSILON);
        assert!((stats.tie_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.avg_power_margin - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mirror_match_is_roughly_even() {
        let book = AbilityBook::builtin().unwrap();
        let stats = run_matches(
            60,
            1000,
            || [fixtures::ability_deck("a"), fixtures::ability_deck("b")],
            &book,
            EngineConfig::default(),
        );
        assert_eq!(stats.total_matches, 60);
        assert!(stats.is_balanced(0.15, 0.85), "{stats:?}");
    }

    #[test]
    fn test_stronger_deck_wins_more() {
        let book = AbilityBook::builtin().unwrap();
        let stats = run_matches(
            30,
            0,
            || [fixtures::plain_deck("a", 40), fixtures::plain_deck("b", 5)],
            &book,
            EngineConfig::default(),
        );
        assert!(stats.wins_a > stats.wins_b, "{stats:?}");
    }
}
