//! Batch CPU-vs-CPU simulation for balance testing.
//!
//! Matches run in parallel with rayon. Each match is fully determined by its
//! seed: the seed drives the engine and, when no fixed decks are given, the
//! random decks both sides play.

use std::path::Path;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clash_core::ability::AbilityBook;
use clash_core::card::{Card, CardCategory, Foil, Rarity};
use clash_core::cpu::CpuPolicy;
use clash_core::deck::{validate_deck, DECK_SIZE, MIN_STRONG};
use clash_core::result::Winner;
use clash_core::state::{GameState, Side};
use clash_core::turn::EngineConfig;

use crate::{Result, ToolError};

/// Configuration for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Matches to play.
    pub matches: u32,
    /// Seed of the first match; match `i` uses `seed_start + i`.
    pub seed_start: u64,
    /// Worker threads (0 = rayon default).
    pub threads: usize,
    /// Engine settings.
    pub engine: EngineConfig,
    /// Fixed decks for seats A and B. Random per match when absent.
    pub decks: Option<[Vec<Card>; 2]>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            matches: 100,
            seed_start: 0,
            threads: 0,
            engine: EngineConfig::default(),
            decks: None,
        }
    }
}

/// One finished simulated match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimMatch {
    /// Seed used.
    pub seed: u64,
    /// Verdict.
    pub winner: Winner,
    /// Lanes won per seat.
    pub lanes_won: [usize; 2],
    /// Board power per seat at the end.
    pub power: [u32; 2],
    /// Turns resolved.
    pub turns: u8,
    /// Final state hash, for determinism checks.
    pub final_hash: u64,
}

/// A match that could not be played.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimError {
    /// Seed used.
    pub seed: u64,
    /// What went wrong.
    pub message: String,
}

/// Aggregate statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimSummary {
    /// Matches completed.
    pub matches: u32,
    /// Seat A wins.
    pub wins_a: u32,
    /// Seat B wins.
    pub wins_b: u32,
    /// Ties.
    pub ties: u32,
    /// Mean absolute difference in final board power.
    pub avg_power_margin: f64,
    /// Mean turns per match.
    pub avg_turns: f64,
}

impl SimSummary {
    /// Summarize completed matches.
    #[must_use]
    pub fn from_matches(matches: &[SimMatch]) -> Self {
        let mut summary = Self {
            matches: u32::try_from(matches.len()).unwrap_or(u32::MAX),
            ..Self::default()
        };
        if matches.is_empty() {
            return summary;
        }
        let mut margin = 0u64;
        let mut turns = 0u64;
        for m in matches {
            match m.winner {
                Winner::Side(Side::A) => summary.wins_a += 1,
                Winner::Side(Side::B) => summary.wins_b += 1,
                Winner::Tie => summary.ties += 1,
            }
            margin += u64::from(m.power[0].abs_diff(m.power[1]));
            turns += u64::from(m.turns);
        }
        let n = matches.len() as f64;
        summary.avg_power_margin = margin as f64 / n;
        summary.avg_turns = turns as f64 / n;
        summary
    }

    fn rate(&self, count: u32) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            f64::from(count) / f64::from(self.matches)
        }
    }

    /// Seat A win rate.
    #[must_use]
    pub fn win_rate_a(&self) -> f64 {
        self.rate(self.wins_a)
    }

    /// Seat B win rate.
    #[must_use]
    pub fn win_rate_b(&self) -> f64 {
        self.rate(self.wins_b)
    }

    /// Tie rate.
    #[must_use]
    pub fn tie_rate(&self) -> f64 {
        self.rate(self.ties)
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimResults {
    /// Aggregate summary.
    pub summary: SimSummary,
    /// Individual matches, in seed order.
    pub matches: Vec<SimMatch>,
    /// Matches that failed to set up.
    pub errors: Vec<SimError>,
    /// Wall time.
    pub duration_seconds: f64,
}

impl SimResults {
    /// Save results as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io = |source| ToolError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| io(std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(io)
    }
}

/// A random legal deck. Names are drawn from `book` so most cards carry an
/// ability; the rest are plain.
pub fn random_deck<R: Rng>(rng: &mut R, book: &AbilityBook, prefix: &str) -> Vec<Card> {
    let names: Vec<&str> = book.names().collect();
    let strong_count = rng.gen_range(MIN_STRONG..=DECK_SIZE);
    (0..DECK_SIZE)
        .map(|i| {
            let category = if i < strong_count {
                *[CardCategory::Core, CardCategory::Signature]
                    .choose(rng)
                    .unwrap_or(&CardCategory::Core)
            } else {
                *[CardCategory::Filler, CardCategory::Guest]
                    .choose(rng)
                    .unwrap_or(&CardCategory::Filler)
            };
            let name = if rng.gen_bool(0.75) {
                names.choose(rng).copied().unwrap_or("Recruit")
            } else {
                "Recruit"
            };
            let rarity = *Rarity::ALL.choose(rng).unwrap_or(&Rarity::Common);
            let foil = *[Foil::None, Foil::None, Foil::Standard, Foil::Prize]
                .choose(rng)
                .unwrap_or(&Foil::None);
            Card::new(
                format!("{prefix}-{i}"),
                name,
                category,
                rarity,
                rng.gen_range(10..=40),
            )
            .with_foil(foil)
        })
        .collect()
}

/// Play one CPU-vs-CPU match. A rejected CPU batch is replaced by an empty one.
///
/// # Errors
///
/// Returns an error if a deck is illegal.
pub fn run_one(
    seed: u64,
    decks: [Vec<Card>; 2],
    book: &AbilityBook,
    engine: EngineConfig,
) -> Result<SimMatch> {
    let [a, b] = decks;
    let decks = [validate_deck(a)?, validate_deck(b)?];
    let policy = CpuPolicy::default();
    let mut state = GameState::new(seed, decks, book, engine);

    while !state.is_finished() {
        for side in Side::BOTH {
            let actions = policy.choose(&state, side);
            if state.submit(side, actions).is_err() {
                state.submit(side, Vec::new())?;
            }
        }
    }

    let score = state
        .score()
        .cloned()
        .ok_or_else(|| clash_core::error::GameError::InvalidState("finished without a score".into()))?;
    Ok(SimMatch {
        seed,
        winner: score.winner,
        lanes_won: [score.lanes_won(Side::A), score.lanes_won(Side::B)],
        power: [state.total_power(Side::A), state.total_power(Side::B)],
        turns: state.resolved_turns(),
        final_hash: state.state_hash(),
    })
}

fn decks_for(seed: u64, config: &SimConfig, book: &AbilityBook) -> [Vec<Card>; 2] {
    match &config.decks {
        Some(decks) => decks.clone(),
        None => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            [
                random_deck(&mut rng, book, "a"),
                random_deck(&mut rng, book, "b"),
            ]
        }
    }
}

/// Run a batch of matches.
pub fn run_simulation(config: &SimConfig, book: &AbilityBook) -> SimResults {
    let start = Instant::now();
    info!(
        matches = config.matches,
        seed_start = config.seed_start,
        fixed_decks = config.decks.is_some(),
        "Starting simulation"
    );

    let play = || -> Vec<std::result::Result<SimMatch, SimError>> {
        (0..config.matches)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));
                run_one(seed, decks_for(seed, config, book), book, config.engine).map_err(|e| {
                    warn!(seed, error = %e, "match failed");
                    SimError {
                        seed,
                        message: e.to_string(),
                    }
                })
            })
            .collect()
    };

    let outcomes = if config.threads > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
        {
            Ok(pool) => pool.install(play),
            Err(e) => {
                warn!(error = %e, "Could not build thread pool, using the global one");
                play()
            }
        }
    } else {
        play()
    };

    let (matches, errors): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|r| r.is_ok());
    let matches: Vec<SimMatch> = matches.into_iter().filter_map(|r| r.ok()).collect();
    let errors: Vec<SimError> = errors.into_iter().filter_map(|r| r.err()).collect();
    let summary = SimSummary::from_matches(&matches);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        completed = matches.len(),
        failed = errors.len(),
        win_rate_a = summary.win_rate_a(),
        tie_rate = summary.tie_rate(),
        "Simulation complete in {duration_seconds:.1}s"
    );

    SimResults {
        summary,
        matches,
        errors,
        duration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clash_test_utils::fixtures;

    fn book() -> AbilityBook {
        AbilityBook::builtin().unwrap()
    }

    #[test]
    fn test_random_decks_are_legal() {
        let book = book();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            assert!(validate_deck(random_deck(&mut rng, &book, "x")).is_ok());
        }
    }

    #[test]
    fn test_batches_are_deterministic() {
        let book = book();
        let config = SimConfig {
            matches: 16,
            seed_start: 100,
            ..SimConfig::default()
        };
        let first = run_simulation(&config, &book);
        let second = run_simulation(&config, &book);
        assert!(first.errors.is_empty());
        assert_eq!(first.matches, second.matches);
        assert!(first.matches.iter().all(|m| m.turns == 6));
        assert_eq!(first.summary.matches, 16);
    }

    #[test]
    fn test_stronger_fixed_deck_dominates() {
        let config = SimConfig {
            matches: 12,
            threads: 2,
            decks: Some([
                fixtures::plain_cards("strong", 40),
                fixtures::plain_cards("weak", 5),
            ]),
            ..SimConfig::default()
        };
        let results = run_simulation(&config, &book());
        assert_eq!(results.summary.matches, 12);
        assert!(results.summary.wins_a > results.summary.wins_b);
        assert!(results.summary.win_rate_a() > 0.5);
    }

    #[test]
    fn test_illegal_fixed_deck_reported_per_match() {
        let mut short = fixtures::plain_cards("s", 10);
        short.pop();
        let config = SimConfig {
            matches: 3,
            decks: Some([short, fixtures::plain_cards("b", 10)]),
            ..SimConfig::default()
        };
        let results = run_simulation(&config, &book());
        assert!(results.matches.is_empty());
        assert_eq!(results.errors.len(), 3);
        assert_eq!(results.summary, SimSummary::default());
    }

    #[test]
    fn test_summary_rates() {
        let m = |winner| SimMatch {
            seed: 0,
            winner,
            lanes_won: [0, 0],
            power: [30, 10],
            turns: 6,
            final_hash: 0,
        };
        let summary = SimSummary::from_matches(&[
            m(Winner::Side(Side::A)),
            m(Winner::Side(Side::A)),
            m(Winner::Side(Side::B)),
            m(Winner::Tie),
        ]);
        assert!((summary.win_rate_a() - 0.5).abs() < f64::EPSILON);
        assert!((summary.tie_rate() - 0.25).abs() < f64::EPSILON);
        assert!((summary.avg_power_margin - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/sim.json");
        let results = run_simulation(
            &SimConfig {
                matches: 2,
                ..SimConfig::default()
            },
            &book(),
        );
        results.save(&path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"wins_a\""));
    }
}
