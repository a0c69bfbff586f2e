//! Replay recording and verification.
//!
//! A replay stores the match seed, both deck snapshots and every resolved
//! turn's action batches. Because turn resolution is deterministic, that is
//! enough to rebuild any match state exactly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ability::AbilityBook;
use crate::action::Action;
use crate::card::Card;
use crate::deck::validate_deck;
use crate::error::{GameError, Result};
use crate::state::{GameState, Side};
use crate::turn::EngineConfig;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Both seats' batches for one resolved turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayTurn {
    /// Turn number.
    pub turn: u8,
    /// Seat A's actions.
    pub side_a: Vec<Action>,
    /// Seat B's actions.
    pub side_b: Vec<Action>,
}

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReplay {
    /// Replay format version.
    pub version: u32,
    /// Match seed.
    pub seed: u64,
    /// Engine settings.
    pub config: EngineConfig,
    /// Deck snapshots, seat A first.
    pub decks: [Vec<Card>; 2],
    /// Resolved turns, in order.
    pub turns: Vec<ReplayTurn>,
    /// Hash of the state when recording stopped.
    pub final_hash: u64,
}

impl MatchReplay {
    /// Start recording a match.
    #[must_use]
    pub fn new(seed: u64, config: EngineConfig, decks: [Vec<Card>; 2]) -> Self {
        Self {
            version: REPLAY_VERSION,
            seed,
            config,
            decks,
            turns: Vec::new(),
            final_hash: 0,
        }
    }

    /// Record a resolved turn.
    pub fn record_turn(&mut self, turn: u8, side_a: Vec<Action>, side_b: Vec<Action>) {
        self.turns.push(ReplayTurn {
            turn,
            side_a,
            side_b,
        });
    }

    /// Stamp the hash of the last recorded state.
    pub fn finalize(&mut self, final_hash: u64) {
        self.final_hash = final_hash;
    }

    /// Number of recorded turns.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Rebuild the match by re-running every recorded turn.
    ///
    /// # Errors
    ///
    /// Returns an error if a deck snapshot no longer validates or a recorded
    /// batch is rejected.
    pub fn run(&self, book: &AbilityBook) -> Result<GameState> {
        let [a, b] = self.decks.clone();
        let decks = [validate_deck(a)?, validate_deck(b)?];
        let mut state = GameState::new(self.seed, decks, book, self.config);

        for turn in &self.turns {
            if state.turn() != turn.turn {
                return Err(GameError::InvalidState(format!(
                    "replay turn {} recorded while match was on turn {}",
                    turn.turn,
                    state.turn()
                )));
            }
            state.submit(Side::A, turn.side_a.clone())?;
            if state.submit(Side::B, turn.side_b.clone())?.is_none() {
                return Err(GameError::InvalidState(format!(
                    "turn {} did not resolve",
                    turn.turn
                )));
            }
        }
        Ok(state)
    }

    /// Re-run the replay and compare against the recorded final hash.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ReplayDiverged`] on a hash mismatch, or any
    /// error from [`MatchReplay::run`].
    pub fn verify(&self, book: &AbilityBook) -> Result<GameState> {
        let state = self.run(book)?;
        let actual = state.state_hash();
        if actual != self.final_hash {
            return Err(GameError::ReplayDiverged {
                turn: state.turn(),
                expected: self.final_hash,
                actual,
            });
        }
        Ok(state)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// file was written by an incompatible version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }

        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardCategory, Rarity};
    use crate::cpu::CpuPolicy;

    fn cards(prefix: &str) -> Vec<Card> {
        let names = ["Ember Scout", "Banner Bearer", "Sniper", "Dice Roller", "Pickpocket", "Courier"];
        (0..12)
            .map(|i| {
                let category = if i < 6 { CardCategory::Core } else { CardCategory::Filler };
                Card::new(format!("{prefix}{i}"), names[i % names.len()], category, Rarity::Rare, 10 + i as u32)
            })
            .collect()
    }

    fn recorded_match() -> (MatchReplay, GameState) {
        let book = AbilityBook::builtin().unwrap();
        let decks = [cards("a"), cards("b")];
        let mut replay = MatchReplay::new(99, EngineConfig::default(), decks.clone());
        let [a, b] = decks;
        let mut state = GameState::new(
            99,
            [validate_deck(a).unwrap(), validate_deck(b).unwrap()],
            &book,
            EngineConfig::default(),
        );
        let cpu = CpuPolicy::default();
        while !state.is_finished() {
            let turn = state.turn();
            let xa = cpu.choose(&state, Side::A);
            let xb = cpu.choose(&state, Side::B);
            state.submit(Side::B, xb.clone()).unwrap();
            state.submit(Side::A, xa.clone()).unwrap();
            replay.record_turn(turn, xa, xb);
        }
        replay.finalize(state.state_hash());
        (replay, state)
    }

    #[test]
    fn test_replay_reproduces_match() {
        let (replay, original) = recorded_match();
        let book = AbilityBook::builtin().unwrap();
        let rebuilt = replay.verify(&book).unwrap();
        assert_eq!(rebuilt, original);
        assert_eq!(replay.turn_count(), 6);
    }

    #[test]
    fn test_tampered_replay_diverges() {
        let (mut replay, _) = recorded_match();
        replay.turns[0].side_a = vec![];
        replay.turns[0].side_b = vec![];
        let book = AbilityBook::builtin().unwrap();
        assert!(matches!(
            replay.verify(&book),
            Err(GameError::ReplayDiverged { .. }) | Err(GameError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (replay, _) = recorded_match();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.replay");
        replay.save(&path).unwrap();
        let loaded = MatchReplay::load(&path).unwrap();
        assert_eq!(loaded, replay);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let (mut replay, _) = recorded_match();
        replay.version = REPLAY_VERSION + 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.replay");
        replay.save(&path).unwrap();
        assert!(MatchReplay::load(&path).is_err());
    }
}
