//! Determinism testing utilities.
//!
//! Provides a harness for verifying that match resolution produces
//! identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! A match must resolve the same way on every server and in every replay.
//! Sources of non-determinism include:
//!
//! - **Submission order**: the two seats may confirm in either order.
//!   Resolution must not care which one arrived first.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Match state never iterates a hash map.
//!
//! - **System randomness**: every roll comes from the match seed via
//!   `clash_core::rng::MatchRng`.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual effects and actions
//! 2. **Property tests**: random decks and batches still resolve identically
//! 3. **Thread tests**: racing submissions resolve a turn exactly once

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use clash_core::ability::AbilityBook;
use clash_core::action::Action;
use clash_core::cpu::CpuPolicy;
use clash_core::deck::ValidatedDeck;
use clash_core::state::{GameState, Side};
use clash_core::turn::EngineConfig;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps run.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Match resolution is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use clash_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Play one turn with fixed batches, submitting `first` before the other seat.
///
/// Returns `true` if the turn resolved. Rejected batches are replaced by an
/// empty batch so the turn still resolves.
pub fn play_turn(state: &mut GameState, first: Side, batches: [&[Action]; 2]) -> bool {
    if state.is_finished() {
        return false;
    }
    let mut resolved = false;
    for side in [first, first.opponent()] {
        let batch = batches[side.index()].to_vec();
        let outcome = match state.submit(side, batch) {
            Ok(outcome) => outcome,
            Err(_) => state.submit(side, Vec::new()).ok().flatten(),
        };
        resolved |= outcome.is_some();
    }
    resolved
}

/// Play a CPU-vs-CPU match to the end and return the final state.
///
/// `first_for_turn` decides which seat submits first on each turn, so
/// callers can check that submission order does not matter.
pub fn play_cpu_match<F>(
    seed: u64,
    decks: [ValidatedDeck; 2],
    book: &AbilityBook,
    config: EngineConfig,
    first_for_turn: F,
) -> GameState
where
    F: Fn(u8) -> Side,
{
    let policy = CpuPolicy::default();
    let mut state = GameState::new(seed, decks, book, config);
    while !state.is_finished() {
        let a = policy.choose(&state, Side::A);
        let b = policy.choose(&state, Side::B);
        let first = first_for_turn(state.turn());
        if !play_turn(&mut state, first, [a.as_slice(), b.as_slice()]) {
            break;
        }
    }
    state
}

/// Compute a hash for any hashable value.
///
/// Useful for comparing complex state structures.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for match testing.
///
/// These strategies generate random but reproducible decks and batches for
/// property-based testing of deck rules and turn resolution.
pub mod strategies {
    use clash_core::action::Action;
    use clash_core::card::{Card, CardCategory, Foil, Rarity};
    use clash_core::state::LANE_COUNT;
    use proptest::prelude::*;

    use crate::fixtures::ABILITY_NAMES;

    /// Any card category.
    pub fn arb_category() -> impl Strategy<Value = CardCategory> {
        prop_oneof![
            Just(CardCategory::Core),
            Just(CardCategory::Signature),
            Just(CardCategory::Filler),
            Just(CardCategory::Guest),
        ]
    }

    /// Any rarity.
    pub fn arb_rarity() -> impl Strategy<Value = Rarity> {
        prop::sample::select(Rarity::ALL.to_vec())
    }

    /// Any foil.
    pub fn arb_foil() -> impl Strategy<Value = Foil> {
        prop_oneof![Just(Foil::None), Just(Foil::Standard), Just(Foil::Prize)]
    }

    /// Card names: mostly catalog names, sometimes unknown ones.
    pub fn arb_name() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => prop::sample::select(ABILITY_NAMES.to_vec()).prop_map(str::to_string),
            1 => "[A-Z][a-z]{3,8}",
        ]
    }

    /// Any card with the given category.
    pub fn arb_card_of(category: CardCategory) -> impl Strategy<Value = Card> {
        (arb_name(), arb_rarity(), arb_foil(), 0u32..120u32).prop_map(
            move |(name, rarity, foil, power)| {
                Card::new(format!("{name}-{power}"), name, category, rarity, power).with_foil(foil)
            },
        )
    }

    /// Any card.
    pub fn arb_card() -> impl Strategy<Value = Card> {
        arb_category().prop_flat_map(arb_card_of)
    }

    /// A deck that satisfies every composition rule.
    pub fn arb_valid_deck() -> impl Strategy<Value = Vec<Card>> {
        (5usize..=12usize)
            .prop_flat_map(|strong| {
                let strong_cards = proptest::collection::vec(
                    prop_oneof![
                        arb_card_of(CardCategory::Core),
                        arb_card_of(CardCategory::Signature),
                    ],
                    strong,
                );
                let weak_cards = proptest::collection::vec(
                    prop_oneof![
                        arb_card_of(CardCategory::Filler),
                        arb_card_of(CardCategory::Guest),
                    ],
                    12 - strong,
                );
                (strong_cards, weak_cards)
            })
            .prop_flat_map(|(mut strong, weak)| {
                strong.extend(weak);
                Just(strong).prop_shuffle()
            })
    }

    /// Any card list (usually invalid as a deck).
    pub fn arb_card_list(max_len: usize) -> impl Strategy<Value = Vec<Card>> {
        proptest::collection::vec(arb_card(), 0..max_len)
    }

    /// Generate one action with small indices.
    pub fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            4 => (0usize..4, 0usize..LANE_COUNT)
                .prop_map(|(hand_index, lane)| Action::Play { hand_index, lane }),
            1 => (0usize..4).prop_map(|hand_index| Action::SacrificeHand { hand_index }),
            1 => (0usize..LANE_COUNT, 0usize..3, 0usize..3).prop_map(
                |(lane, card_index, target_index)| Action::SacrificeLane {
                    lane,
                    card_index,
                    target_index,
                }
            ),
        ]
    }

    /// Generate a batch of actions.
    pub fn arb_batch(max_len: usize) -> impl Strategy<Value = Vec<Action>> {
        proptest::collection::vec(arb_action(), 0..max_len)
    }

    /// Generate a whole match worth of batches for both seats.
    pub fn arb_match_script() -> impl Strategy<Value = Vec<(Vec<Action>, Vec<Action>)>> {
        proptest::collection::vec((arb_batch(4), arb_batch(4)), 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_detects_nondeterminism() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_cpu_match_determinism() {
        let book = AbilityBook::builtin().unwrap();
        let result = verify_determinism(
            3,
            1,
            || {
                GameState::new(
                    5,
                    [fixtures::ability_deck("a"), fixtures::ability_deck("b")],
                    &book,
                    EngineConfig::default(),
                )
            },
            |state| {
                let policy = CpuPolicy::default();
                while !state.is_finished() {
                    let a = policy.choose(state, Side::A);
                    let b = policy.choose(state, Side::B);
                    play_turn(state, Side::A, [a.as_slice(), b.as_slice()]);
                }
            },
            GameState::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_play_turn_tolerates_rejected_batch() {
        let book = AbilityBook::builtin().unwrap();
        let mut state = GameState::new(
            1,
            [fixtures::plain_deck("a", 5), fixtures::plain_deck("b", 5)],
            &book,
            EngineConfig::default(),
        );
        let bad = [Action::Play {
            hand_index: 40,
            lane: 0,
        }];
        assert!(play_turn(&mut state, Side::B, [&bad[..], &[]]));
        assert_eq!(state.turn(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_generated_decks_validate(cards in strategies::arb_valid_deck()) {
            prop_assert!(clash_core::deck::validate_deck(cards).is_ok());
        }
    }
}
