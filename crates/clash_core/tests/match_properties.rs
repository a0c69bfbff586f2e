//! Property tests for the match engine.
//!
//! These run whole matches from random decks and random action scripts and
//! check the rules that must hold no matter what players submit.

use clash_core::prelude::*;
use clash_core::replay::MatchReplay;
use clash_core::result::score_lanes;
use clash_test_utils::determinism::{play_turn, strategies};
use clash_test_utils::fixtures;
use proptest::prelude::*;

fn book() -> AbilityBook {
    AbilityBook::builtin().unwrap()
}

fn decks(a: Vec<Card>, b: Vec<Card>) -> [ValidatedDeck; 2] {
    [validate_deck(a).unwrap(), validate_deck(b).unwrap()]
}

/// Play a scripted match, submitting `first` before its opponent each turn.
fn run_script(
    seed: u64,
    decks: [ValidatedDeck; 2],
    script: &[(Vec<Action>, Vec<Action>)],
    first: Side,
) -> GameState {
    let book = book();
    let mut state = GameState::new(seed, decks, &book, EngineConfig::default());
    for (a, b) in script {
        if !play_turn(&mut state, first, [a.as_slice(), b.as_slice()]) {
            break;
        }
        state.check_conservation().unwrap();
    }
    state
}

// =============================================================================
// Deck rules
// =============================================================================

mod deck_rules {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_validation_matches_composition(cards in strategies::arb_card_list(16)) {
            let strong = cards.iter().filter(|c| c.category.is_strong()).count();
            let weak = cards.len() - strong;
            let expected_ok = cards.len() == DECK_SIZE && strong >= 5 && weak <= 7;
            prop_assert_eq!(validate_deck(cards).is_ok(), expected_ok);
        }

        #[test]
        fn prop_weak_cards_enter_at_half_power(card in strategies::arb_card()) {
            let expected = if card.category.is_weak() {
                card.base_power / 2
            } else {
                card.base_power
            };
            prop_assert_eq!(card.effective_power(), expected);
        }
    }

    #[test]
    fn test_wrong_size_reported_first() {
        let mut cards = fixtures::plain_cards("p", 10);
        cards.pop();
        let err = validate_deck(cards).unwrap_err();
        assert!(matches!(
            err,
            GameError::DeckInvalid(DeckRule::CardCount { found: 11 })
        ));
    }
}

// =============================================================================
// Scoring
// =============================================================================

mod scoring {
    use super::*;

    proptest! {
        #[test]
        fn prop_winner_is_symmetric(powers in prop::array::uniform3((0u32..50, 0u32..50))) {
            let forward = powers.map(|(a, b)| [a, b]);
            let mirrored = powers.map(|(a, b)| [b, a]);
            let left = score_lanes(forward).winner;
            let right = score_lanes(mirrored).winner;
            let expected = match left {
                Winner::Side(side) => Winner::Side(side.opponent()),
                Winner::Tie => Winner::Tie,
            };
            prop_assert_eq!(right, expected);
        }

        #[test]
        fn prop_winner_holds_majority(powers in prop::array::uniform3((0u32..50, 0u32..50))) {
            let score = score_lanes(powers.map(|(a, b)| [a, b]));
            if let Some(side) = score.winner.side() {
                prop_assert!(score.lanes_won(side) >= 2);
                prop_assert!(score.lanes_won(side) > score.lanes_won(side.opponent()));
            } else {
                prop_assert!(score.lanes_won(Side::A) < 2 && score.lanes_won(Side::B) < 2);
            }
        }
    }
}

// =============================================================================
// Whole matches
// =============================================================================

mod matches {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_matches_always_finish_on_turn_six(
            seed in any::<u64>(),
            a in strategies::arb_valid_deck(),
            b in strategies::arb_valid_deck(),
            script in strategies::arb_match_script(),
        ) {
            let state = run_script(seed, decks(a, b), &script, Side::A);
            prop_assert!(state.is_finished());
            prop_assert_eq!(state.resolved_turns(), FINAL_TURN);
            let score = state.score().unwrap();
            prop_assert_eq!(score.winner, score_lanes(score.powers).winner);
        }

        #[test]
        fn prop_submission_order_does_not_matter(
            seed in any::<u64>(),
            a in strategies::arb_valid_deck(),
            b in strategies::arb_valid_deck(),
            script in strategies::arb_match_script(),
        ) {
            let a_first = run_script(seed, decks(a.clone(), b.clone()), &script, Side::A);
            let b_first = run_script(seed, decks(a, b), &script, Side::B);
            prop_assert_eq!(a_first.state_hash(), b_first.state_hash());
            prop_assert_eq!(a_first, b_first);
        }

        #[test]
        fn prop_cached_lane_power_matches_cards(
            seed in any::<u64>(),
            a in strategies::arb_valid_deck(),
            b in strategies::arb_valid_deck(),
            script in strategies::arb_match_script(),
        ) {
            let state = run_script(seed, decks(a, b), &script, Side::A);
            for (lane, powers) in state.lane_powers().iter().enumerate() {
                for side in Side::BOTH {
                    prop_assert_eq!(powers[side.index()], state.live_lane_power(lane, side));
                }
            }
        }

        #[test]
        fn prop_recorded_scripts_replay_exactly(
            seed in any::<u64>(),
            a in strategies::arb_valid_deck(),
            b in strategies::arb_valid_deck(),
            script in strategies::arb_match_script(),
        ) {
            let book = book();
            let mut replay = MatchReplay::new(seed, EngineConfig::default(), [a.clone(), b.clone()]);
            let mut state = GameState::new(seed, decks(a, b), &book, EngineConfig::default());
            for (xa, xb) in &script {
                let turn = state.turn();
                // Rejected batches are recorded as the empty batch actually played.
                let xa = if state.submit(Side::A, xa.clone()).is_ok() {
                    xa.clone()
                } else {
                    state.submit(Side::A, Vec::new()).unwrap();
                    Vec::new()
                };
                let xb = if state.submit(Side::B, xb.clone()).is_ok() {
                    xb.clone()
                } else {
                    state.submit(Side::B, Vec::new()).unwrap();
                    Vec::new()
                };
                replay.record_turn(turn, xa, xb);
            }
            replay.finalize(state.state_hash());
            let rebuilt = replay.verify(&book).unwrap();
            prop_assert_eq!(rebuilt, state);
        }
    }

    #[test]
    fn test_finished_match_rejects_submissions() {
        let state_decks = [fixtures::ability_deck("a"), fixtures::ability_deck("b")];
        let mut state = run_script(3, state_decks, &vec![(vec![], vec![]); 6], Side::A);
        assert!(state.is_finished());
        assert!(matches!(
            state.submit(Side::A, vec![]),
            Err(GameError::MatchOver)
        ));
    }

    #[test]
    fn test_signature_decks_keep_conservation() {
        let book = book();
        let decks = [fixtures::signature_deck("a"), fixtures::signature_deck("b")];
        let state = clash_test_utils::determinism::play_cpu_match(
            17,
            decks,
            &book,
            EngineConfig::default(),
            |turn| if turn % 2 == 0 { Side::A } else { Side::B },
        );
        assert!(state.is_finished());
        state.check_conservation().unwrap();
    }
}
