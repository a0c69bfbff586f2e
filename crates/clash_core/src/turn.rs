//! Match setup and simultaneous turn resolution.
//!
//! Both seats submit a batch of [`Action`]s for the current turn. Nothing
//! happens until the second batch arrives; that submission resolves the
//! turn, in this order:
//!
//! 1. Each seat's actions are applied in submission order (seat A's batch,
//!    then seat B's; they touch disjoint zones so the order between seats
//!    does not matter). Stale references are skipped and logged.
//! 2. Cards placed this turn are collected with their lane and seat.
//! 3. One fairness bit per lane picks which seat's new cards go first there.
//! 4. Immediate abilities fire in (lane, fairness, play order) order.
//! 5. Continuous abilities of every card still in play fire once.
//! 6. Lane power caches are recomputed.
//! 7. The match ends after turn [`FINAL_TURN`]; otherwise the turn advances
//!    and each seat draws.
//!
//! Resolution needs `&mut GameState`, so it cannot run twice for the same
//! turn: the flags that triggered it are cleared before it returns.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ability::{effects, AbilityBook, Timing};
use crate::action::{check_batch, Action};
use crate::deck::ValidatedDeck;
use crate::error::{GameError, Result};
use crate::result::{score_lanes, MatchScore};
use crate::rng::{MatchRng, Stream};
use crate::state::{
    CardInstance, GameState, InstanceId, Lane, Origin, PlayerState, Side, TransferKind,
    LANE_COUNT, OPENING_HAND,
};

/// Last turn of a match.
pub const FINAL_TURN: u8 = 6;

/// How energy limits plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyRule {
    /// Energy is shown to players but plays are never refused for cost.
    #[default]
    Advisory,
    /// A play costing more than the energy left this turn is skipped.
    Enforced,
}

/// Engine-level settings fixed for the lifetime of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Energy handling.
    #[serde(default)]
    pub energy_rule: EnergyRule,
}

/// What a resolved turn led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// The match goes on.
    Continue {
        /// Turn now awaiting submissions.
        next_turn: u8,
    },
    /// The final turn resolved.
    Finished(MatchScore),
}

/// A sub-action that was skipped during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAction {
    /// Seat that submitted it.
    pub side: Side,
    /// Position in that seat's batch.
    pub index: usize,
    /// Why it was skipped.
    pub reason: String,
}

/// Summary of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    /// Turn that was resolved.
    pub turn: u8,
    /// Seat whose new cards resolved first, per lane.
    pub first_movers: [Side; LANE_COUNT],
    /// Actions that could not be applied.
    pub skipped: Vec<SkippedAction>,
    /// What happens next.
    pub outcome: TurnOutcome,
}

impl GameState {
    /// Set up a match: shuffle both decks, draw opening hands, start turn 1.
    ///
    /// Abilities are resolved from `book` once, here, so a match is not
    /// affected by later catalog changes.
    #[must_use]
    pub fn new(
        seed: u64,
        decks: [ValidatedDeck; 2],
        book: &AbilityBook,
        config: EngineConfig,
    ) -> Self {
        let mut instances = Vec::with_capacity(crate::deck::DECK_SIZE * 2);
        let mut players = [PlayerState::default(), PlayerState::default()];
        let mut rng = MatchRng::derive(seed, Stream::Setup);

        for (side, deck) in Side::BOTH.into_iter().zip(decks) {
            let player = &mut players[side.index()];
            for card in deck.into_cards() {
                // 24 deck cards plus copies; u16 cannot overflow here.
                let id = InstanceId(u16::try_from(instances.len()).unwrap_or(u16::MAX));
                instances.push(CardInstance {
                    id,
                    power: card.effective_power(),
                    ability: book.ability_for(&card).cloned(),
                    card,
                    owner: side,
                    origin: Origin::Deck,
                    played_turn: None,
                });
                player.deck.push(id);
            }
            rng.shuffle(&mut player.deck);
        }

        let mut state = Self {
            config,
            seed,
            turn: 1,
            energy: 1,
            resolved_turns: 0,
            instances,
            players,
            lanes: [Lane::default(), Lane::default(), Lane::default()],
            first_draw_done: false,
            transfers: Vec::new(),
            score: None,
        };
        for side in Side::BOTH {
            for _ in 0..OPENING_HAND {
                state.draw(side);
            }
        }
        state
    }

    /// Submit `side`'s actions for the current turn.
    ///
    /// Returns `Some(report)` if this submission completed the pair and the
    /// turn was resolved, `None` if the other seat has not submitted yet.
    ///
    /// # Errors
    ///
    /// - [`GameError::MatchOver`] after the final turn
    /// - [`GameError::ActionsAlreadySubmitted`] if `side` already confirmed
    /// - [`GameError::InvalidAction`] if an action is out of range now
    ///
    /// Errors never modify the state.
    pub fn submit(&mut self, side: Side, actions: Vec<Action>) -> Result<Option<TurnReport>> {
        if self.is_finished() {
            return Err(GameError::MatchOver);
        }
        if self.player(side).is_confirmed() {
            return Err(GameError::ActionsAlreadySubmitted(side));
        }
        check_batch(self, side, &actions)?;

        let player = &mut self.players[side.index()];
        player.pending = actions;
        player.confirmed = true;
        debug!(turn = self.turn, %side, count = player.pending.len(), "actions submitted");

        if Side::BOTH.iter().all(|s| self.player(*s).is_confirmed()) {
            Ok(Some(self.resolve_turn()))
        } else {
            Ok(None)
        }
    }

    /// Actions `side` has queued for this turn (empty until confirmed).
    #[must_use]
    pub fn pending_actions(&self, side: Side) -> &[Action] {
        &self.players[side.index()].pending
    }

    fn resolve_turn(&mut self) -> TurnReport {
        let turn = self.turn;
        let mut rng = MatchRng::derive(self.seed, Stream::Turn(turn));

        let mut first_movers = [Side::A; LANE_COUNT];
        for slot in &mut first_movers {
            *slot = if rng.coin() { Side::A } else { Side::B };
        }

        // Steps 1-2
        let mut skipped = Vec::new();
        let mut placed: Vec<(usize, Side, InstanceId)> = Vec::new();
        for side in Side::BOTH {
            let actions = std::mem::take(&mut self.players[side.index()].pending);
            for (index, action) in actions.into_iter().enumerate() {
                match self.apply_action(side, &action) {
                    Ok(Some((lane, id))) => placed.push((lane, side, id)),
                    Ok(None) => {}
                    Err(reason) => {
                        warn!(turn, %side, index, ?action, %reason, "action skipped");
                        skipped.push(SkippedAction {
                            side,
                            index,
                            reason,
                        });
                    }
                }
            }
        }

        // Step 3: stable sort keeps play order within a seat
        placed.sort_by_key(|(lane, side, _)| (*lane, *side != first_movers[*lane]));

        // Step 4
        for (_, _, id) in &placed {
            if self.timing_of(*id) == Some(Timing::Immediate) {
                effects::fire(self, &mut rng, *id);
            }
        }

        // Step 5
        for (lane, first) in first_movers.iter().enumerate() {
            for side in [*first, first.opponent()] {
                let ids = self.lanes[lane].cards(side).to_vec();
                for id in ids {
                    if self.timing_of(id) == Some(Timing::Continuous) {
                        effects::fire(self, &mut rng, id);
                    }
                }
            }
        }

        // Step 6
        self.recompute_lanes();
        self.resolved_turns += 1;

        // Step 7
        let outcome = if turn >= FINAL_TURN {
            let score = score_lanes(self.lane_powers());
            info!(turn, winner = ?score.winner, "match resolved");
            self.score = Some(score.clone());
            for player in &mut self.players {
                player.confirmed = false;
                player.energy_spent = 0;
            }
            TurnOutcome::Finished(score)
        } else {
            self.advance_turn();
            TurnOutcome::Continue {
                next_turn: self.turn,
            }
        };

        #[cfg(debug_assertions)]
        tracing::debug!(turn, state_hash = self.state_hash(), "turn resolved");

        #[cfg(feature = "debug-validation")]
        if let Err(e) = self.check_conservation() {
            tracing::error!(turn, error = %e, "conservation violated");
        }

        TurnReport {
            turn,
            first_movers,
            skipped,
            outcome,
        }
    }

    fn timing_of(&self, id: InstanceId) -> Option<Timing> {
        self.instance(id)
            .and_then(|inst| inst.ability.as_ref())
            .map(|ability| ability.timing)
    }

    fn advance_turn(&mut self) {
        self.turn += 1;
        self.energy = self.turn;

        let guarantee_strong = !self.first_draw_done;
        self.first_draw_done = true;

        for side in Side::BOTH {
            if guarantee_strong {
                self.lift_strong_card(side);
            }
            let owed = 1 + std::mem::take(&mut self.players[side.index()].extra_draws);
            for _ in 0..owed {
                if self.draw(side).is_none() {
                    break;
                }
            }
            let player = &mut self.players[side.index()];
            player.confirmed = false;
            player.energy_spent = 0;
        }
    }

    /// Apply one action. `Ok(Some(..))` for a card placed into a lane.
    fn apply_action(
        &mut self,
        side: Side,
        action: &Action,
    ) -> std::result::Result<Option<(usize, InstanceId)>, String> {
        match *action {
            Action::Play { hand_index, lane } => {
                if lane >= LANE_COUNT {
                    return Err(format!("lane {lane} does not exist"));
                }
                let id = *self.players[side.index()]
                    .hand
                    .get(hand_index)
                    .ok_or_else(|| format!("no card at hand index {hand_index}"))?;
                let cost = self.instance(id).map_or(0, |inst| inst.card.energy_cost());
                let player = &self.players[side.index()];
                if self.config.energy_rule == EnergyRule::Enforced
                    && player.energy_spent.saturating_add(cost) > self.energy
                {
                    return Err(format!(
                        "costs {cost} energy, {} left",
                        self.energy.saturating_sub(player.energy_spent)
                    ));
                }

                let turn = self.turn;
                let player = &mut self.players[side.index()];
                player.hand.remove(hand_index);
                player.cards_played += 1;
                player.energy_spent = player.energy_spent.saturating_add(cost);
                self.lanes[lane].cards[side.index()].push(id);
                if let Some(inst) = self.instance_mut(id) {
                    inst.played_turn = Some(turn);
                }
                Ok(Some((lane, id)))
            }
            Action::SacrificeHand { hand_index } => {
                let player = &mut self.players[side.index()];
                if hand_index >= player.hand.len() {
                    return Err(format!("no card at hand index {hand_index}"));
                }
                let id = player.hand.remove(hand_index);
                player.graveyard.push(id);
                self.log_transfer(id, TransferKind::SacrificedFromHand);
                self.draw(side);
                Ok(None)
            }
            Action::SacrificeLane {
                lane,
                card_index,
                target_index,
            } => {
                let half = self
                    .lanes
                    .get(lane)
                    .map(|l| l.cards(side))
                    .ok_or_else(|| format!("lane {lane} does not exist"))?;
                let (Some(&victim), Some(&target)) = (half.get(card_index), half.get(target_index))
                else {
                    return Err(format!("no card at lane {lane} index {card_index}/{target_index}"));
                };
                if victim == target {
                    return Err("a card cannot be sacrificed into itself".into());
                }

                let amount = self
                    .instance(victim)
                    .map_or(0, |inst| inst.card.foil.sacrifice_buff(inst.card.effective_power()));
                self.bury(victim);
                if let Some(inst) = self.instance_mut(target) {
                    inst.buff(amount);
                }
                self.log_transfer(
                    victim,
                    TransferKind::SacrificedFromLane {
                        beneficiary: target,
                        amount,
                    },
                );
                Ok(None)
            }
        }
    }
}
