//! Effect dispatch.
//!
//! [`fire`] applies one card's effect to the live match state. Effects see
//! the results of every effect applied before them in the same resolution.

use tracing::{debug, warn};

use super::{Basis, Condition, DestroyTarget, Effect, Reach};
use crate::rng::MatchRng;
use crate::state::{GameState, InstanceId, Side, TransferKind, LANE_COUNT};

/// Working context for one ability firing.
struct EffectCtx<'a> {
    state: &'a mut GameState,
    rng: &'a mut MatchRng,
    actor: InstanceId,
    side: Side,
    lane: usize,
    reach: Reach,
}

/// Fire the ability of `actor`, if it has one and is still in a lane.
///
/// Returns `true` if an effect was applied.
pub(crate) fn fire(state: &mut GameState, rng: &mut MatchRng, actor: InstanceId) -> bool {
    let Some((lane, side)) = state.lane_position(actor) else {
        return false;
    };
    let Some(effect) = state
        .instance(actor)
        .and_then(|inst| inst.ability.as_ref())
        .map(|ability| ability.effect.clone())
    else {
        return false;
    };

    debug!(turn = state.turn(), actor = actor.0, %side, lane, ?effect, "ability fires");
    let mut ctx = EffectCtx {
        state,
        rng,
        actor,
        side,
        lane,
        reach: effect.reach(),
    };
    ctx.apply(&effect);
    true
}

impl EffectCtx<'_> {
    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::BuffSelf { amount } => self.buff(self.actor, *amount),
            Effect::BuffScaled { per, basis } => {
                let units = self.count(*basis);
                self.buff(self.actor, per.saturating_mul(units));
            }
            Effect::BuffLane { amount } => {
                for id in self.friendly_in_lane() {
                    self.buff(id, *amount);
                }
            }
            Effect::BuffRandomFriendly { amount } => {
                let others = self.friendly_in_lane();
                if let Some(pick) = self.rng.pick(others.len()) {
                    self.buff(others[pick], *amount);
                }
            }
            Effect::BuffOtherLanes { amount } => {
                let own_lane = self.lane;
                for lane in (0..LANE_COUNT).filter(|l| *l != own_lane) {
                    for id in self.state.lanes()[lane].cards(self.side).to_vec() {
                        self.buff(id, *amount);
                    }
                }
            }
            Effect::BuffBoard { amount } => {
                for id in self.on_board(self.side) {
                    self.buff(id, *amount);
                }
            }
            Effect::BuffWeakest { amount } => {
                if let Some(id) = self.weakest(&self.on_board(self.side)) {
                    self.buff(id, *amount);
                }
            }
            Effect::DebuffLane { amount } => {
                for id in self.enemies_in_lane() {
                    self.debuff(id, *amount);
                }
            }
            Effect::DebuffStrongest { amount } => {
                if let Some(id) = self.strongest(&self.on_board(self.side.opponent())) {
                    self.debuff(id, *amount);
                }
            }
            Effect::DebuffRandom { amount } => {
                let enemies = self.enemies_in_lane();
                if let Some(pick) = self.rng.pick(enemies.len()) {
                    self.debuff(enemies[pick], *amount);
                }
            }
            Effect::Destroy {
                target,
                absorb_percent,
            } => self.destroy(*target, *absorb_percent),
            Effect::StealCard => self.steal_card(),
            Effect::StealPower { amount } => {
                if let Some(victim) = self.strongest(&self.enemies_in_lane()) {
                    let taken = self.debuff(victim, *amount);
                    if taken > 0 {
                        self.buff(self.actor, taken);
                        self.state.log_transfer(
                            victim,
                            TransferKind::PowerDrained {
                                into: self.actor,
                                amount: taken,
                            },
                        );
                    }
                }
            }
            Effect::Draw { count } => {
                for _ in 0..*count {
                    if self.state.draw(self.side).is_none() {
                        break;
                    }
                }
            }
            Effect::CopyToHand => {
                if self.state.spawn_copy(self.actor, self.side).is_none() {
                    warn!(actor = self.actor.0, "instance arena full, copy skipped");
                }
            }
            Effect::ExtraDraws { count } => {
                let player = &mut self.state.players[self.side.index()];
                player.extra_draws = player.extra_draws.saturating_add(u32::from(*count));
            }
            Effect::Conditional { condition, then } => {
                if self.holds(*condition) {
                    self.apply(then);
                }
            }
            Effect::Gamble { win, lose } => {
                if self.rng.coin() {
                    self.buff(self.actor, *win);
                } else {
                    self.debuff(self.actor, *lose);
                }
            }
            Effect::CopyStrongestFriendly { percent } => {
                if let Some(id) = self.strongest(&self.friendly_in_lane()) {
                    let gain = percent_of(self.state.power_of(id), *percent);
                    self.buff(self.actor, gain);
                }
            }
            Effect::MatchStrongest => {
                let mut everyone = self.on_board(Side::A);
                everyone.extend(self.on_board(Side::B));
                let best = everyone
                    .iter()
                    .map(|id| self.state.power_of(*id))
                    .max()
                    .unwrap_or(0);
                let own = self.state.power_of(self.actor);
                if best > own {
                    self.buff(self.actor, best - own);
                }
            }
            Effect::AbsorbEnemyLane { percent } => {
                let enemy = self.state.live_lane_power(self.lane, self.side.opponent());
                self.buff(self.actor, percent_of(enemy, *percent));
            }
            Effect::SurgeIfLosing => {
                if self.holds(Condition::LosingLane) {
                    let base = self
                        .state
                        .instance(self.actor)
                        .map_or(0, |inst| inst.card.effective_power());
                    self.buff(self.actor, base);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn friendly_in_lane(&self) -> Vec<InstanceId> {
        self.state.lanes()[self.lane]
            .cards(self.side)
            .iter()
            .copied()
            .filter(|id| *id != self.actor)
            .collect()
    }

    fn enemies_in_lane(&self) -> Vec<InstanceId> {
        self.state.lanes()[self.lane]
            .cards(self.side.opponent())
            .to_vec()
    }

    fn on_board(&self, side: Side) -> Vec<InstanceId> {
        self.state
            .lanes()
            .iter()
            .flat_map(|lane| lane.cards(side).iter().copied())
            .collect()
    }

    /// Strongest of `ids`; the earliest-played wins ties.
    fn strongest(&self, ids: &[InstanceId]) -> Option<InstanceId> {
        ids.iter()
            .copied()
            .rev()
            .max_by_key(|id| self.state.power_of(*id))
    }

    /// Weakest of `ids`; the earliest-played wins ties.
    fn weakest(&self, ids: &[InstanceId]) -> Option<InstanceId> {
        ids.iter().copied().min_by_key(|id| self.state.power_of(*id))
    }

    fn count(&self, basis: Basis) -> u32 {
        let n = match basis {
            Basis::CardsInLane => {
                let lane = &self.state.lanes()[self.lane];
                lane.cards(Side::A).len() + lane.cards(Side::B).len()
            }
            Basis::FriendlyInLane => self.friendly_in_lane().len(),
            Basis::FriendlyOnBoard => self.on_board(self.side).len().saturating_sub(1),
            Basis::CardsInPlay => self.on_board(Side::A).len() + self.on_board(Side::B).len(),
            Basis::CardsPlayed => {
                let played = self.state.player(self.side).cards_played();
                return played.saturating_sub(1);
            }
            Basis::HandSize => self.state.player(self.side).hand().len(),
            Basis::Turn => usize::from(self.state.turn()),
        };
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    fn holds(&self, condition: Condition) -> bool {
        let hand = self.state.player(self.side).hand().len();
        match condition {
            Condition::TurnAtLeast(turn) => self.state.turn() >= turn,
            Condition::TurnAtMost(turn) => self.state.turn() <= turn,
            Condition::HandAtLeast(n) => hand >= n as usize,
            Condition::HandAtMost(n) => hand <= n as usize,
            Condition::LosingLane => {
                self.state.live_lane_power(self.lane, self.side)
                    < self.state.live_lane_power(self.lane, self.side.opponent())
            }
            Condition::OutnumberedInLane => {
                let lane = &self.state.lanes()[self.lane];
                lane.cards(self.side).len() < lane.cards(self.side.opponent()).len()
            }
            Condition::AloneInLane => self.friendly_in_lane().is_empty(),
            Condition::LeadingLanes(needed) => {
                let leading = (0..LANE_COUNT)
                    .filter(|lane| {
                        self.state.live_lane_power(*lane, self.side)
                            > self.state.live_lane_power(*lane, self.side.opponent())
                    })
                    .count();
                leading >= usize::from(needed)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Mutations (reach-checked)
    // ---------------------------------------------------------------------

    fn allowed(&self, target: InstanceId) -> bool {
        let Some((_, holder)) = self.state.lane_position(target) else {
            return false;
        };
        let ok = if holder == self.side {
            self.reach.friendly
        } else {
            self.reach.enemy
        };
        if !ok {
            warn!(actor = self.actor.0, target = target.0, "effect outside its reach refused");
        }
        ok
    }

    fn buff(&mut self, target: InstanceId, amount: u32) {
        if amount == 0 || !self.allowed(target) {
            return;
        }
        if let Some(inst) = self.state.instance_mut(target) {
            inst.buff(amount);
        }
    }

    /// Returns the power actually removed.
    fn debuff(&mut self, target: InstanceId, amount: u32) -> u32 {
        if amount == 0 || !self.allowed(target) {
            return 0;
        }
        self.state
            .instance_mut(target)
            .map_or(0, |inst| inst.debuff(amount))
    }

    fn destroy(&mut self, target: DestroyTarget, absorb_percent: u32) {
        let victim = match target {
            DestroyTarget::StrongestInLane => self.strongest(&self.enemies_in_lane()),
            DestroyTarget::StrongestOnBoard => {
                self.strongest(&self.on_board(self.side.opponent()))
            }
            DestroyTarget::LoneInLane => match self.enemies_in_lane().as_slice() {
                [only] => Some(*only),
                _ => None,
            },
        };
        let Some(victim) = victim else { return };
        if !self.allowed(victim) {
            return;
        }

        let absorbed = percent_of(self.state.power_of(victim), absorb_percent);
        if self.state.bury(victim) {
            self.buff(self.actor, absorbed);
            self.state.log_transfer(
                victim,
                TransferKind::Destroyed {
                    by: self.actor,
                    absorbed,
                },
            );
        }
    }

    fn steal_card(&mut self) {
        let Some(victim) = self.weakest(&self.enemies_in_lane()) else {
            return;
        };
        if !self.allowed(victim) {
            return;
        }
        if self.state.remove_from_lane(victim).is_some() {
            self.state.lanes[self.lane].cards[self.side.index()].push(victim);
            self.state
                .log_transfer(victim, TransferKind::Stolen { by: self.actor });
        }
    }
}

fn percent_of(value: u32, percent: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(percent) / 100;
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{Ability, AbilityBook};
    use crate::card::{Card, CardCategory, Rarity};
    use crate::deck::validate_deck;
    use crate::rng::Stream;
    use crate::turn::EngineConfig;

    /// Fresh state with no abilities, then cards placed by hand.
    fn board() -> GameState {
        let deck = || {
            let cards = (0..12)
                .map(|i| Card::new(format!("c{i}"), "Plain", CardCategory::Core, Rarity::Common, 10))
                .collect();
            validate_deck(cards).unwrap()
        };
        let book = AbilityBook::builtin().unwrap();
        GameState::new(7, [deck(), deck()], &book, EngineConfig::default())
    }

    /// Move the first hand card of `side` into `lane` with a given ability.
    fn place(state: &mut GameState, side: Side, lane: usize, power: u32, ability: Option<Ability>) -> InstanceId {
        let id = state.players[side.index()].hand.remove(0);
        state.lanes[lane].cards[side.index()].push(id);
        let inst = state.instance_mut(id).unwrap();
        inst.power = power;
        inst.ability = ability;
        id
    }

    fn rng() -> MatchRng {
        MatchRng::derive(1, Stream::Turn(1))
    }

    #[test]
    fn test_debuff_never_goes_negative() {
        let mut state = board();
        let enemy = place(&mut state, Side::B, 0, 4, None);
        let actor = place(
            &mut state,
            Side::A,
            0,
            10,
            Some(Ability::immediate(Effect::DebuffLane { amount: 50 })),
        );
        assert!(fire(&mut state, &mut rng(), actor));
        assert_eq!(state.power_of(enemy), 0);
        assert_eq!(state.power_of(actor), 10);
    }

    #[test]
    fn test_buff_lane_skips_self_and_enemies() {
        let mut state = board();
        let ally = place(&mut state, Side::A, 1, 10, None);
        let enemy = place(&mut state, Side::B, 1, 10, None);
        let actor = place(
            &mut state,
            Side::A,
            1,
            10,
            Some(Ability::immediate(Effect::BuffLane { amount: 5 })),
        );
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.power_of(ally), 15);
        assert_eq!(state.power_of(actor), 10);
        assert_eq!(state.power_of(enemy), 10);
    }

    #[test]
    fn test_destroy_absorbs_and_logs() {
        let mut state = board();
        let weak = place(&mut state, Side::B, 2, 8, None);
        let strong = place(&mut state, Side::B, 2, 30, None);
        let actor = place(
            &mut state,
            Side::A,
            2,
            10,
            Some(Ability::immediate(Effect::Destroy {
                target: DestroyTarget::StrongestInLane,
                absorb_percent: 50,
            })),
        );
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.lanes()[2].cards(Side::B), &[weak]);
        assert!(state.player(Side::B).graveyard().contains(&strong));
        assert_eq!(state.power_of(actor), 25);
        assert!(matches!(
            state.transfers().last().map(|t| &t.kind),
            Some(TransferKind::Destroyed { absorbed: 15, .. })
        ));
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_lone_hunter_needs_exactly_one_enemy() {
        let mut state = board();
        let a = place(&mut state, Side::B, 0, 8, None);
        let b = place(&mut state, Side::B, 0, 8, None);
        let effect = Effect::Destroy {
            target: DestroyTarget::LoneInLane,
            absorb_percent: 0,
        };
        let actor = place(&mut state, Side::A, 0, 10, Some(Ability::immediate(effect)));
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.lanes()[0].cards(Side::B), &[a, b]);
    }

    #[test]
    fn test_steal_moves_weakest_enemy() {
        let mut state = board();
        let weak = place(&mut state, Side::B, 1, 3, None);
        let _strong = place(&mut state, Side::B, 1, 30, None);
        let actor = place(&mut state, Side::A, 1, 10, Some(Ability::immediate(Effect::StealCard)));
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.lane_position(weak), Some((1, Side::A)));
        assert_eq!(state.instance(weak).unwrap().owner, Side::B);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_steal_power_capped_by_victim() {
        let mut state = board();
        let victim = place(&mut state, Side::B, 0, 6, None);
        let actor = place(
            &mut state,
            Side::A,
            0,
            10,
            Some(Ability::immediate(Effect::StealPower { amount: 15 })),
        );
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.power_of(victim), 0);
        assert_eq!(state.power_of(actor), 16);
    }

    #[test]
    fn test_copy_to_hand_creates_logged_copy() {
        let mut state = board();
        let hand_before = state.player(Side::A).hand().len();
        let actor = place(&mut state, Side::A, 0, 10, Some(Ability::immediate(Effect::CopyToHand)));
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.player(Side::A).hand().len(), hand_before);
        assert_eq!(state.instances().len(), 25);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_conditional_respects_gate() {
        let mut state = board();
        let effect = Effect::Conditional {
            condition: Condition::TurnAtLeast(4),
            then: Box::new(Effect::BuffSelf { amount: 25 }),
        };
        let actor = place(&mut state, Side::A, 0, 10, Some(Ability::immediate(effect.clone())));
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.power_of(actor), 10);

        state.turn = 4;
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.power_of(actor), 35);
    }

    #[test]
    fn test_match_strongest_reads_both_sides() {
        let mut state = board();
        place(&mut state, Side::B, 2, 44, None);
        let actor = place(&mut state, Side::A, 0, 10, Some(Ability::immediate(Effect::MatchStrongest)));
        fire(&mut state, &mut rng(), actor);
        assert_eq!(state.power_of(actor), 44);
    }

    #[test]
    fn test_removed_card_does_not_fire() {
        let mut state = board();
        let actor = place(
            &mut state,
            Side::A,
            0,
            10,
            Some(Ability::immediate(Effect::BuffSelf { amount: 5 })),
        );
        state.bury(actor);
        assert!(!fire(&mut state, &mut rng(), actor));
    }

    #[test]
    fn test_percent_of_rounds_down() {
        assert_eq!(percent_of(15, 50), 7);
        assert_eq!(percent_of(u32::MAX, 200), u32::MAX);
    }
}
