//! Synthetic opponent policy.
//!
//! The CPU stands in for a missing player (matchmaking fallback, staked
//! defense decks). It only reads what its own seat could see: its hand and
//! the lane totals. Every decision comes from the `Cpu` stream of the match
//! seed, so a CPU turn is as reproducible as the rest of the match.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::rng::{MatchRng, Stream};
use crate::state::{GameState, InstanceId, Side, LANE_COUNT};
use crate::turn::EnergyRule;

/// Play style, rolled fresh each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuStyle {
    /// Push lanes that are close to flipping.
    Aggressive,
    /// Shore up the weakest lane.
    Balanced,
    /// Protect narrow leads.
    Defensive,
    /// Random lanes, shuffled hand.
    Chaotic,
}

impl CpuStyle {
    /// Roll a style: 30% aggressive, 40% balanced, 20% defensive, 10% chaotic.
    pub fn roll(rng: &mut MatchRng) -> Self {
        match rng.pick(100).unwrap_or(0) {
            0..=29 => Self::Aggressive,
            30..=69 => Self::Balanced,
            70..=89 => Self::Defensive,
            _ => Self::Chaotic,
        }
    }
}

/// Tunables for the synthetic opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuPolicy {
    /// Most cards played per turn when energy does not limit plays.
    pub max_plays: usize,
    /// Energy below which a weak card is traded in if nothing strong is affordable.
    pub sacrifice_below_energy: u8,
    /// A lane already led by this much (with two or more cards) gets no more cards.
    pub safe_margin: u32,
    /// Sort bonus for cards that carry an ability.
    pub ability_bonus: u32,
}

impl Default for CpuPolicy {
    fn default() -> Self {
        Self {
            max_plays: 2,
            sacrifice_below_energy: 3,
            safe_margin: 100,
            ability_bonus: 10,
        }
    }
}

impl CpuPolicy {
    /// Choose `side`'s actions for the current turn.
    #[must_use]
    pub fn choose(&self, state: &GameState, side: Side) -> Vec<Action> {
        let mut rng = MatchRng::derive(state.seed(), Stream::Cpu(side, state.turn()));
        let style = CpuStyle::roll(&mut rng);
        tracing::debug!(turn = state.turn(), %side, ?style, "cpu choosing");

        let energy = state.energy().saturating_sub(state.player(side).energy_spent());
        let (mut budget, max_plays) = match state.config().energy_rule {
            EnergyRule::Advisory => (u8::MAX, self.max_plays),
            EnergyRule::Enforced => (energy, usize::MAX),
        };

        let mut hand: Vec<InstanceId> = state.player(side).hand().to_vec();
        let mut actions = Vec::new();

        // Trade a weak card for a fresh draw when nothing good is castable.
        let strong_affordable = hand.iter().any(|id| {
            state.instance(*id).is_some_and(|inst| {
                inst.card.category.is_strong() && inst.card.energy_cost() <= energy
            })
        });
        if energy < self.sacrifice_below_energy
            && !strong_affordable
            && !state.player(side).deck().is_empty()
        {
            let weakest_weak = hand
                .iter()
                .enumerate()
                .filter(|(_, id)| {
                    state
                        .instance(**id)
                        .is_some_and(|inst| inst.card.category.is_weak())
                })
                .min_by_key(|(_, id)| state.power_of(**id))
                .map(|(pos, _)| pos);
            if let Some(pos) = weakest_weak {
                actions.push(Action::SacrificeHand { hand_index: pos });
                // The replacement lands at the end of the hand; earlier positions hold.
                hand.remove(pos);
            }
        }

        let mut order = hand.clone();
        if style == CpuStyle::Chaotic {
            rng.shuffle(&mut order);
        } else {
            order.sort_by_key(|id| std::cmp::Reverse(self.card_value(state, *id)));
        }

        let mut powers = [[0u32; 2]; LANE_COUNT];
        let mut counts = [0usize; LANE_COUNT];
        for lane in 0..LANE_COUNT {
            powers[lane] = [
                state.live_lane_power(lane, Side::A),
                state.live_lane_power(lane, Side::B),
            ];
            counts[lane] = state.lanes()[lane].cards(side).len();
        }

        let mut plays = 0;
        for id in order {
            if plays >= max_plays {
                break;
            }
            let Some(inst) = state.instance(id) else {
                continue;
            };
            let cost = inst.card.energy_cost();
            if cost > budget {
                continue;
            }
            let Some(lane) = self.pick_lane(style, side, &powers, &counts, &mut rng) else {
                break;
            };
            let Some(hand_index) = hand.iter().position(|h| *h == id) else {
                continue;
            };

            actions.push(Action::Play { hand_index, lane });
            hand.remove(hand_index);
            budget = budget.saturating_sub(cost);
            powers[lane][side.index()] = powers[lane][side.index()].saturating_add(inst.power);
            counts[lane] += 1;
            plays += 1;
        }
        actions
    }

    fn card_value(&self, state: &GameState, id: InstanceId) -> u32 {
        state.instance(id).map_or(0, |inst| {
            let bonus = if inst.ability.is_some() {
                self.ability_bonus
            } else {
                0
            };
            inst.power.saturating_add(bonus)
        })
    }

    fn pick_lane(
        &self,
        style: CpuStyle,
        side: Side,
        powers: &[[u32; 2]; LANE_COUNT],
        counts: &[usize; LANE_COUNT],
        rng: &mut MatchRng,
    ) -> Option<usize> {
        let me = side.index();
        let them = side.opponent().index();
        let margin = |lane: usize| i64::from(powers[lane][me]) - i64::from(powers[lane][them]);

        let open: Vec<usize> = (0..LANE_COUNT)
            .filter(|lane| !(counts[*lane] >= 2 && margin(*lane) >= i64::from(self.safe_margin)))
            .collect();
        if open.is_empty() {
            return None;
        }

        match style {
            CpuStyle::Chaotic => rng.pick(open.len()).map(|i| open[i]),
            // Closest to flipping: smallest non-negative deficit, else smallest lead.
            CpuStyle::Aggressive => open
                .iter()
                .copied()
                .min_by_key(|lane| {
                    let m = margin(*lane);
                    if m <= 0 {
                        (0, -m)
                    } else {
                        (1, m)
                    }
                }),
            CpuStyle::Balanced => open.iter().copied().min_by_key(|lane| margin(*lane)),
            // Narrowest lead first, otherwise behave like Balanced.
            CpuStyle::Defensive => open
                .iter()
                .copied()
                .filter(|lane| margin(*lane) > 0)
                .min_by_key(|lane| margin(*lane))
                .or_else(|| open.iter().copied().min_by_key(|lane| margin(*lane))),
        }
    }
}
