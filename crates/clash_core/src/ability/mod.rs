//! Card abilities.
//!
//! A card carries at most one [`Ability`]: an [`Effect`] plus a [`Timing`].
//! Effects are a closed set of variants, each holding only the parameters it
//! needs, and are applied by a single exhaustive `match` in [`effects`].
//! Adding a card is a data change in `data/abilities.ron`.
//!
//! Every effect declares a [`Reach`]: which halves of the board it is allowed
//! to touch. Mutations outside the declared reach are refused at apply time.

mod catalog;
pub(crate) mod effects;

pub use catalog::{normalize_name, AbilityBook, SignatureAbilities};

use serde::{Deserialize, Serialize};

/// When an ability fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timing {
    /// Once, in the turn the card is played.
    Immediate,
    /// At the end of every turn while the card is in a lane.
    Continuous,
}

/// Board quantity a scaled buff multiplies by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    /// All cards in this lane, both sides, including self.
    CardsInLane,
    /// Other friendly cards in this lane.
    FriendlyInLane,
    /// Other friendly cards anywhere on the board.
    FriendlyOnBoard,
    /// All cards on the board, both sides.
    CardsInPlay,
    /// Cards the controller has played this match, before this one.
    CardsPlayed,
    /// Cards currently in the controller's hand.
    HandSize,
    /// Current turn number.
    Turn,
}

/// Gate for [`Effect::Conditional`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Turn number is at least this.
    TurnAtLeast(u8),
    /// Turn number is at most this.
    TurnAtMost(u8),
    /// Controller holds at least this many cards.
    HandAtLeast(u32),
    /// Controller holds at most this many cards.
    HandAtMost(u32),
    /// Controller has less power than the enemy in this lane.
    LosingLane,
    /// Controller has fewer cards than the enemy in this lane.
    OutnumberedInLane,
    /// No other friendly card in this lane.
    AloneInLane,
    /// Controller currently leads at least this many lanes.
    LeadingLanes(u8),
}

/// Which enemy card a destroy effect removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestroyTarget {
    /// Strongest enemy in this lane.
    StrongestInLane,
    /// Strongest enemy anywhere.
    StrongestOnBoard,
    /// The enemy in this lane, only if it is the sole enemy there.
    LoneInLane,
}

/// What an ability does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Flat gain to this card.
    BuffSelf {
        /// Power gained.
        amount: u32,
    },
    /// Gain `per` for each unit of `basis`.
    BuffScaled {
        /// Power per unit.
        per: u32,
        /// What to count.
        basis: Basis,
    },
    /// Buff every other friendly card in this lane.
    BuffLane {
        /// Power gained per card.
        amount: u32,
    },
    /// Buff one random other friendly card in this lane.
    BuffRandomFriendly {
        /// Power gained.
        amount: u32,
    },
    /// Buff every friendly card in the other lanes.
    BuffOtherLanes {
        /// Power gained per card.
        amount: u32,
    },
    /// Buff every friendly card on the board, including self.
    BuffBoard {
        /// Power gained per card.
        amount: u32,
    },
    /// Buff the weakest friendly card on the board.
    BuffWeakest {
        /// Power gained.
        amount: u32,
    },
    /// Weaken every enemy in this lane.
    DebuffLane {
        /// Power removed per card.
        amount: u32,
    },
    /// Weaken the strongest enemy on the board.
    DebuffStrongest {
        /// Power removed.
        amount: u32,
    },
    /// Weaken one random enemy in this lane.
    DebuffRandom {
        /// Power removed.
        amount: u32,
    },
    /// Remove an enemy card from play.
    Destroy {
        /// Which enemy.
        target: DestroyTarget,
        /// Share of the victim's power this card absorbs, in percent.
        absorb_percent: u32,
    },
    /// Take the weakest enemy card in this lane onto your half.
    StealCard,
    /// Drain power from the strongest enemy in this lane into this card.
    StealPower {
        /// Maximum power drained.
        amount: u32,
    },
    /// Draw cards now.
    Draw {
        /// Cards drawn.
        count: u8,
    },
    /// Put a fresh copy of this card into the controller's hand.
    CopyToHand,
    /// Draw extra cards at the next draw step.
    ExtraDraws {
        /// Cards owed.
        count: u8,
    },
    /// Apply `then` only if `condition` holds when the ability fires.
    Conditional {
        /// Gate.
        condition: Condition,
        /// Effect to apply.
        then: Box<Effect>,
    },
    /// Coin flip: gain `win` or lose `lose`.
    Gamble {
        /// Power gained on heads.
        win: u32,
        /// Power lost on tails.
        lose: u32,
    },
    /// Gain a share of the strongest other friendly card in this lane.
    CopyStrongestFriendly {
        /// Share, in percent.
        percent: u32,
    },
    /// Raise this card's power to that of the strongest card on the board.
    MatchStrongest,
    /// Gain a share of the enemy's total power in this lane.
    AbsorbEnemyLane {
        /// Share, in percent.
        percent: u32,
    },
    /// Gain this card's printed effective power again while losing the lane.
    SurgeIfLosing,
}

/// Board halves an effect may mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reach {
    /// Controller's cards, hand or deck.
    pub friendly: bool,
    /// Opponent's cards.
    pub enemy: bool,
}

impl Reach {
    const FRIENDLY: Self = Self {
        friendly: true,
        enemy: false,
    };
    const ENEMY: Self = Self {
        friendly: false,
        enemy: true,
    };
    const BOTH: Self = Self {
        friendly: true,
        enemy: true,
    };
}

impl Effect {
    /// Halves of the board this effect is allowed to mutate.
    #[must_use]
    pub fn reach(&self) -> Reach {
        match self {
            Self::BuffSelf { .. }
            | Self::BuffScaled { .. }
            | Self::BuffLane { .. }
            | Self::BuffRandomFriendly { .. }
            | Self::BuffOtherLanes { .. }
            | Self::BuffBoard { .. }
            | Self::BuffWeakest { .. }
            | Self::Draw { .. }
            | Self::CopyToHand
            | Self::ExtraDraws { .. }
            | Self::Gamble { .. }
            | Self::CopyStrongestFriendly { .. }
            | Self::MatchStrongest
            | Self::AbsorbEnemyLane { .. }
            | Self::SurgeIfLosing => Reach::FRIENDLY,
            Self::DebuffLane { .. } | Self::DebuffStrongest { .. } | Self::DebuffRandom { .. } => {
                Reach::ENEMY
            }
            Self::Destroy { absorb_percent, .. } => {
                if *absorb_percent > 0 {
                    Reach::BOTH
                } else {
                    Reach::ENEMY
                }
            }
            Self::StealCard | Self::StealPower { .. } => Reach::BOTH,
            Self::Conditional { then, .. } => then.reach(),
        }
    }
}

/// A card's ability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ability {
    /// When it fires.
    pub timing: Timing,
    /// What it does.
    pub effect: Effect,
    /// Rules text shown to players.
    #[serde(default)]
    pub text: String,
}

impl Ability {
    /// Immediate ability without rules text.
    #[must_use]
    pub fn immediate(effect: Effect) -> Self {
        Self {
            timing: Timing::Immediate,
            effect,
            text: String::new(),
        }
    }

    /// Continuous ability without rules text.
    #[must_use]
    pub fn continuous(effect: Effect) -> Self {
        Self {
            timing: Timing::Continuous,
            effect,
            text: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debuffs_only_reach_enemy() {
        let reach = Effect::DebuffLane { amount: 5 }.reach();
        assert!(reach.enemy);
        assert!(!reach.friendly);
    }

    #[test]
    fn test_destroy_reach_depends_on_absorb() {
        let plain = Effect::Destroy {
            target: DestroyTarget::StrongestInLane,
            absorb_percent: 0,
        };
        let absorbing = Effect::Destroy {
            target: DestroyTarget::StrongestInLane,
            absorb_percent: 50,
        };
        assert_eq!(plain.reach(), Reach::ENEMY);
        assert_eq!(absorbing.reach(), Reach::BOTH);
    }

    #[test]
    fn test_conditional_inherits_reach() {
        let effect = Effect::Conditional {
            condition: Condition::TurnAtLeast(4),
            then: Box::new(Effect::DebuffRandom { amount: 3 }),
        };
        assert_eq!(effect.reach(), Reach::ENEMY);
    }
}
