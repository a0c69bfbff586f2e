//! Match state.
//!
//! All card instances of a match live in one arena indexed by [`InstanceId`].
//! Zones (deck, hand, graveyard) and lanes only hold ids, so moving a card
//! is a pair of `Vec` operations and nothing is ever deep-copied during
//! resolution.
//!
//! # Determinism
//!
//! - No `HashMap` anywhere in the state; iteration order is storage order
//! - Power arithmetic is integer-only and saturates at zero
//! - [`GameState::state_hash`] covers everything that affects future turns

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::action::Action;
use crate::card::Card;
use crate::error::{GameError, Result};
use crate::result::MatchScore;
use crate::turn::EngineConfig;

/// Number of lanes on the board.
pub const LANE_COUNT: usize = 3;

/// Cards drawn by each side before turn 1.
pub const OPENING_HAND: usize = 3;

/// One of the two seats in a match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Side {
    /// The creator / first seat.
    A,
    /// The joiner / second seat.
    B,
}

impl Side {
    /// Both sides, `A` first.
    pub const BOTH: [Self; 2] = [Self::A, Self::B];

    /// Array index for per-side storage.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Arena index of a card instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct InstanceId(pub u16);

/// Where an instance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// One of the twelve cards of the owner's joined deck.
    Deck,
    /// Created mid-match by a duplicate effect.
    Copy {
        /// The instance that was duplicated.
        of: InstanceId,
    },
}

/// A card in play (or waiting to be).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInstance {
    /// Arena index.
    pub id: InstanceId,
    /// The printed card.
    pub card: Card,
    /// Seat whose deck this instance belongs to. Never changes, even when stolen.
    pub owner: Side,
    /// Deck card or mid-match copy.
    pub origin: Origin,
    /// Current power. Starts at the card's effective power.
    pub power: u32,
    /// Resolved ability, if the catalog knows this card.
    pub ability: Option<Ability>,
    /// Turn the instance entered a lane.
    pub played_turn: Option<u8>,
}

impl CardInstance {
    /// Add power.
    pub fn buff(&mut self, amount: u32) {
        self.power = self.power.saturating_add(amount);
    }

    /// Remove power, stopping at zero. Returns how much was actually removed.
    pub fn debuff(&mut self, amount: u32) -> u32 {
        let taken = amount.min(self.power);
        self.power -= taken;
        taken
    }
}

/// Location of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    /// Draw pile of the given side.
    Deck(Side),
    /// Hand of the given side.
    Hand(Side),
    /// A lane, on the given side's half.
    Lane(usize, Side),
    /// Removed from play; kept so conservation can be checked.
    Graveyard(Side),
}

/// Per-seat zones and turn bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Draw pile; the top card is the last element.
    pub(crate) deck: Vec<InstanceId>,
    pub(crate) hand: Vec<InstanceId>,
    pub(crate) graveyard: Vec<InstanceId>,
    pub(crate) pending: Vec<Action>,
    pub(crate) confirmed: bool,
    pub(crate) cards_played: u32,
    /// Extra cards owed at the next draw step.
    pub(crate) extra_draws: u32,
    pub(crate) energy_spent: u8,
}

impl PlayerState {
    /// Remaining draw pile, bottom first.
    #[must_use]
    pub fn deck(&self) -> &[InstanceId] {
        &self.deck
    }

    /// Hand, in draw order.
    #[must_use]
    pub fn hand(&self) -> &[InstanceId] {
        &self.hand
    }

    /// Instances removed from play.
    #[must_use]
    pub fn graveyard(&self) -> &[InstanceId] {
        &self.graveyard
    }

    /// Whether this seat has submitted for the current turn.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Cards this seat has put into lanes so far this match.
    #[must_use]
    pub const fn cards_played(&self) -> u32 {
        self.cards_played
    }

    /// Energy already committed this turn.
    #[must_use]
    pub const fn energy_spent(&self) -> u8 {
        self.energy_spent
    }
}

/// One of the three combat columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub(crate) cards: [Vec<InstanceId>; 2],
    pub(crate) power: [u32; 2],
}

impl Lane {
    /// Cards on `side`'s half, in play order.
    #[must_use]
    pub fn cards(&self, side: Side) -> &[InstanceId] {
        &self.cards[side.index()]
    }

    /// Cached total power for `side`, as of the last recompute.
    #[must_use]
    pub const fn power(&self, side: Side) -> u32 {
        self.power[side.index()]
    }
}

/// Why an instance changed hands or left play.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// Discarded from hand in exchange for a fresh draw.
    SacrificedFromHand,
    /// Removed from a lane; its power went to another card.
    SacrificedFromLane {
        /// Card that received the buff.
        beneficiary: InstanceId,
        /// Power transferred.
        amount: u32,
    },
    /// Removed by an opposing ability.
    Destroyed {
        /// Card whose ability did it.
        by: InstanceId,
        /// Power the destroyer absorbed.
        absorbed: u32,
    },
    /// Moved to the other half of its lane.
    Stolen {
        /// Card whose ability did it.
        by: InstanceId,
    },
    /// Power drained into another card.
    PowerDrained {
        /// Receiving card.
        into: InstanceId,
        /// Power moved.
        amount: u32,
    },
    /// Duplicated into a hand.
    Copied {
        /// The new instance.
        copy: InstanceId,
    },
}

/// Logged movement of cards or power that the zone lists alone do not explain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transfer {
    /// Turn during which it happened.
    pub turn: u8,
    /// Instance affected.
    pub instance: InstanceId,
    /// What happened.
    pub kind: TransferKind,
}

/// Complete state of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub(crate) config: EngineConfig,
    pub(crate) seed: u64,
    pub(crate) turn: u8,
    pub(crate) energy: u8,
    pub(crate) resolved_turns: u8,
    pub(crate) instances: Vec<CardInstance>,
    pub(crate) players: [PlayerState; 2],
    pub(crate) lanes: [Lane; LANE_COUNT],
    pub(crate) first_draw_done: bool,
    pub(crate) transfers: Vec<Transfer>,
    pub(crate) score: Option<MatchScore>,
}

impl GameState {
    /// Current turn (1-based).
    #[must_use]
    pub const fn turn(&self) -> u8 {
        self.turn
    }

    /// Energy available this turn.
    #[must_use]
    pub const fn energy(&self) -> u8 {
        self.energy
    }

    /// Match seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Engine settings this match was started with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of turns resolved so far.
    #[must_use]
    pub const fn resolved_turns(&self) -> u8 {
        self.resolved_turns
    }

    /// Final score, once the last turn resolved.
    #[must_use]
    pub const fn score(&self) -> Option<&MatchScore> {
        self.score.as_ref()
    }

    /// Whether the final turn has resolved.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.score.is_some()
    }

    /// Zones of one seat.
    #[must_use]
    pub const fn player(&self, side: Side) -> &PlayerState {
        &self.players[side.index()]
    }

    /// All lanes.
    #[must_use]
    pub const fn lanes(&self) -> &[Lane; LANE_COUNT] {
        &self.lanes
    }

    /// Transfer log, oldest first.
    #[must_use]
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Every instance in the arena.
    #[must_use]
    pub fn instances(&self) -> &[CardInstance] {
        &self.instances
    }

    /// Look up an instance.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<&CardInstance> {
        self.instances.get(usize::from(id.0))
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> Option<&mut CardInstance> {
        self.instances.get_mut(usize::from(id.0))
    }

    /// Current power of an instance, zero if it does not exist.
    #[must_use]
    pub fn power_of(&self, id: InstanceId) -> u32 {
        self.instance(id).map_or(0, |i| i.power)
    }

    /// Lane and half an instance currently sits on, if it is in play.
    #[must_use]
    pub fn lane_position(&self, id: InstanceId) -> Option<(usize, Side)> {
        self.lanes.iter().enumerate().find_map(|(index, lane)| {
            Side::BOTH
                .into_iter()
                .find(|side| lane.cards(*side).contains(&id))
                .map(|side| (index, side))
        })
    }

    /// Find any instance.
    #[must_use]
    pub fn locate(&self, id: InstanceId) -> Option<Zone> {
        if let Some((lane, side)) = self.lane_position(id) {
            return Some(Zone::Lane(lane, side));
        }
        Side::BOTH.into_iter().find_map(|side| {
            let player = self.player(side);
            if player.hand.contains(&id) {
                Some(Zone::Hand(side))
            } else if player.deck.contains(&id) {
                Some(Zone::Deck(side))
            } else if player.graveyard.contains(&id) {
                Some(Zone::Graveyard(side))
            } else {
                None
            }
        })
    }

    /// Sum of current per-card power on one half of a lane, ignoring the cache.
    #[must_use]
    pub fn live_lane_power(&self, lane: usize, side: Side) -> u32 {
        self.lanes.get(lane).map_or(0, |l| {
            l.cards(side)
                .iter()
                .map(|id| self.power_of(*id))
                .fold(0u32, u32::saturating_add)
        })
    }

    /// Cached lane powers, `[lane][side]`.
    #[must_use]
    pub fn lane_powers(&self) -> [[u32; 2]; LANE_COUNT] {
        let mut out = [[0; 2]; LANE_COUNT];
        for (slot, lane) in out.iter_mut().zip(&self.lanes) {
            *slot = lane.power;
        }
        out
    }

    /// Total power a side has on the board.
    #[must_use]
    pub fn total_power(&self, side: Side) -> u32 {
        (0..LANE_COUNT)
            .map(|lane| self.live_lane_power(lane, side))
            .fold(0u32, u32::saturating_add)
    }

    /// Refresh every lane's cached power from the per-card values.
    pub fn recompute_lanes(&mut self) {
        for lane in 0..LANE_COUNT {
            for side in Side::BOTH {
                let power = self.live_lane_power(lane, side);
                self.lanes[lane].power[side.index()] = power;
            }
        }
    }

    /// Move the top card of `side`'s deck into its hand.
    pub(crate) fn draw(&mut self, side: Side) -> Option<InstanceId> {
        let player = &mut self.players[side.index()];
        let id = player.deck.pop()?;
        player.hand.push(id);
        Some(id)
    }

    /// Move the topmost strong card of `side`'s deck to the top, if any.
    pub(crate) fn lift_strong_card(&mut self, side: Side) {
        let deck = &self.players[side.index()].deck;
        let found = deck.iter().rposition(|id| {
            self.instance(*id)
                .is_some_and(|inst| inst.card.category.is_strong())
        });
        if let Some(pos) = found {
            let deck = &mut self.players[side.index()].deck;
            let id = deck.remove(pos);
            deck.push(id);
        }
    }

    /// Take an instance off whichever lane it is in.
    pub(crate) fn remove_from_lane(&mut self, id: InstanceId) -> Option<(usize, Side)> {
        let (lane, side) = self.lane_position(id)?;
        self.lanes[lane].cards[side.index()].retain(|other| *other != id);
        Some((lane, side))
    }

    /// Send an in-play instance to its owner's graveyard.
    pub(crate) fn bury(&mut self, id: InstanceId) -> bool {
        if self.remove_from_lane(id).is_none() {
            return false;
        }
        let owner = match self.instance(id) {
            Some(inst) => inst.owner,
            None => return false,
        };
        self.players[owner.index()].graveyard.push(id);
        true
    }

    pub(crate) fn log_transfer(&mut self, instance: InstanceId, kind: TransferKind) {
        tracing::debug!(turn = self.turn, instance = instance.0, ?kind, "card transfer");
        self.transfers.push(Transfer {
            turn: self.turn,
            instance,
            kind,
        });
    }

    /// Add a duplicate of `source` to `side`'s hand.
    pub(crate) fn spawn_copy(&mut self, source: InstanceId, side: Side) -> Option<InstanceId> {
        let template = self.instance(source)?;
        let id = InstanceId(u16::try_from(self.instances.len()).ok()?);
        let copy = CardInstance {
            id,
            card: template.card.clone(),
            owner: side,
            origin: Origin::Copy { of: source },
            power: template.card.effective_power(),
            ability: template.ability.clone(),
            played_turn: None,
        };
        self.instances.push(copy);
        self.players[side.index()].hand.push(id);
        self.log_transfer(source, TransferKind::Copied { copy: id });
        Some(id)
    }

    /// Verify that every instance sits in exactly one zone and each seat
    /// still accounts for all of its deck cards.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] describing the first violation.
    pub fn check_conservation(&self) -> Result<()> {
        let mut seen = vec![0u8; self.instances.len()];
        let mut mark = |id: &InstanceId| {
            if let Some(slot) = seen.get_mut(usize::from(id.0)) {
                *slot = slot.saturating_add(1);
            }
        };
        for player in &self.players {
            player.deck.iter().for_each(&mut mark);
            player.hand.iter().for_each(&mut mark);
            player.graveyard.iter().for_each(&mut mark);
        }
        for lane in &self.lanes {
            lane.cards.iter().flatten().for_each(&mut mark);
        }

        if let Some(pos) = seen.iter().position(|count| *count != 1) {
            return Err(GameError::InvalidState(format!(
                "instance {pos} appears in {} zones",
                seen[pos]
            )));
        }

        for side in Side::BOTH {
            let owned = self
                .instances
                .iter()
                .filter(|i| i.owner == side && i.origin == Origin::Deck)
                .count();
            if owned != crate::deck::DECK_SIZE {
                return Err(GameError::InvalidState(format!(
                    "side {side} owns {owned} deck cards"
                )));
            }
        }
        Ok(())
    }

    /// Compute a hash of the match state for determinism checks.
    ///
    /// Covers turn counters, zones, lanes, per-instance power and the
    /// transfer log.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.seed.hash(&mut hasher);
        self.turn.hash(&mut hasher);
        self.energy.hash(&mut hasher);
        self.resolved_turns.hash(&mut hasher);
        self.first_draw_done.hash(&mut hasher);

        for player in &self.players {
            player.deck.hash(&mut hasher);
            player.hand.hash(&mut hasher);
            player.graveyard.hash(&mut hasher);
            player.confirmed.hash(&mut hasher);
            player.cards_played.hash(&mut hasher);
            player.extra_draws.hash(&mut hasher);
        }

        for lane in &self.lanes {
            lane.cards.hash(&mut hasher);
            lane.power.hash(&mut hasher);
        }

        self.instances.len().hash(&mut hasher);
        for inst in &self.instances {
            inst.id.hash(&mut hasher);
            inst.owner.hash(&mut hasher);
            inst.origin.hash(&mut hasher);
            inst.power.hash(&mut hasher);
            inst.played_turn.hash(&mut hasher);
        }

        self.transfers.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize match state to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize match: {e}")))
    }

    /// Deserialize match state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize match: {e}")))
    }
}
