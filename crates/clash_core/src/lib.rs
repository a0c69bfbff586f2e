//! # Clash Core
//!
//! Deterministic match engine for Lane Clash, a simultaneous-turn card battler.
//!
//! This crate contains **only** deterministic logic:
//! - No IO (the ability catalog is embedded at compile time)
//! - No wall clock
//! - No system randomness (every roll comes from the match seed)
//!
//! This separation enables:
//! - A server that wraps each match in a lock and never blocks inside it
//! - Replays that re-run a match bit-for-bit from its seed and actions
//! - Property tests over whole matches
//!
//! ## Crate Structure
//!
//! - [`card`] - Card records, categories, rarity and foil tiers
//! - [`deck`] - Deck composition rules
//! - [`ability`] - Effect descriptors, the name-keyed catalog and effect dispatch
//! - [`state`] - Match state arena (zones, lanes, transfer log)
//! - [`turn`] - Initialization and simultaneous turn resolution
//! - [`result`] - Lane scoring, match verdicts, rating deltas
//! - [`cpu`] - Synthetic opponent policy
//! - [`replay`] - Replay recording and verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ability;
pub mod action;
pub mod card;
pub mod cpu;
pub mod deck;
pub mod error;
pub mod replay;
pub mod result;
pub mod rng;
pub mod state;
pub mod turn;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ability::{Ability, AbilityBook, Effect, Timing};
    pub use crate::action::Action;
    pub use crate::card::{Card, CardCategory, Foil, Rarity};
    pub use crate::deck::{validate_deck, DeckRule, ValidatedDeck, DECK_SIZE};
    pub use crate::error::{GameError, Result};
    pub use crate::result::{LaneResult, MatchScore, RatingRule, Winner};
    pub use crate::state::{GameState, InstanceId, Side, LANE_COUNT};
    pub use crate::turn::{EnergyRule, EngineConfig, TurnOutcome, FINAL_TURN};
}
