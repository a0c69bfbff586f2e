//! Deck composition rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::Card;
use crate::error::Result;

/// Exact number of cards in a deck.
pub const DECK_SIZE: usize = 12;

/// Minimum number of strong-category cards.
pub const MIN_STRONG: usize = 5;

/// Maximum number of weak-category cards.
pub const MAX_WEAK: usize = 7;

/// The composition rule a rejected deck broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DeckRule {
    /// Wrong number of cards.
    #[error("deck must contain exactly {DECK_SIZE} cards, found {found}")]
    CardCount {
        /// Cards supplied.
        found: usize,
    },
    /// Not enough strong cards.
    #[error("deck needs at least {MIN_STRONG} strong cards, found {found}")]
    TooFewStrong {
        /// Strong cards supplied.
        found: usize,
    },
    /// Too many weak cards.
    #[error("deck allows at most {MAX_WEAK} weak cards, found {found}")]
    TooManyWeak {
        /// Weak cards supplied.
        found: usize,
    },
}

/// A deck that passed [`validate_deck`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedDeck {
    cards: Vec<Card>,
    total_power: u32,
}

impl ValidatedDeck {
    /// The cards, in the order they were supplied.
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Sum of effective power.
    #[must_use]
    pub const fn total_power(&self) -> u32 {
        self.total_power
    }

    /// Give back the card list.
    #[must_use]
    pub fn into_cards(self) -> Vec<Card> {
        self.cards
    }
}

/// Validate a proposed deck.
///
/// Rules are checked in a fixed order (count, then strong minimum, then
/// weak maximum) and the first failure is reported.
///
/// # Errors
///
/// Returns [`GameError::DeckInvalid`](crate::error::GameError::DeckInvalid)
/// naming the violated rule.
///
/// # Example
///
/// ```
/// use clash_core::card::{Card, CardCategory, Rarity};
/// use clash_core::deck::validate_deck;
///
/// let cards: Vec<Card> = (0..12)
///     .map(|i| Card::new(format!("c{i}"), "Plain", CardCategory::Core, Rarity::Common, 10))
///     .collect();
/// let deck = validate_deck(cards).unwrap();
/// assert_eq!(deck.total_power(), 120);
/// ```
pub fn validate_deck(cards: Vec<Card>) -> Result<ValidatedDeck> {
    if cards.len() != DECK_SIZE {
        return Err(DeckRule::CardCount { found: cards.len() }.into());
    }

    let strong = cards.iter().filter(|c| c.category.is_strong()).count();
    if strong < MIN_STRONG {
        return Err(DeckRule::TooFewStrong { found: strong }.into());
    }

    let weak = cards.len() - strong;
    if weak > MAX_WEAK {
        return Err(DeckRule::TooManyWeak { found: weak }.into());
    }

    let total_power = cards.iter().map(Card::effective_power).sum();
    Ok(ValidatedDeck { cards, total_power })
}
