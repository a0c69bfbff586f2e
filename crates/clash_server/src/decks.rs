//! Saved decks.
//!
//! A player may keep any number of decks; at most one is active. Decks are
//! validated once on save and stored with their computed total power.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use clash_core::card::Card;
use clash_core::deck::validate_deck;

use crate::clock::Millis;
use crate::error::{Result, ServerError};
use crate::{lock, PlayerId};

/// Deck identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeckId(pub u64);

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deck-{}", self.0)
    }
}

/// A stored deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDeck {
    /// Identifier.
    pub id: DeckId,
    /// Owner.
    pub owner: PlayerId,
    /// Display name.
    pub name: String,
    /// Validated cards.
    pub cards: Vec<Card>,
    /// Sum of effective power.
    pub total_power: u32,
    /// Whether this is the owner's active deck.
    pub active: bool,
    /// When it was saved.
    pub created_at: Millis,
}

/// What [`DeckStore::save`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDeck {
    /// New deck id.
    pub id: DeckId,
    /// Computed total power.
    pub total_power: u32,
}

/// All saved decks.
#[derive(Debug, Default)]
pub struct DeckStore {
    decks: Mutex<BTreeMap<DeckId, StoredDeck>>,
    next_id: AtomicU64,
}

impl DeckStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and save a deck, optionally making it active.
    ///
    /// # Errors
    ///
    /// Returns the violated deck rule if the cards do not form a legal deck.
    pub fn save(
        &self,
        owner: &PlayerId,
        name: &str,
        cards: Vec<Card>,
        set_active: bool,
        now: Millis,
    ) -> Result<SavedDeck> {
        let deck = validate_deck(cards)?;
        let id = DeckId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let total_power = deck.total_power();

        let mut decks = lock(&self.decks);
        if set_active {
            for d in decks.values_mut().filter(|d| &d.owner == owner) {
                d.active = false;
            }
        }
        decks.insert(
            id,
            StoredDeck {
                id,
                owner: owner.clone(),
                name: name.to_string(),
                cards: deck.into_cards(),
                total_power,
                active: set_active,
                created_at: now,
            },
        );
        info!(%owner, %id, total_power, active = set_active, "deck saved");
        Ok(SavedDeck { id, total_power })
    }

    /// Make `id` the owner's only active deck. Activating the active deck is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DeckNotFound`] if the deck is missing or not owned by `owner`.
    pub fn set_active(&self, owner: &PlayerId, id: DeckId) -> Result<()> {
        let mut decks = lock(&self.decks);
        match decks.get(&id) {
            Some(d) if &d.owner == owner => {}
            _ => return Err(ServerError::DeckNotFound(id)),
        }
        for d in decks.values_mut().filter(|d| &d.owner == owner) {
            d.active = d.id == id;
        }
        Ok(())
    }

    /// Remove a deck.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DeckNotFound`] if the deck is missing or not owned by `owner`.
    pub fn delete(&self, owner: &PlayerId, id: DeckId) -> Result<StoredDeck> {
        let mut decks = lock(&self.decks);
        match decks.get(&id) {
            Some(d) if &d.owner == owner => {}
            _ => return Err(ServerError::DeckNotFound(id)),
        }
        decks.remove(&id).ok_or(ServerError::DeckNotFound(id))
    }

    /// Look up a deck by id.
    #[must_use]
    pub fn get(&self, id: DeckId) -> Option<StoredDeck> {
        lock(&self.decks).get(&id).cloned()
    }

    /// A player's decks, oldest first.
    #[must_use]
    pub fn for_player(&self, owner: &PlayerId) -> Vec<StoredDeck> {
        lock(&self.decks)
            .values()
            .filter(|d| &d.owner == owner)
            .cloned()
            .collect()
    }

    /// A player's active deck.
    #[must_use]
    pub fn active(&self, owner: &PlayerId) -> Option<StoredDeck> {
        lock(&self.decks)
            .values()
            .find(|d| &d.owner == owner && d.active)
            .cloned()
    }

    /// Active decks of everyone except `exclude`, in id order.
    #[must_use]
    pub fn active_excluding(&self, exclude: &PlayerId) -> Vec<StoredDeck> {
        lock(&self.decks)
            .values()
            .filter(|d| d.active && &d.owner != exclude)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clash_core::deck::DeckRule;
    use clash_core::error::GameError;
    use clash_test_utils::fixtures;

    #[test]
    fn test_save_reports_power() {
        let store = DeckStore::new();
        let owner = PlayerId::new("alice");
        let saved = store
            .save(&owner, "main", fixtures::plain_cards("a", 10), true, 0)
            .unwrap();
        assert_eq!(saved.total_power, 120);
        assert_eq!(store.active(&owner).unwrap().id, saved.id);
    }

    #[test]
    fn test_save_rejects_bad_deck() {
        let store = DeckStore::new();
        let mut cards = fixtures::plain_cards("a", 10);
        cards.truncate(4);
        let err = store
            .save(&PlayerId::new("alice"), "tiny", cards, false, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Game(GameError::DeckInvalid(DeckRule::CardCount { found: 4 }))
        ));
        assert!(store.for_player(&PlayerId::new("alice")).is_empty());
    }

    #[test]
    fn test_only_one_active_deck() {
        let store = DeckStore::new();
        let owner = PlayerId::new("alice");
        let first = store
            .save(&owner, "one", fixtures::plain_cards("a", 10), true, 0)
            .unwrap();
        let second = store
            .save(&owner, "two", fixtures::plain_cards("b", 10), true, 1)
            .unwrap();
        assert_eq!(store.active(&owner).unwrap().id, second.id);

        store.set_active(&owner, first.id).unwrap();
        store.set_active(&owner, first.id).unwrap();
        let active: Vec<_> = store
            .for_player(&owner)
            .into_iter()
            .filter(|d| d.active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
    }

    #[test]
    fn test_cannot_touch_other_players_deck() {
        let store = DeckStore::new();
        let saved = store
            .save(&PlayerId::new("alice"), "main", fixtures::plain_cards("a", 10), false, 0)
            .unwrap();
        let bob = PlayerId::new("bob");
        assert!(store.set_active(&bob, saved.id).is_err());
        assert!(store.delete(&bob, saved.id).is_err());
        assert!(store.get(saved.id).is_some());
    }
}
