//! Test fixtures and helpers.
//!
//! Pre-built cards and decks for consistent testing. Every deck built here
//! passes validation; helpers panic otherwise, which is what tests want.

use clash_core::card::{Card, CardCategory, Foil, Rarity};
use clash_core::deck::{validate_deck, ValidatedDeck};

/// A strong card with no ability.
#[must_use]
pub fn strong(id: &str, power: u32) -> Card {
    Card::new(id, "Plain Recruit", CardCategory::Core, Rarity::Common, power)
}

/// A weak card with no ability.
#[must_use]
pub fn weak(id: &str, power: u32) -> Card {
    Card::new(id, "Plain Extra", CardCategory::Filler, Rarity::Common, power)
}

/// Twelve strong cards of equal power, no abilities.
///
/// # Panics
///
/// Never, the composition is always valid.
#[must_use]
pub fn plain_deck(prefix: &str, power: u32) -> ValidatedDeck {
    let cards = (0..12).map(|i| strong(&format!("{prefix}-{i}"), power)).collect();
    validate_deck(cards).expect("plain deck is valid")
}

/// The raw card list behind [`plain_deck`].
#[must_use]
pub fn plain_cards(prefix: &str, power: u32) -> Vec<Card> {
    plain_deck(prefix, power).into_cards()
}

/// Minimum legal mix: five strong and seven weak cards.
///
/// # Panics
///
/// Never, the composition is always valid.
#[must_use]
pub fn mixed_deck(prefix: &str) -> ValidatedDeck {
    let mut cards = Vec::with_capacity(12);
    for i in 0..5 {
        cards.push(strong(&format!("{prefix}-s{i}"), 30));
    }
    for i in 0..7 {
        cards.push(weak(&format!("{prefix}-w{i}"), 20));
    }
    validate_deck(cards).expect("mixed deck is valid")
}

/// Card names from the built-in catalog, one per effect family.
pub const ABILITY_NAMES: [&str; 12] = [
    "Ember Scout",
    "Banner Bearer",
    "Frost Caller",
    "Sniper",
    "Devourer",
    "Pickpocket",
    "Tollkeeper",
    "Courier",
    "Mirrorling",
    "Dice Roller",
    "Growing Sapling",
    "Blight",
];

/// A deck where every card carries a built-in ability, with varied
/// rarities and foils.
///
/// # Panics
///
/// Never, the composition is always valid.
#[must_use]
pub fn ability_deck(prefix: &str) -> ValidatedDeck {
    let rarities = [Rarity::Common, Rarity::Rare, Rarity::Epic, Rarity::Legendary];
    let foils = [Foil::None, Foil::None, Foil::Standard, Foil::Prize];
    let cards = ABILITY_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let category = if i % 3 == 2 {
                CardCategory::Guest
            } else {
                CardCategory::Core
            };
            Card::new(
                format!("{prefix}-{i}"),
                *name,
                category,
                rarities[i % rarities.len()],
                12 + 3 * u32::try_from(i).unwrap_or(0),
            )
            .with_foil(foils[i % foils.len()])
        })
        .collect();
    validate_deck(cards).expect("ability deck is valid")
}

/// A deck of signature cards, one of each ranked rarity, padded with plain strong cards.
///
/// # Panics
///
/// Never, the composition is always valid.
#[must_use]
pub fn signature_deck(prefix: &str) -> ValidatedDeck {
    let mut cards: Vec<Card> = Rarity::ALL
        .iter()
        .skip(1)
        .enumerate()
        .map(|(i, rarity)| {
            Card::new(
                format!("{prefix}-sig{i}"),
                "Signature",
                CardCategory::Signature,
                *rarity,
                25,
            )
        })
        .collect();
    while cards.len() < 12 {
        let i = cards.len();
        cards.push(strong(&format!("{prefix}-p{i}"), 15));
    }
    validate_deck(cards).expect("signature deck is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_decks_are_valid() {
        assert_eq!(plain_deck("p", 10).total_power(), 120);
        assert_eq!(mixed_deck("m").total_power(), 5 * 30 + 7 * 10);
        assert_eq!(ability_deck("a").cards().len(), 12);
        assert_eq!(signature_deck("s").cards().len(), 12);
    }
}
