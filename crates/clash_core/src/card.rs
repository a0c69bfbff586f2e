//! Card records and their static properties.
//!
//! Cards arrive fully resolved (ownership and artwork are someone else's
//! problem). The engine only cares about category, rarity, foil and power.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Card category.
///
/// `Core` and `Signature` cards are *strong* and play at full power.
/// `Filler` and `Guest` cards are *weak* and play at half power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CardCategory {
    /// Regular collection card.
    Core,
    /// Player-bound card whose ability comes from its rarity.
    Signature,
    /// Placeholder card used to fill out a deck.
    Filler,
    /// Card borrowed from an outside collection.
    Guest,
}

impl CardCategory {
    /// Whether cards of this category play at full power.
    #[must_use]
    pub const fn is_strong(self) -> bool {
        matches!(self, Self::Core | Self::Signature)
    }

    /// Whether cards of this category are halved.
    #[must_use]
    pub const fn is_weak(self) -> bool {
        !self.is_strong()
    }
}

/// Rarity tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Rarity {
    /// No rarity metadata.
    #[default]
    Unranked,
    /// Common.
    Common,
    /// Rare.
    Rare,
    /// Epic.
    Epic,
    /// Legendary.
    Legendary,
    /// Mythic.
    Mythic,
}

impl Rarity {
    /// All tiers, lowest first.
    pub const ALL: [Self; 6] = [
        Self::Unranked,
        Self::Common,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
        Self::Mythic,
    ];

    /// Energy needed to play a card of this tier before foil discounts.
    #[must_use]
    pub const fn energy_cost(self) -> u8 {
        match self {
            Self::Unranked => 1,
            Self::Common => 2,
            Self::Rare => 3,
            Self::Epic => 4,
            Self::Legendary => 5,
            Self::Mythic => 6,
        }
    }
}

/// Foil finish.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Foil {
    /// Plain card.
    #[default]
    None,
    /// Standard foil.
    Standard,
    /// Prize foil.
    Prize,
}

impl Foil {
    /// Power handed to another card when this card is sacrificed from a lane.
    ///
    /// ```
    /// use clash_core::card::Foil;
    ///
    /// assert_eq!(Foil::None.sacrifice_buff(30), 30);
    /// assert_eq!(Foil::Standard.sacrifice_buff(25), 37);
    /// assert_eq!(Foil::Prize.sacrifice_buff(25), 50);
    /// ```
    #[must_use]
    pub const fn sacrifice_buff(self, effective_power: u32) -> u32 {
        match self {
            Self::None => effective_power,
            Self::Standard => effective_power.saturating_mul(3) / 2,
            Self::Prize => effective_power.saturating_mul(2),
        }
    }

    /// Apply the foil energy discount. Never drops below 1.
    #[must_use]
    pub const fn discounted_cost(self, cost: u8) -> u8 {
        let discounted = match self {
            Self::None => cost,
            Self::Standard => cost / 2,
            Self::Prize => 0,
        };
        if discounted == 0 {
            1
        } else {
            discounted
        }
    }
}

/// A fully resolved card record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Stable identifier (token id or catalog key).
    pub id: String,
    /// Display name. Abilities are looked up by this.
    pub name: String,
    /// Category.
    pub category: CardCategory,
    /// Rarity tier.
    #[serde(default)]
    pub rarity: Rarity,
    /// Foil finish.
    #[serde(default)]
    pub foil: Foil,
    /// Printed power.
    pub base_power: u32,
    /// Opaque presentation data, carried through untouched.
    #[serde(default)]
    pub metadata: Option<String>,
}

impl Card {
    /// Create a plain, non-foil card.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: CardCategory,
        rarity: Rarity,
        base_power: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            rarity,
            foil: Foil::None,
            base_power,
            metadata: None,
        }
    }

    /// Builder-style foil setter.
    #[must_use]
    pub fn with_foil(mut self, foil: Foil) -> Self {
        self.foil = foil;
        self
    }

    /// Power this card enters play with.
    ///
    /// Weak categories are halved, rounding down.
    #[must_use]
    pub const fn effective_power(&self) -> u32 {
        if self.category.is_strong() {
            self.base_power
        } else {
            self.base_power / 2
        }
    }

    /// Energy needed to play this card.
    #[must_use]
    pub const fn energy_cost(&self) -> u8 {
        self.foil.discounted_cost(self.rarity.energy_cost())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_cards_play_at_half_power() {
        let filler = Card::new("f", "Filler", CardCategory::Filler, Rarity::Common, 41);
        let guest = Card::new("g", "Guest", CardCategory::Guest, Rarity::Common, 1);
        assert_eq!(filler.effective_power(), 20);
        assert_eq!(guest.effective_power(), 0);
    }

    #[test]
    fn test_strong_cards_keep_base_power() {
        let core = Card::new("c", "Core", CardCategory::Core, Rarity::Epic, 41);
        let sig = Card::new("s", "Sig", CardCategory::Signature, Rarity::Mythic, 7);
        assert_eq!(core.effective_power(), 41);
        assert_eq!(sig.effective_power(), 7);
    }

    #[test]
    fn test_energy_cost_by_rarity_and_foil() {
        let mythic = Card::new("m", "M", CardCategory::Core, Rarity::Mythic, 10);
        assert_eq!(mythic.energy_cost(), 6);
        assert_eq!(mythic.clone().with_foil(Foil::Standard).energy_cost(), 3);
        assert_eq!(mythic.with_foil(Foil::Prize).energy_cost(), 1);

        let unranked = Card::new("u", "U", CardCategory::Core, Rarity::Unranked, 10);
        assert_eq!(unranked.with_foil(Foil::Standard).energy_cost(), 1);
    }

    #[test]
    fn test_sacrifice_buff_floors() {
        assert_eq!(Foil::Standard.sacrifice_buff(3), 4);
        assert_eq!(Foil::Standard.sacrifice_buff(0), 0);
        assert_eq!(Foil::Prize.sacrifice_buff(u32::MAX), u32::MAX);
    }
}
