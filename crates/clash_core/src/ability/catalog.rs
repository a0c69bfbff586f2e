//! Name-keyed ability catalog.
//!
//! The catalog is plain RON data. The built-in copy is embedded at compile
//! time; operators can load a replacement with [`AbilityBook::from_ron_str`].
//!
//! # Example RON
//!
//! ```ron
//! AbilityCatalog(
//!     aliases: { "old name": "new name" },
//!     cards: {
//!         "new name": (timing: Immediate, effect: BuffSelf(amount: 10), text: "+10"),
//!     },
//!     signature: (common: ..., rare: ..., epic: ..., legendary: ..., mythic: ...),
//! )
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Ability, Effect};
use crate::card::{Card, CardCategory, Rarity};
use crate::error::{GameError, Result};

const BUILTIN: &str = include_str!("../../data/abilities.ron");

/// Abilities for [`CardCategory::Signature`] cards, keyed by rarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureAbilities {
    /// Common tier.
    pub common: Ability,
    /// Rare tier.
    pub rare: Ability,
    /// Epic tier.
    pub epic: Ability,
    /// Legendary tier.
    pub legendary: Ability,
    /// Mythic tier.
    pub mythic: Ability,
}

impl SignatureAbilities {
    fn for_rarity(&self, rarity: Rarity) -> Option<&Ability> {
        match rarity {
            Rarity::Unranked => None,
            Rarity::Common => Some(&self.common),
            Rarity::Rare => Some(&self.rare),
            Rarity::Epic => Some(&self.epic),
            Rarity::Legendary => Some(&self.legendary),
            Rarity::Mythic => Some(&self.mythic),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "AbilityCatalog")]
struct CatalogFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    cards: BTreeMap<String, Ability>,
    signature: SignatureAbilities,
}

/// Lookup table from card to ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityBook {
    aliases: BTreeMap<String, String>,
    cards: BTreeMap<String, Ability>,
    signature: SignatureAbilities,
}

/// Canonical form of a card name: lowercase ASCII alphanumerics separated by
/// single spaces.
///
/// ```
/// use clash_core::ability::normalize_name;
///
/// assert_eq!(normalize_name("  Ember-Scout!! "), "ember scout");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl AbilityBook {
    /// The catalog shipped with the engine.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the embedded file is malformed.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN, "<builtin abilities.ron>")
    }

    /// Load a catalog from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid catalog.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        Self::parse(ron, "<string>")
    }

    /// Load a catalog from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&contents, &path.display().to_string())
    }

    fn parse(ron: &str, origin: &str) -> Result<Self> {
        let file: CatalogFile = ron::from_str(ron).map_err(|e| GameError::DataParseError {
            path: origin.to_string(),
            message: e.to_string(),
        })?;

        let cards = file
            .cards
            .into_iter()
            .map(|(name, ability)| (normalize_name(&name), ability))
            .collect();
        let aliases = file
            .aliases
            .into_iter()
            .map(|(from, to)| (normalize_name(&from), normalize_name(&to)))
            .collect();

        Ok(Self {
            aliases,
            cards,
            signature: file.signature,
        })
    }

    /// Ability for a card, if it has one.
    ///
    /// Signature cards use the ability of their rarity tier. Everything else
    /// is looked up by normalized name, following one alias hop. Unknown
    /// cards have no ability.
    #[must_use]
    pub fn ability_for(&self, card: &Card) -> Option<&Ability> {
        if card.category == CardCategory::Signature {
            return self.signature.for_rarity(card.rarity);
        }
        self.by_name(&card.name)
    }

    /// Ability registered under a name (or an alias of it).
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Ability> {
        let key = normalize_name(name);
        let key = self.aliases.get(&key).unwrap_or(&key);
        self.cards.get(key)
    }

    /// Registered card names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cards.keys().map(String::as_str)
    }

    /// Number of named abilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the catalog has no named abilities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Problems that parse fine but make a catalog unusable.
    #[must_use]
    pub fn lint(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (from, to) in &self.aliases {
            if !self.cards.contains_key(to) {
                problems.push(format!("alias '{from}' points at unknown card '{to}'"));
            }
            if self.cards.contains_key(from) {
                problems.push(format!("alias '{from}' shadows a card of the same name"));
            }
        }
        for (name, ability) in &self.cards {
            if name.is_empty() {
                problems.push("card with an empty name".to_string());
            }
            if let Some(problem) = lint_effect(&ability.effect) {
                problems.push(format!("'{name}': {problem}"));
            }
        }
        problems
    }
}

fn lint_effect(effect: &Effect) -> Option<String> {
    match effect {
        Effect::Destroy { absorb_percent, .. } if *absorb_percent > 100 => {
            Some(format!("absorbs {absorb_percent}% (max 100)"))
        }
        Effect::CopyStrongestFriendly { percent } | Effect::AbsorbEnemyLane { percent }
            if *percent > 200 =>
        {
            Some(format!("share of {percent}% is implausible"))
        }
        Effect::Conditional { then, .. } => match then.as_ref() {
            Effect::Conditional { .. } => Some("nested conditionals".to_string()),
            other => lint_effect(other),
        },
        _ => None,
    }
}
