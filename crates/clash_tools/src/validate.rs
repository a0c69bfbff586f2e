//! Data validation for ability catalogs and deck files.
//!
//! A file whose first token is `[` is read as a deck (a RON list of cards);
//! anything else is read as an ability catalog.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use clash_core::ability::AbilityBook;
use clash_core::card::Card;
use clash_core::deck::validate_deck;

use crate::{Result, ToolError};

/// What kind of data a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataKind {
    /// Ability catalog.
    Catalog,
    /// Deck card list.
    Deck,
}

/// Outcome of checking one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// File checked.
    pub path: PathBuf,
    /// How it was read.
    pub kind: DataKind,
    /// Rule violations. Empty means the file is usable.
    pub problems: Vec<String>,
    /// Informational notes that do not fail validation.
    pub notes: Vec<String>,
}

impl FileReport {
    /// Whether the file passed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn kind_of(text: &str) -> DataKind {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("//"));
    match first {
        Some(line) if line.starts_with('[') => DataKind::Deck,
        _ => DataKind::Catalog,
    }
}

/// Parse a deck file into its cards without checking composition.
///
/// # Errors
///
/// Returns [`ToolError::Io`] or [`ToolError::Parse`].
pub fn load_deck(path: &Path) -> Result<Vec<Card>> {
    let text = read(path)?;
    ron::from_str(&text).map_err(|e| ToolError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Check an ability catalog: it must parse and pass the catalog lints.
///
/// # Errors
///
/// Returns [`ToolError::Io`] if the file cannot be read. Parse failures are
/// reported as problems.
pub fn validate_catalog(path: &Path) -> Result<FileReport> {
    let text = read(path)?;
    let mut report = FileReport {
        path: path.to_path_buf(),
        kind: DataKind::Catalog,
        problems: Vec::new(),
        notes: Vec::new(),
    };
    match AbilityBook::from_ron_str(&text) {
        Ok(book) => {
            report.problems = book.lint();
            report.notes.push(format!("{} named abilities", book.len()));
        }
        Err(e) => report.problems.push(e.to_string()),
    }
    Ok(report)
}

/// Check a deck file against the composition rules. Cards with no ability
/// in `book` are listed as notes.
///
/// # Errors
///
/// Returns [`ToolError::Io`] if the file cannot be read. Parse failures are
/// reported as problems.
pub fn validate_deck_file(path: &Path, book: &AbilityBook) -> Result<FileReport> {
    let mut report = FileReport {
        path: path.to_path_buf(),
        kind: DataKind::Deck,
        problems: Vec::new(),
        notes: Vec::new(),
    };
    let cards = match load_deck(path) {
        Ok(cards) => cards,
        Err(ToolError::Parse { message, .. }) => {
            report.problems.push(message);
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    let plain: Vec<&str> = cards
        .iter()
        .filter(|c| book.ability_for(c).is_none())
        .map(|c| c.name.as_str())
        .collect();
    if !plain.is_empty() {
        report
            .notes
            .push(format!("no ability for: {}", plain.join(", ")));
    }

    match validate_deck(cards) {
        Ok(deck) => report
            .notes
            .push(format!("total power {}", deck.total_power())),
        Err(e) => report.problems.push(e.to_string()),
    }
    Ok(report)
}

/// Validate a file, or every `.ron` file in a directory (sorted by name).
///
/// # Errors
///
/// Returns [`ToolError::Io`] if the path or one of its files cannot be read.
pub fn validate_path(path: &Path, book: &AbilityBook) -> Result<Vec<FileReport>> {
    if !path.is_dir() {
        return validate_file(path, book).map(|r| vec![r]);
    }
    let entries = std::fs::read_dir(path).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "ron"))
        .collect();
    files.sort();
    files.iter().map(|f| validate_file(f, book)).collect()
}

fn validate_file(path: &Path, book: &AbilityBook) -> Result<FileReport> {
    let kind = kind_of(&read(path)?);
    debug!(path = %path.display(), ?kind, "validating");
    match kind {
        DataKind::Catalog => validate_catalog(path),
        DataKind::Deck => validate_deck_file(path, book),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clash_test_utils::fixtures;

    fn write_deck(dir: &Path, name: &str, cards: &[Card]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, ron::to_string(cards).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_kind_detection_skips_comments() {
        assert_eq!(kind_of("// deck\n\n[ ]"), DataKind::Deck);
        assert_eq!(kind_of("AbilityCatalog(cards: {})"), DataKind::Catalog);
    }

    #[test]
    fn test_valid_and_invalid_decks() {
        let dir = tempfile::tempdir().unwrap();
        let book = AbilityBook::builtin().unwrap();
        let good = write_deck(dir.path(), "good.ron", &fixtures::plain_cards("g", 10));
        let short = write_deck(dir.path(), "short.ron", &fixtures::plain_cards("s", 10)[..11]);

        let report = validate_deck_file(&good, &book).unwrap();
        assert!(report.is_ok());
        assert!(report.notes.iter().any(|n| n == "total power 120"));

        let report = validate_deck_file(&short, &book).unwrap();
        assert!(!report.is_ok());
        assert!(report.problems[0].contains("exactly 12"));
    }

    #[test]
    fn test_catalog_lint_and_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad_alias = dir.path().join("a.ron");
        let text = include_str!("../../clash_core/data/abilities.ron")
            .replacen("aliases: {", "aliases: {\n        \"Ghost\": \"Nobody\",", 1);
        std::fs::write(&bad_alias, text).unwrap();
        let broken = dir.path().join("b.ron");
        std::fs::write(&broken, "AbilityCatalog(cards: {").unwrap();

        let reports = validate_path(dir.path(), &AbilityBook::builtin().unwrap()).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].problems[0].contains("unknown card"));
        assert_eq!(reports[1].kind, DataKind::Catalog);
        assert!(!reports[1].is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let book = AbilityBook::builtin().unwrap();
        assert!(matches!(
            validate_path(Path::new("/definitely/not/here.ron"), &book),
            Err(ToolError::Io { .. })
        ));
    }
}
