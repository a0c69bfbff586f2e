//! Error types for the match engine.

use thiserror::Error;

use crate::deck::DeckRule;
use crate::state::Side;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all match engine errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// A proposed deck broke a composition rule.
    #[error("Deck invalid: {0}")]
    DeckInvalid(#[from] DeckRule),

    /// A submitted action referenced something that does not exist.
    #[error("Invalid action #{index} for side {side}: {reason}")]
    InvalidAction {
        /// Side that submitted the batch.
        side: Side,
        /// Position of the action within the batch.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The side already confirmed this turn.
    #[error("Side {0} already submitted actions for this turn")]
    ActionsAlreadySubmitted(Side),

    /// The match reached its terminal turn.
    #[error("Match is already over")]
    MatchOver,

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or embedded name) of the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid match state.
    #[error("Invalid match state: {0}")]
    InvalidState(String),

    /// A replay did not reproduce its recorded final state.
    #[error("Replay diverged at turn {turn}: expected hash {expected}, got {actual}")]
    ReplayDiverged {
        /// Last turn replayed.
        turn: u8,
        /// Hash stored in the replay.
        expected: u64,
        /// Hash produced by re-running it.
        actual: u64,
    },
}
