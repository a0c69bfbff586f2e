//! Error types for the match service.

use clash_core::error::GameError;
use thiserror::Error;

use crate::decks::DeckId;
use crate::lifecycle::{MatchId, MatchStatus};
use crate::settlement::StakeTier;

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// How a caller should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was malformed or not allowed. Nothing changed.
    Validation,
    /// The request raced with, or repeated, something already processed.
    StateConflict,
    /// A balance or pool needed for the request is missing.
    Resource,
}

/// Top-level error type for service operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Error from the match engine.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Deck does not exist or belongs to someone else.
    #[error("Deck {0} not found")]
    DeckNotFound(DeckId),

    /// Player has no active deck.
    #[error("Player {0} has no active deck")]
    NoActiveDeck(String),

    /// Unknown match id.
    #[error("Match {0} not found")]
    MatchNotFound(MatchId),

    /// Unknown room code.
    #[error("Room {0} not found")]
    RoomNotFound(String),

    /// The match is not accepting joins.
    #[error("Match {id} is not waiting for players (status: {status:?})")]
    NotWaiting {
        /// Match id.
        id: MatchId,
        /// Current status.
        status: MatchStatus,
    },

    /// A player tried to join the room they created.
    #[error("Cannot join your own match")]
    OwnMatch,

    /// The player is not seated in this match.
    #[error("Player {player} is not part of match {id}")]
    NotParticipant {
        /// Match id.
        id: MatchId,
        /// Player that asked.
        player: String,
    },

    /// Only the creator may cancel a waiting room.
    #[error("Only the creator can cancel match {0}")]
    NotCreator(MatchId),

    /// The match is not in progress.
    #[error("Match {id} is not in progress (status: {status:?})")]
    NotInProgress {
        /// Match id.
        id: MatchId,
        /// Current status.
        status: MatchStatus,
    },

    /// A timeout claim was made while the opponent is still live.
    #[error("Opponent was seen {seen_secs_ago}s ago; timeout needs more than {timeout_secs}s")]
    OpponentStillActive {
        /// Seconds since the opponent's last heartbeat.
        seen_secs_ago: u64,
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// The operation already ran.
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// A defense pool is backing a match, or blocks deleting its deck.
    #[error("Defense pool on deck {0} is in use")]
    DefenseLocked(DeckId),

    /// The player is not in the matchmaking queue.
    #[error("Player {0} is not searching")]
    NotSearching(String),

    /// Not enough balance for a fee or stake.
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        /// Amount required.
        needed: u64,
        /// Amount held.
        available: u64,
    },

    /// No defense deck can cover a match at this tier.
    #[error("No defenders available at tier {0}")]
    NoDefenders(StakeTier),

    /// No other player has an active deck to borrow.
    #[error("No opponent decks available")]
    NoOpponentDecks,

    /// Configuration file could not be read or parsed.
    #[error("Failed to load config '{path}': {message}")]
    Config {
        /// Path of the file.
        path: String,
        /// Error message.
        message: String,
    },
}

impl ServerError {
    /// Classify the error for callers.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Game(GameError::MatchOver | GameError::ActionsAlreadySubmitted(_))
            | Self::NotInProgress { .. }
            | Self::AlreadyProcessed(_)
            | Self::DefenseLocked(_) => ErrorKind::StateConflict,
            Self::InsufficientBalance { .. } | Self::NoDefenders(_) | Self::NoOpponentDecks => {
                ErrorKind::Resource
            }
            _ => ErrorKind::Validation,
        }
    }
}
