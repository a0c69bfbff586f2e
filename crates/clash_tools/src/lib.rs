//! # Lane Clash Tools
//!
//! Command-line tools for operators:
//! - Ability catalog and deck file validation
//! - Batch CPU-vs-CPU simulations for balance checks
//! - Replay verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod simulate;
pub mod validate;

use clash_core::error::GameError;
use thiserror::Error;

/// Errors from tool commands.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A file could not be read or written.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A data file did not parse.
    #[error("Failed to parse '{path}': {message}")]
    Parse {
        /// File involved.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Error from the engine.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Result type alias using [`ToolError`].
pub type Result<T> = std::result::Result<T, ToolError>;
