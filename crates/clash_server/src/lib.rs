//! # Lane Clash Match Service
//!
//! Stateful service around the [`clash_core`] engine.
//!
//! - [`decks`]: saved decks, one active per player
//! - [`lifecycle`]: rooms, seats, heartbeats, terminal transitions
//! - [`matchmaker`]: tiered search queue with CPU fallback
//! - [`settlement`]: defense pools, staked-match settlement, leaderboard
//! - [`history`]: finished-match log
//! - [`view`]: per-player match views that keep hidden information hidden
//! - [`service`]: the [`ClashService`](service::ClashService) facade and background sweep
//!
//! Balances and ratings live in collaborator services reached through the
//! traits in [`collab`]; in-memory versions are provided for tests and
//! single-process deployments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod clock;
pub mod collab;
pub mod decks;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod matchmaker;
pub mod service;
pub mod settlement;
pub mod view;

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use clash_core::cpu::CpuPolicy;
use clash_core::result::RatingRule;
use clash_core::turn::EngineConfig;

use crate::error::{Result, ServerError};
use crate::matchmaker::SearchWindows;

/// Player identity: a wallet address or account name, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Normalize (trim, lowercase) and wrap.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Normalized form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section leaves its data well-formed before it can panic,
/// so a poisoned lock still guards valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// A timeout victory needs the opponent silent for longer than this.
    pub heartbeat_timeout_secs: u64,
    /// The sweep forfeits a player silent this long while the other is live.
    pub forfeit_grace_secs: u64,
    /// The sweep cancels a match when both players are silent this long.
    pub abandon_grace_secs: u64,
    /// Time allowed per turn before an empty batch is submitted.
    pub turn_secs: u64,
    /// Waiting rooms are cancelled after this.
    pub room_expiry_secs: u64,
    /// How long a searcher waits for a live opponent before the CPU fallback.
    pub live_window_secs: u64,
    /// How long a search entry stays visible.
    pub search_timeout_secs: u64,
    /// Background sweep period.
    pub sweep_interval_secs: u64,
    /// Ended matches stay readable this long before the sweep drops them.
    pub retain_closed_secs: u64,
    /// Default history page size.
    pub history_limit: usize,
    /// Most open rooms listed.
    pub open_rooms_limit: usize,
    /// Rating change for decisive results.
    pub rating: RatingRule,
    /// Engine settings for new matches.
    pub engine: EngineConfig,
    /// CPU opponent tuning.
    pub cpu: CpuPolicy,
    /// Fixed seed for room codes and match seeds; random when absent.
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 60,
            forfeit_grace_secs: 90,
            abandon_grace_secs: 120,
            turn_secs: 20,
            room_expiry_secs: 10 * 60,
            live_window_secs: 10,
            search_timeout_secs: 30,
            sweep_interval_secs: 5,
            retain_closed_secs: 10 * 60,
            history_limit: 20,
            open_rooms_limit: 20,
            rating: RatingRule::default(),
            engine: EngineConfig::default(),
            cpu: CpuPolicy::default(),
            rng_seed: None,
        }
    }
}

impl ServerConfig {
    /// Parse a RON config. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the text is not valid RON.
    pub fn from_ron_str(ron_str: &str) -> Result<Self> {
        ron::from_str(ron_str).map_err(|e| ServerError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a RON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        ron::from_str(&text).map_err(|e| ServerError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Matchmaking windows.
    #[must_use]
    pub const fn search_windows(&self) -> SearchWindows {
        SearchWindows {
            live_window_secs: self.live_window_secs,
            search_timeout_secs: self.search_timeout_secs,
        }
    }
}

/// Prelude for common imports.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::collab::{InMemoryLedger, InMemoryProfiles, Ledger, ProfileStore};
    pub use crate::decks::DeckId;
    pub use crate::error::{ErrorKind, Result, ServerError};
    pub use crate::lifecycle::{EndReason, MatchId, MatchStatus};
    pub use crate::matchmaker::SearchStatus;
    pub use crate::service::ClashService;
    pub use crate::settlement::StakeTier;
    pub use crate::view::MatchView;
    pub use crate::{PlayerId, ServerConfig};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_ids_normalize() {
        assert_eq!(PlayerId::new("  0xABcd "), PlayerId::new("0xabcd"));
        assert_eq!(PlayerId::new("0xABcd").as_str(), "0xabcd");
    }

    #[test]
    fn test_default_config_matches_rules() {
        let config = ServerConfig::default();
        assert_eq!(config.heartbeat_timeout_secs, 60);
        assert_eq!(config.forfeit_grace_secs, 90);
        assert_eq!(config.abandon_grace_secs, 120);
        assert_eq!(config.room_expiry_secs, 600);
        assert_eq!(config.rating.win_gain, 50);
        assert_eq!(config.rating.loss_penalty, 40);
    }

    #[test]
    fn test_partial_ron_config() {
        let config =
            ServerConfig::from_ron_str("(turn_secs: 30, rng_seed: Some(7), engine: (energy_rule: Enforced))")
                .unwrap();
        assert_eq!(config.turn_secs, 30);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.heartbeat_timeout_secs, 60);
        assert_eq!(
            config.engine.energy_rule,
            clash_core::turn::EnergyRule::Enforced
        );
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.ron");
        std::fs::write(&path, "(sweep_interval_secs: 1)").unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap().sweep_interval_secs, 1);
        assert!(ServerConfig::load(dir.path().join("missing.ron")).is_err());
    }
}
