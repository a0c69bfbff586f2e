//! Matchmaking queue.
//!
//! Searchers are grouped by stake tier (or none, for free play). A poll pairs
//! the caller with the longest-waiting live searcher of the same tier; both
//! entries leave the queue in the same critical section that creates the
//! match, so a third searcher can never claim either of them. A caller that
//! finds nobody within the live window is told to fall back to a CPU opponent.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{elapsed_ms, secs_between, secs_to_ms, Millis};
use crate::error::{Result, ServerError};
use crate::lifecycle::MatchId;
use crate::settlement::StakeTier;
use crate::{lock, PlayerId};

/// One searching player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    /// Who is searching.
    pub player: PlayerId,
    /// Display name.
    pub username: String,
    /// Stake tier, `None` for free play.
    pub tier: Option<StakeTier>,
    /// When the search started (or was refreshed).
    pub started_at: Millis,
}

/// What a poll found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStatus {
    /// The player is not in the queue.
    Idle,
    /// Still looking.
    Searching {
        /// Seconds since the search started.
        waited_secs: u64,
    },
    /// Paired into a match.
    Matched(MatchId),
    /// Nobody showed up in time; play the CPU instead.
    FallBack {
        /// Tier that was searched.
        tier: Option<StakeTier>,
    },
}

/// Timing knobs, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindows {
    /// How long a caller waits for a live opponent before falling back.
    pub live_window_secs: u64,
    /// How long an entry stays visible to others.
    pub search_timeout_secs: u64,
}

impl SearchWindows {
    /// Whether an entry started at `started_at` is still visible.
    #[must_use]
    pub const fn is_live(&self, started_at: Millis, now: Millis) -> bool {
        elapsed_ms(started_at, now) <= secs_to_ms(self.search_timeout_secs)
    }
}

#[derive(Debug, Default)]
struct Queue {
    entries: Vec<SearchEntry>,
    /// Pairings not yet picked up by a poll, with when they were made.
    matched: HashMap<PlayerId, (MatchId, Millis)>,
}

/// The matchmaking queue.
#[derive(Debug, Default)]
pub struct Matchmaker {
    inner: Mutex<Queue>,
}

impl Matchmaker {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) searching.
    pub fn start(&self, player: &PlayerId, username: &str, tier: Option<StakeTier>, now: Millis) {
        let mut queue = lock(&self.inner);
        queue.matched.remove(player);
        queue.entries.retain(|e| &e.player != player);
        queue.entries.push(SearchEntry {
            player: player.clone(),
            username: username.to_string(),
            tier,
            started_at: now,
        });
        debug!(%player, ?tier, "search started");
    }

    /// Stop searching. Returns `false` if the player was not in the queue.
    pub fn cancel(&self, player: &PlayerId) -> bool {
        let mut queue = lock(&self.inner);
        let before = queue.entries.len();
        queue.entries.retain(|e| &e.player != player);
        queue.matched.remove(player);
        before != queue.entries.len()
    }

    /// Check on a search, pairing the caller if a live opponent is waiting.
    ///
    /// `create` builds the match for `(caller, opponent)`; it runs while the
    /// queue is locked and the entries are only removed if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns whatever `create` returns.
    pub fn poll<F>(
        &self,
        player: &PlayerId,
        now: Millis,
        windows: SearchWindows,
        create: F,
    ) -> Result<SearchStatus>
    where
        F: FnOnce(&SearchEntry, &SearchEntry) -> Result<MatchId>,
    {
        let mut queue = lock(&self.inner);
        if let Some((id, _)) = queue.matched.remove(player) {
            return Ok(SearchStatus::Matched(id));
        }
        let Some(own) = queue.entries.iter().find(|e| &e.player == player).cloned() else {
            return Ok(SearchStatus::Idle);
        };

        let opponent = queue
            .entries
            .iter()
            .filter(|e| {
                &e.player != player
                    && e.tier == own.tier
                    && windows.is_live(e.started_at, now)
            })
            .min_by_key(|e| e.started_at)
            .cloned();

        if let Some(opponent) = opponent {
            let id = create(&own, &opponent)?;
            queue
                .entries
                .retain(|e| e.player != own.player && e.player != opponent.player);
            queue.matched.insert(opponent.player.clone(), (id, now));
            info!(a = %own.player, b = %opponent.player, %id, tier = ?own.tier, "searchers paired");
            return Ok(SearchStatus::Matched(id));
        }

        let waited_secs = secs_between(own.started_at, now);
        if elapsed_ms(own.started_at, now) >= secs_to_ms(windows.live_window_secs) {
            queue.entries.retain(|e| &e.player != player);
            debug!(%player, waited_secs, "no live opponent, falling back");
            return Ok(SearchStatus::FallBack { tier: own.tier });
        }
        Ok(SearchStatus::Searching { waited_secs })
    }

    /// Pair two named searchers directly.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotSearching`] unless both are live in the
    /// queue at the same tier, or whatever `create` returns.
    pub fn pair<F>(
        &self,
        a: &PlayerId,
        b: &PlayerId,
        now: Millis,
        windows: SearchWindows,
        create: F,
    ) -> Result<MatchId>
    where
        F: FnOnce(&SearchEntry, &SearchEntry) -> Result<MatchId>,
    {
        let mut queue = lock(&self.inner);
        let live = |p: &PlayerId| {
            queue
                .entries
                .iter()
                .find(|e| &e.player == p && windows.is_live(e.started_at, now))
                .cloned()
                .ok_or_else(|| ServerError::NotSearching(p.to_string()))
        };
        let first = live(a)?;
        let second = live(b)?;
        if a == b || first.tier != second.tier {
            return Err(ServerError::NotSearching(b.to_string()));
        }
        let id = create(&first, &second)?;
        queue.entries.retain(|e| &e.player != a && &e.player != b);
        queue.matched.insert(a.clone(), (id, now));
        queue.matched.insert(b.clone(), (id, now));
        Ok(id)
    }

    /// Drop entries nobody can see any more, and pairings nobody polled
    /// for within the search timeout. Returns how many search entries were
    /// removed.
    pub fn sweep(&self, now: Millis, windows: SearchWindows) -> usize {
        let mut queue = lock(&self.inner);
        let before = queue.entries.len();
        queue.entries.retain(|e| windows.is_live(e.started_at, now));
        queue
            .matched
            .retain(|_, (_, paired_at)| windows.is_live(*paired_at, now));
        before - queue.entries.len()
    }

    /// Pairings waiting to be picked up by a poll.
    #[must_use]
    pub fn unclaimed_pairings(&self) -> usize {
        lock(&self.inner).matched.len()
    }

    /// Entries in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS: SearchWindows = SearchWindows {
        live_window_secs: 10,
        search_timeout_secs: 30,
    };

    fn p(name: &str) -> PlayerId {
        PlayerId::new(name)
    }

    #[test]
    fn test_same_tier_searchers_pair() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", Some(StakeTier::T5k), 0);
        mm.start(&p("b"), "b", Some(StakeTier::T5k), 2_000);

        let status = mm
            .poll(&p("b"), 3_000, WINDOWS, |own, other| {
                assert_eq!(own.player, p("b"));
                assert_eq!(other.player, p("a"));
                Ok(MatchId(7))
            })
            .unwrap();
        assert_eq!(status, SearchStatus::Matched(MatchId(7)));
        assert!(mm.is_empty());
        let other = mm.poll(&p("a"), 3_000, WINDOWS, |_, _| unreachable!()).unwrap();
        assert_eq!(other, SearchStatus::Matched(MatchId(7)));
    }

    #[test]
    fn test_different_tiers_do_not_pair() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", Some(StakeTier::T5k), 0);
        mm.start(&p("b"), "b", None, 0);
        let status = mm
            .poll(&p("b"), 1_000, WINDOWS, |_, _| unreachable!())
            .unwrap();
        assert_eq!(status, SearchStatus::Searching { waited_secs: 1 });
        assert_eq!(mm.len(), 2);
    }

    #[test]
    fn test_lone_searcher_falls_back() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", Some(StakeTier::T5k), 0);
        let status = mm
            .poll(&p("a"), 10_000, WINDOWS, |_, _| unreachable!())
            .unwrap();
        assert_eq!(
            status,
            SearchStatus::FallBack {
                tier: Some(StakeTier::T5k)
            }
        );
        assert!(mm.is_empty());
    }

    #[test]
    fn test_failed_create_keeps_entries() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", None, 0);
        mm.start(&p("b"), "b", None, 0);
        let err = mm.poll(&p("a"), 0, WINDOWS, |_, _| Err(ServerError::NoOpponentDecks));
        assert!(err.is_err());
        assert_eq!(mm.len(), 2);
    }

    #[test]
    fn test_stale_entries_invisible_and_swept() {
        let mm = Matchmaker::new();
        mm.start(&p("old"), "old", None, 0);
        mm.start(&p("new"), "new", None, 31_000);
        let status = mm
            .poll(&p("new"), 31_000, WINDOWS, |_, _| unreachable!())
            .unwrap();
        assert!(matches!(status, SearchStatus::Searching { .. }));
        assert_eq!(mm.sweep(31_000, WINDOWS), 1);
        assert_eq!(mm.len(), 1);
    }

    #[test]
    fn test_entry_visibility_uses_millis() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", None, 0);
        assert_eq!(mm.sweep(30_000, WINDOWS), 0);
        assert_eq!(mm.sweep(30_001, WINDOWS), 1);
    }

    #[test]
    fn test_unpolled_pairings_expire() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", None, 0);
        mm.start(&p("b"), "b", None, 0);
        mm.pair(&p("a"), &p("b"), 1_000, WINDOWS, |_, _| Ok(MatchId(4)))
            .unwrap();
        assert_eq!(mm.unclaimed_pairings(), 2);
        mm.sweep(31_000, WINDOWS);
        assert_eq!(mm.unclaimed_pairings(), 2);
        mm.sweep(31_001, WINDOWS);
        assert_eq!(mm.unclaimed_pairings(), 0);
        assert_eq!(
            mm.poll(&p("a"), 31_001, WINDOWS, |_, _| unreachable!()).unwrap(),
            SearchStatus::Idle
        );
    }

    #[test]
    fn test_direct_pair_and_cancel() {
        let mm = Matchmaker::new();
        mm.start(&p("a"), "a", None, 0);
        mm.start(&p("b"), "b", None, 0);
        mm.start(&p("c"), "c", None, 0);
        assert!(mm.cancel(&p("c")));
        assert!(!mm.cancel(&p("c")));
        assert!(mm.pair(&p("a"), &p("c"), 0, WINDOWS, |_, _| Ok(MatchId(1))).is_err());
        assert_eq!(mm.pair(&p("a"), &p("b"), 0, WINDOWS, |_, _| Ok(MatchId(2))).unwrap(), MatchId(2));
        assert!(mm.is_empty());
        assert_eq!(
            mm.poll(&p("b"), 0, WINDOWS, |_, _| unreachable!()).unwrap(),
            SearchStatus::Matched(MatchId(2))
        );
        assert_eq!(
            mm.poll(&p("b"), 0, WINDOWS, |_, _| unreachable!()).unwrap(),
            SearchStatus::Idle
        );
    }
}
