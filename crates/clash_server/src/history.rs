//! Finished-match history.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use clash_core::result::{LaneResult, Winner};
use clash_core::state::LANE_COUNT;

use crate::clock::Millis;
use crate::lifecycle::{EndReason, MatchId};
use crate::settlement::StakeTier;
use crate::{lock, PlayerId};

/// One finished (or abandoned) match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Match id.
    pub match_id: MatchId,
    /// Room code.
    pub room_code: String,
    /// Human players per seat; `None` for a CPU seat.
    pub players: [Option<PlayerId>; 2],
    /// Verdict.
    pub winner: Winner,
    /// Lane verdicts, when the match reached the final turn.
    pub lanes: Option<[LaneResult; LANE_COUNT]>,
    /// Turns resolved.
    pub turns: u8,
    /// Final board power per seat.
    pub total_power: [u32; 2],
    /// How it ended.
    pub reason: EndReason,
    /// Stake tier, for staked matches.
    pub stake: Option<StakeTier>,
    /// When it ended.
    pub finished_at: Millis,
}

impl HistoryRecord {
    /// Whether `player` sat in this match.
    #[must_use]
    pub fn involves(&self, player: &PlayerId) -> bool {
        self.players.iter().flatten().any(|p| p == player)
    }
}

/// Append-only history log.
#[derive(Debug, Default)]
pub struct HistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl HistoryStore {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&self, record: HistoryRecord) {
        lock(&self.records).push(record);
    }

    /// A player's matches on either seat, newest first.
    #[must_use]
    pub fn for_player(&self, player: &PlayerId, limit: usize) -> Vec<HistoryRecord> {
        let mut out: Vec<HistoryRecord> = lock(&self.records)
            .iter()
            .filter(|r| r.involves(player))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        out.truncate(limit);
        out
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    /// Whether nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
