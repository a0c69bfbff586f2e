//! Match lifecycle: rooms, seats, liveness and terminal transitions.
//!
//! ```text
//!  waiting ──join──▶ in-progress ──final turn / forfeit / timeout──▶ finished
//!     │                   │
//!     └─cancel / expire─▶ cancelled ◀──both players gone──┘
//! ```
//!
//! Every record lives behind its own mutex in the [`MatchRegistry`]. All
//! transitions are methods on [`MatchRecord`] and assume the caller holds
//! that lock, which is what makes "resolve once", "claim re-checks the
//! heartbeat" and "sweep skips terminal matches" atomic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use clash_core::ability::AbilityBook;
use clash_core::action::Action;
use clash_core::card::Card;
use clash_core::deck::validate_deck;
use clash_core::replay::MatchReplay;
use clash_core::result::{MatchScore, Winner};
use clash_core::state::{GameState, Side};
use clash_core::turn::{EngineConfig, TurnOutcome, TurnReport};

use crate::clock::{elapsed_ms, Millis};
use crate::decks::DeckId;
use crate::error::{Result, ServerError};
use crate::settlement::Stake;
use crate::{lock, PlayerId};

/// Characters used in room codes (no 0/O or 1/I).
const ROOM_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Room code length.
pub const ROOM_CODE_LEN: usize = 6;

/// Generate a room code.
pub fn room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_ALPHABET[rng.gen_range(0..ROOM_ALPHABET.len())]))
        .collect()
}

/// Match identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match-{}", self.0)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    /// Room created, waiting for a second player.
    Waiting,
    /// Both seats filled, turns being played.
    InProgress,
    /// Ended with a verdict.
    Finished,
    /// Ended without one.
    Cancelled,
}

impl MatchStatus {
    /// Finished and cancelled matches never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    /// The final turn resolved.
    Natural,
    /// A player gave up, or the sweep forfeited an absent player.
    Forfeit,
    /// A player claimed victory over a silent opponent.
    Timeout,
    /// Both players went silent.
    Abandoned,
}

/// Who drives a seat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Controller {
    /// A connected player.
    Human(PlayerId),
    /// The built-in opponent, playing someone's deck.
    Cpu,
}

/// One side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Who plays this seat.
    pub controller: Controller,
    /// Display name.
    pub username: String,
    /// Deck the snapshot came from.
    pub deck_id: Option<DeckId>,
    /// Deck snapshot taken when the seat was filled.
    pub deck: Vec<Card>,
    /// Last heartbeat (or action) from this seat.
    pub last_seen: Millis,
}

impl Seat {
    /// A human seat.
    #[must_use]
    pub fn human(player: PlayerId, username: &str, deck_id: DeckId, deck: Vec<Card>, now: Millis) -> Self {
        Self {
            controller: Controller::Human(player),
            username: username.to_string(),
            deck_id: Some(deck_id),
            deck,
            last_seen: now,
        }
    }

    /// A CPU seat playing `deck`.
    #[must_use]
    pub fn cpu(deck_id: DeckId, deck: Vec<Card>, now: Millis) -> Self {
        Self {
            controller: Controller::Cpu,
            username: "CPU".to_string(),
            deck_id: Some(deck_id),
            deck,
            last_seen: now,
        }
    }

    /// The human in this seat, if any.
    #[must_use]
    pub const fn player(&self) -> Option<&PlayerId> {
        match &self.controller {
            Controller::Human(p) => Some(p),
            Controller::Cpu => None,
        }
    }

    /// Whether the CPU plays this seat.
    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        matches!(self.controller, Controller::Cpu)
    }
}

/// Verdict of an ended match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winner, or tie.
    pub winner: Winner,
    /// How it ended.
    pub reason: EndReason,
    /// Lane scoring, present when the final turn resolved.
    pub score: Option<MatchScore>,
    /// When it ended.
    pub ended_at: Millis,
}

/// Everything known about one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Identifier.
    pub id: MatchId,
    /// Code players use to join.
    pub room_code: String,
    /// Lifecycle state.
    pub status: MatchStatus,
    /// Creation time.
    pub created_at: Millis,
    /// A waiting room is cancelled after this.
    pub expires_at: Millis,
    /// When the second seat was filled.
    pub started_at: Option<Millis>,
    /// Seats A and B.
    pub seats: [Option<Seat>; 2],
    /// Engine state once started.
    pub state: Option<GameState>,
    /// Recording of every resolved turn.
    pub replay: Option<MatchReplay>,
    /// Batches accepted this turn, per seat.
    pub turn_actions: [Option<Vec<Action>>; 2],
    /// Unconfirmed seats get an empty batch after this.
    pub turn_deadline: Option<Millis>,
    /// Stake, for staked matches.
    pub stake: Option<Stake>,
    /// Verdict once ended.
    pub result: Option<MatchResult>,
    /// Set once rating changes were written.
    pub ratings_applied: bool,
    /// When the match reached a terminal state.
    pub closed_at: Option<Millis>,
}

impl MatchRecord {
    /// A new room with the creator in seat A.
    #[must_use]
    pub fn waiting(id: MatchId, room_code: String, creator: Seat, now: Millis, expiry_secs: u64) -> Self {
        Self {
            id,
            room_code,
            status: MatchStatus::Waiting,
            created_at: now,
            expires_at: now + expiry_secs * 1000,
            started_at: None,
            seats: [Some(creator), None],
            state: None,
            replay: None,
            turn_actions: [None, None],
            turn_deadline: None,
            stake: None,
            result: None,
            ratings_applied: false,
            closed_at: None,
        }
    }

    /// Seat by side.
    #[must_use]
    pub const fn seat(&self, side: Side) -> Option<&Seat> {
        self.seats[side.index()].as_ref()
    }

    /// The human on `side`, if any.
    #[must_use]
    pub fn player(&self, side: Side) -> Option<&PlayerId> {
        self.seat(side).and_then(Seat::player)
    }

    /// Which seat `player` occupies.
    #[must_use]
    pub fn side_of(&self, player: &PlayerId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.player(*side) == Some(player))
    }

    /// Seat of `player`, or an error naming the match.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotParticipant`] if the player is not seated.
    pub fn require_side(&self, player: &PlayerId) -> Result<Side> {
        self.side_of(player).ok_or_else(|| ServerError::NotParticipant {
            id: self.id,
            player: player.to_string(),
        })
    }

    /// Fail unless the match is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotInProgress`] otherwise.
    pub fn require_in_progress(&self) -> Result<()> {
        if self.status == MatchStatus::InProgress {
            Ok(())
        } else {
            Err(ServerError::NotInProgress {
                id: self.id,
                status: self.status,
            })
        }
    }

    /// Check that `player` may take seat B.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotWaiting`] if the room is not open
    /// - [`ServerError::OwnMatch`] if `player` created it
    pub fn check_joinable(&self, player: &PlayerId) -> Result<()> {
        if self.status != MatchStatus::Waiting {
            return Err(ServerError::NotWaiting {
                id: self.id,
                status: self.status,
            });
        }
        if self.player(Side::A) == Some(player) {
            return Err(ServerError::OwnMatch);
        }
        Ok(())
    }

    /// Fill seat B and start turn 1.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotWaiting`] if the room is not open, or a
    /// deck error if a snapshot no longer validates. Nothing changes on error.
    pub fn start(
        &mut self,
        opponent: Seat,
        seed: u64,
        book: &AbilityBook,
        engine: EngineConfig,
        now: Millis,
        turn_secs: u64,
    ) -> Result<()> {
        if self.status != MatchStatus::Waiting {
            return Err(ServerError::NotWaiting {
                id: self.id,
                status: self.status,
            });
        }
        let creator_cards = self.seat(Side::A).map(|s| s.deck.clone()).unwrap_or_default();
        let decks = [
            validate_deck(creator_cards.clone())?,
            validate_deck(opponent.deck.clone())?,
        ];
        let replay = MatchReplay::new(seed, engine, [creator_cards, opponent.deck.clone()]);

        self.state = Some(GameState::new(seed, decks, book, engine));
        self.replay = Some(replay);
        self.seats[Side::B.index()] = Some(opponent);
        for seat in self.seats.iter_mut().flatten() {
            seat.last_seen = now;
        }
        self.status = MatchStatus::InProgress;
        self.started_at = Some(now);
        self.turn_deadline = Some(now + turn_secs * 1000);
        info!(id = %self.id, room = %self.room_code, "match started");
        Ok(())
    }

    /// Cancel a waiting room on its creator's request.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotCreator`] if `player` is not the creator
    /// - [`ServerError::NotWaiting`] once the match has started or ended
    pub fn cancel_waiting(&mut self, player: &PlayerId, now: Millis) -> Result<()> {
        if self.player(Side::A) != Some(player) {
            return Err(ServerError::NotCreator(self.id));
        }
        if self.status != MatchStatus::Waiting {
            return Err(ServerError::NotWaiting {
                id: self.id,
                status: self.status,
            });
        }
        self.status = MatchStatus::Cancelled;
        self.closed_at = Some(now);
        info!(id = %self.id, "room cancelled by creator");
        Ok(())
    }

    /// Record liveness for `side`.
    pub fn touch(&mut self, side: Side, now: Millis) {
        if let Some(seat) = self.seats[side.index()].as_mut() {
            seat.last_seen = seat.last_seen.max(now);
        }
    }

    /// Milliseconds since `side` was last seen. CPU seats are always live.
    #[must_use]
    pub fn silent_ms(&self, side: Side, now: Millis) -> u64 {
        match self.seat(side) {
            Some(seat) if !seat.is_cpu() => elapsed_ms(seat.last_seen, now),
            _ => 0,
        }
    }

    /// Whether `side` has confirmed this turn.
    #[must_use]
    pub fn is_confirmed(&self, side: Side) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.player(side).is_confirmed())
    }

    /// Submit a batch for `side`, recording it for the replay.
    ///
    /// When this completes the pair, the turn resolves here, under the
    /// caller's lock, and the next deadline is set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotInProgress`] or the engine's rejection.
    /// Nothing changes on error.
    pub fn submit(
        &mut self,
        side: Side,
        actions: Vec<Action>,
        now: Millis,
        turn_secs: u64,
    ) -> Result<Option<TurnReport>> {
        self.require_in_progress()?;
        let state = self.state.as_mut().ok_or(ServerError::NotInProgress {
            id: self.id,
            status: self.status,
        })?;
        let report = state.submit(side, actions.clone())?;
        self.turn_actions[side.index()] = Some(actions);

        if let Some(report) = &report {
            let [a, b] = std::mem::take(&mut self.turn_actions);
            if let Some(replay) = self.replay.as_mut() {
                replay.record_turn(report.turn, a.unwrap_or_default(), b.unwrap_or_default());
            }
            self.turn_deadline = match report.outcome {
                TurnOutcome::Continue { .. } => Some(now + turn_secs * 1000),
                TurnOutcome::Finished(_) => None,
            };
            debug!(id = %self.id, turn = report.turn, skipped = report.skipped.len(), "turn resolved");
        }
        Ok(report)
    }

    /// End the match with a verdict. Returns `false` if it had already ended.
    pub fn finish(&mut self, winner: Winner, reason: EndReason, now: Millis) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let score = self.state.as_ref().and_then(|s| s.score().cloned());
        self.status = MatchStatus::Finished;
        self.turn_deadline = None;
        self.closed_at = Some(now);
        if let (Some(replay), Some(state)) = (self.replay.as_mut(), self.state.as_ref()) {
            replay.finalize(state.state_hash());
        }
        self.result = Some(MatchResult {
            winner,
            reason,
            score,
            ended_at: now,
        });
        info!(id = %self.id, ?winner, ?reason, "match finished");
        true
    }

    /// Cancel an in-progress match both players left. Returns `false` if it had already ended.
    pub fn abandon(&mut self, now: Millis) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = MatchStatus::Cancelled;
        self.turn_deadline = None;
        self.closed_at = Some(now);
        self.result = Some(MatchResult {
            winner: Winner::Tie,
            reason: EndReason::Abandoned,
            score: None,
            ended_at: now,
        });
        info!(id = %self.id, "match abandoned");
        true
    }

    /// Cancel a waiting room past its expiry. Returns `true` if it was cancelled.
    pub fn expire(&mut self, now: Millis) -> bool {
        if self.status == MatchStatus::Waiting && now >= self.expires_at {
            self.status = MatchStatus::Cancelled;
            self.closed_at = Some(now);
            info!(id = %self.id, room = %self.room_code, "room expired");
            true
        } else {
            false
        }
    }

    /// Turns resolved so far.
    #[must_use]
    pub fn turns_played(&self) -> u8 {
        self.state.as_ref().map_or(0, GameState::resolved_turns)
    }

    /// Whether the record can be dropped: terminal for longer than
    /// `retain_ms`, with ratings and settlement already written.
    #[must_use]
    pub fn is_evictable(&self, now: Millis, retain_ms: u64) -> bool {
        let outcome_done = self.status == MatchStatus::Cancelled
            || (self.ratings_applied && self.stake.as_ref().map_or(true, |s| s.settled));
        self.status.is_terminal()
            && outcome_done
            && self
                .closed_at
                .is_some_and(|closed| elapsed_ms(closed, now) > retain_ms)
    }
}

/// A match behind its own lock.
pub type SharedMatch = Arc<Mutex<MatchRecord>>;

/// All matches, plus the room-code index.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    matches: Mutex<BTreeMap<MatchId, SharedMatch>>,
    rooms: Mutex<HashMap<String, MatchId>>,
    next_id: AtomicU64,
}

impl MatchRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a new id.
    pub fn next_id(&self) -> MatchId {
        MatchId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether a room code is in use.
    #[must_use]
    pub fn has_room(&self, code: &str) -> bool {
        lock(&self.rooms).contains_key(code)
    }

    /// Store a record and index its room code.
    pub fn insert(&self, record: MatchRecord) -> SharedMatch {
        let id = record.id;
        let code = record.room_code.clone();
        let shared = Arc::new(Mutex::new(record));
        lock(&self.matches).insert(id, Arc::clone(&shared));
        lock(&self.rooms).insert(code, id);
        shared
    }

    /// Look up by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::MatchNotFound`] for unknown ids.
    pub fn get(&self, id: MatchId) -> Result<SharedMatch> {
        lock(&self.matches)
            .get(&id)
            .cloned()
            .ok_or(ServerError::MatchNotFound(id))
    }

    /// Look up by room code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::RoomNotFound`] for unknown codes.
    pub fn by_room(&self, code: &str) -> Result<SharedMatch> {
        let code = code.trim().to_ascii_uppercase();
        let id = lock(&self.rooms)
            .get(&code)
            .copied()
            .ok_or_else(|| ServerError::RoomNotFound(code.clone()))?;
        self.get(id)
    }

    /// Drop a match and its room code. Returns `false` if it was unknown.
    pub fn remove(&self, id: MatchId) -> bool {
        let removed = lock(&self.matches).remove(&id);
        let Some(shared) = removed else {
            return false;
        };
        let code = lock(&shared).room_code.clone();
        lock(&self.rooms).remove(&code);
        true
    }

    /// Matches held.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.matches).len()
    }

    /// Whether no match is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every match, in id order.
    #[must_use]
    pub fn all(&self) -> Vec<SharedMatch> {
        lock(&self.matches).values().cloned().collect()
    }
}
