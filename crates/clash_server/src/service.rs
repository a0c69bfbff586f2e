//! The service facade.
//!
//! [`ClashService`] exposes every player-facing operation and the periodic
//! [`sweep`](ClashService::sweep). Locks are always taken in the order
//! queue, registry, match, then stores (decks, defense book, history) and
//! collaborators. Match outcomes (history, ratings, settlement) are
//! applied while the match lock is held, each guarded by its own flag, so a
//! finish raced by the sweep is applied exactly once.
//!
//! Reads return a [`MatchView`] redacted for the caller; the raw record,
//! which holds both hands and any batch not yet resolved, stays inside.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clash_core::ability::AbilityBook;
use clash_core::action::Action;
use clash_core::error::GameError;
use clash_core::result::Winner;
use clash_core::state::Side;
use clash_core::turn::{TurnOutcome, TurnReport};

use crate::clock::{elapsed_ms, secs_between, secs_to_ms, Clock, Millis};
use crate::collab::{Ledger, ProfileStore};
use crate::decks::{DeckId, DeckStore, SavedDeck, StoredDeck};
use crate::error::{Result, ServerError};
use crate::history::{HistoryRecord, HistoryStore};
use crate::lifecycle::{
    room_code, EndReason, MatchId, MatchRecord, MatchRegistry, MatchStatus, Seat,
};
use crate::matchmaker::{Matchmaker, SearchEntry, SearchStatus};
use crate::settlement::{DefenseBook, DefensePool, LeaderboardEntry, Stake, StakeTier};
use crate::view::MatchView;
use crate::{lock, PlayerId, ServerConfig};

/// A waiting room as listed to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRoom {
    /// Match id.
    pub match_id: MatchId,
    /// Code to join with.
    pub room_code: String,
    /// Creator's display name.
    pub creator: String,
    /// Creation time.
    pub created_at: Millis,
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Waiting rooms past expiry.
    pub expired: usize,
    /// Matches both players left.
    pub abandoned: usize,
    /// Matches forfeited for one absent player.
    pub forfeited: usize,
    /// Turns pushed through after the deadline.
    pub deadline_turns: usize,
    /// Outcomes (settlement, ratings) applied on retry.
    pub outcomes_retried: usize,
    /// Search entries dropped.
    pub stale_searches: usize,
    /// Ended matches dropped from memory.
    pub evicted: usize,
}

/// The match service.
pub struct ClashService {
    config: ServerConfig,
    book: AbilityBook,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn Ledger>,
    profiles: Arc<dyn ProfileStore>,
    decks: DeckStore,
    registry: MatchRegistry,
    matchmaker: Matchmaker,
    defense: DefenseBook,
    history: HistoryStore,
    rng: Mutex<ChaCha8Rng>,
}

impl ClashService {
    /// Build a service around its collaborators.
    pub fn new(
        config: ServerConfig,
        book: AbilityBook,
        clock: Arc<dyn Clock>,
        ledger: Arc<dyn Ledger>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let rng = config
            .rng_seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self {
            config,
            book,
            clock,
            ledger,
            profiles,
            decks: DeckStore::new(),
            registry: MatchRegistry::new(),
            matchmaker: Matchmaker::new(),
            defense: DefenseBook::new(),
            history: HistoryStore::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    fn next_seed(&self) -> u64 {
        lock(&self.rng).gen()
    }

    fn fresh_room_code(&self) -> String {
        let mut rng = lock(&self.rng);
        loop {
            let code = room_code(&mut *rng);
            if !self.registry.has_room(&code) {
                return code;
            }
        }
    }

    fn active_deck(&self, player: &PlayerId) -> Result<StoredDeck> {
        self.decks
            .active(player)
            .ok_or_else(|| ServerError::NoActiveDeck(player.to_string()))
    }

    // ---------------------------------------------------------------------
    // Decks and defense pools
    // ---------------------------------------------------------------------

    /// Validate and save a deck.
    ///
    /// # Errors
    ///
    /// Returns the violated deck rule for an illegal deck.
    pub fn save_deck(
        &self,
        player: &PlayerId,
        name: &str,
        cards: Vec<clash_core::card::Card>,
        set_active: bool,
    ) -> Result<SavedDeck> {
        self.decks.save(player, name, cards, set_active, self.now())
    }

    /// Make a deck the player's active one.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DeckNotFound`] if the player does not own it.
    pub fn set_active_deck(&self, player: &PlayerId, deck: DeckId) -> Result<()> {
        self.decks.set_active(player, deck)
    }

    /// Delete a deck that is not backing a defense pool.
    ///
    /// # Errors
    ///
    /// - [`ServerError::DefenseLocked`] if a pool is staked on it
    /// - [`ServerError::DeckNotFound`] if the player does not own it
    pub fn delete_deck(&self, player: &PlayerId, deck: DeckId) -> Result<()> {
        if self.defense.pool(deck).is_some() {
            return Err(ServerError::DefenseLocked(deck));
        }
        self.decks.delete(player, deck).map(|_| ())
    }

    /// A player's saved decks.
    #[must_use]
    pub fn decks(&self, player: &PlayerId) -> Vec<StoredDeck> {
        self.decks.for_player(player)
    }

    /// A player's active deck.
    #[must_use]
    pub fn get_active_deck(&self, player: &PlayerId) -> Option<StoredDeck> {
        self.decks.active(player)
    }

    /// Stake a defense pool on one of the player's decks.
    ///
    /// # Errors
    ///
    /// - [`ServerError::DeckNotFound`] if the player does not own the deck
    /// - [`ServerError::InsufficientBalance`] if the stake cannot be covered
    /// - [`ServerError::AlreadyProcessed`] if the deck already defends
    pub fn set_defense_pool(
        &self,
        player: &PlayerId,
        deck: DeckId,
        tier: StakeTier,
    ) -> Result<DefensePool> {
        match self.decks.get(deck) {
            Some(d) if &d.owner == player => {}
            _ => return Err(ServerError::DeckNotFound(deck)),
        }
        self.defense.set_pool(self.ledger.as_ref(), player, deck, tier)
    }

    /// Withdraw a defense pool to the player's claimable balance.
    ///
    /// # Errors
    ///
    /// - [`ServerError::DeckNotFound`] if there is no such pool
    /// - [`ServerError::DefenseLocked`] while a match holds part of it
    pub fn withdraw_defense_pool(&self, player: &PlayerId, deck: DeckId) -> Result<u64> {
        self.defense.withdraw(self.ledger.as_ref(), player, deck)
    }

    /// Pools a player has staked.
    #[must_use]
    pub fn defense_status(&self, player: &PlayerId) -> Vec<DefensePool> {
        self.defense.pools_of(player)
    }

    /// Defense leaderboard, largest pool first.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.defense.leaderboard()
    }

    // ---------------------------------------------------------------------
    // Rooms
    // ---------------------------------------------------------------------

    /// Open a room with the player's active deck.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NoActiveDeck`] without an active deck.
    pub fn create_match(&self, player: &PlayerId, username: &str) -> Result<(MatchId, String)> {
        let deck = self.active_deck(player)?;
        let now = self.now();
        let id = self.registry.next_id();
        let code = self.fresh_room_code();
        let seat = Seat::human(player.clone(), username, deck.id, deck.cards, now);
        self.registry.insert(MatchRecord::waiting(
            id,
            code.clone(),
            seat,
            now,
            self.config.room_expiry_secs,
        ));
        info!(%player, %id, room = %code, "room created");
        Ok((id, code))
    }

    /// Join a waiting room with the player's active deck.
    ///
    /// # Errors
    ///
    /// - [`ServerError::RoomNotFound`] for unknown codes
    /// - [`ServerError::NotWaiting`] or [`ServerError::OwnMatch`] if the room cannot be joined
    /// - [`ServerError::NoActiveDeck`] without an active deck
    pub fn join_match(&self, room: &str, player: &PlayerId, username: &str) -> Result<MatchId> {
        let shared = self.registry.by_room(room)?;
        let mut record = lock(&shared);
        record.check_joinable(player)?;
        let deck = self.active_deck(player)?;
        let now = self.now();
        let seat = Seat::human(player.clone(), username, deck.id, deck.cards, now);
        record.start(
            seat,
            self.next_seed(),
            &self.book,
            self.config.engine,
            now,
            self.config.turn_secs,
        )?;
        Ok(record.id)
    }

    /// Cancel a room the player created, before anyone joined.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotCreator`] or [`ServerError::NotWaiting`].
    pub fn cancel_match(&self, id: MatchId, player: &PlayerId) -> Result<()> {
        let shared = self.registry.get(id)?;
        let mut record = lock(&shared);
        record.cancel_waiting(player, self.now())
    }

    // ---------------------------------------------------------------------
    // Playing
    // ---------------------------------------------------------------------

    /// Submit the player's actions for the current turn.
    ///
    /// Resolves the turn if this completes the pair (a CPU seat submits
    /// inside the same call). Returns the resolution report, if any.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotParticipant`], [`ServerError::NotInProgress`]
    /// - engine rejections (already submitted, malformed action)
    pub fn submit_actions(
        &self,
        id: MatchId,
        player: &PlayerId,
        actions: Vec<Action>,
    ) -> Result<Option<TurnReport>> {
        let shared = self.registry.get(id)?;
        let mut record = lock(&shared);
        let side = record.require_side(player)?;
        record.require_in_progress()?;
        let now = self.now();

        let mut report = record.submit(side, actions, now, self.config.turn_secs)?;
        record.touch(side, now);
        if report.is_none() {
            report = self.play_cpu_seats(&mut record, now)?;
        }
        if let Some(report) = &report {
            self.after_resolution(&mut record, report, now);
        }
        Ok(report)
    }

    /// Give up. The opponent wins.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotParticipant`] or [`ServerError::NotInProgress`].
    pub fn forfeit(&self, id: MatchId, player: &PlayerId) -> Result<()> {
        let shared = self.registry.get(id)?;
        let mut record = lock(&shared);
        let side = record.require_side(player)?;
        record.require_in_progress()?;
        let now = self.now();
        self.conclude(
            &mut record,
            Winner::Side(side.opponent()),
            EndReason::Forfeit,
            now,
        );
        Ok(())
    }

    /// Record that the player is still connected.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotParticipant`] if the player is not seated.
    pub fn heartbeat(&self, id: MatchId, player: &PlayerId) -> Result<()> {
        let shared = self.registry.get(id)?;
        let mut record = lock(&shared);
        let side = record.require_side(player)?;
        let now = self.now();
        record.touch(side, now);
        Ok(())
    }

    /// Claim victory over an opponent silent for longer than the heartbeat timeout.
    ///
    /// The opponent's last heartbeat is read under the same lock that ends
    /// the match, so a heartbeat that lands first defeats the claim.
    ///
    /// # Errors
    ///
    /// - [`ServerError::OpponentStillActive`] if the opponent is not silent long enough
    /// - [`ServerError::NotParticipant`], [`ServerError::NotInProgress`]
    pub fn claim_timeout_victory(&self, id: MatchId, player: &PlayerId) -> Result<()> {
        let shared = self.registry.get(id)?;
        let mut record = lock(&shared);
        let side = record.require_side(player)?;
        record.require_in_progress()?;
        let now = self.now();
        record.touch(side, now);

        let opponent = side.opponent();
        let last_seen = match record.seat(opponent) {
            Some(seat) if !seat.is_cpu() => seat.last_seen,
            _ => now,
        };
        if elapsed_ms(last_seen, now) <= secs_to_ms(self.config.heartbeat_timeout_secs) {
            return Err(ServerError::OpponentStillActive {
                seen_secs_ago: secs_between(last_seen, now),
                timeout_secs: self.config.heartbeat_timeout_secs,
            });
        }
        self.conclude(&mut record, Winner::Side(side), EndReason::Timeout, now);
        Ok(())
    }

    /// Submit for every CPU seat that has not confirmed. A rejected CPU
    /// batch is replaced by an empty one.
    fn play_cpu_seats(&self, record: &mut MatchRecord, now: Millis) -> Result<Option<TurnReport>> {
        for side in Side::BOTH {
            let is_cpu = record.seat(side).is_some_and(Seat::is_cpu);
            if !is_cpu || record.is_confirmed(side) {
                continue;
            }
            let actions = record
                .state
                .as_ref()
                .map(|s| self.config.cpu.choose(s, side))
                .unwrap_or_default();
            let report = match record.submit(side, actions, now, self.config.turn_secs) {
                Err(ServerError::Game(GameError::InvalidAction { reason, .. })) => {
                    warn!(id = %record.id, %side, %reason, "cpu batch rejected");
                    record.submit(side, Vec::new(), now, self.config.turn_secs)?
                }
                other => other?,
            };
            if report.is_some() {
                return Ok(report);
            }
        }
        Ok(None)
    }

    fn after_resolution(&self, record: &mut MatchRecord, report: &TurnReport, now: Millis) {
        if let TurnOutcome::Finished(score) = &report.outcome {
            self.conclude(record, score.winner, EndReason::Natural, now);
        }
    }

    /// End a match and apply its outcome. Safe to call on an ended match:
    /// only the outcome steps still pending run.
    fn conclude(&self, record: &mut MatchRecord, winner: Winner, reason: EndReason, now: Millis) {
        if record.finish(winner, reason, now) {
            self.history.push(self.history_record(record, now));
        }
        self.apply_outcome(record);
    }

    /// Ratings and settlement for a finished match, each at most once.
    fn apply_outcome(&self, record: &mut MatchRecord) -> bool {
        let Some(winner) = record.result.as_ref().map(|r| r.winner) else {
            return false;
        };
        let mut applied = false;

        if !record.ratings_applied {
            if let Some(side) = winner.side() {
                self.apply_ratings(record.player(side), record.player(side.opponent()));
            }
            record.ratings_applied = true;
            applied = true;
        }

        if let Some(stake) = record.stake.as_mut() {
            if self
                .defense
                .settle(self.ledger.as_ref(), stake, winner)
                .is_some()
            {
                applied = true;
            }
        }
        applied
    }

    fn apply_ratings(&self, winner: Option<&PlayerId>, loser: Option<&PlayerId>) {
        let rule = self.config.rating;
        if let Some(w) = winner {
            let rating = self.profiles.rating(w);
            self.profiles.set_rating(w, rule.apply(rating, 0).0);
        }
        if let Some(l) = loser {
            let rating = self.profiles.rating(l);
            self.profiles.set_rating(l, rule.apply(0, rating).1);
        }
    }

    fn history_record(&self, record: &MatchRecord, now: Millis) -> HistoryRecord {
        let result = record.result.as_ref();
        let total_power = record.state.as_ref().map_or([0, 0], |s| {
            [s.total_power(Side::A), s.total_power(Side::B)]
        });
        HistoryRecord {
            match_id: record.id,
            room_code: record.room_code.clone(),
            players: [
                record.player(Side::A).cloned(),
                record.player(Side::B).cloned(),
            ],
            winner: result.map_or(Winner::Tie, |r| r.winner),
            lanes: result.and_then(|r| r.score.as_ref()).map(|s| s.lanes),
            turns: record.turns_played(),
            total_power,
            reason: result.map_or(EndReason::Abandoned, |r| r.reason),
            stake: record.stake.as_ref().map(|s| s.tier),
            finished_at: now,
        }
    }

    // ---------------------------------------------------------------------
    // Matchmaking
    // ---------------------------------------------------------------------

    /// Enter the search queue, optionally at a stake tier.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NoActiveDeck`] without an active deck.
    pub fn start_search(
        &self,
        player: &PlayerId,
        username: &str,
        tier: Option<StakeTier>,
    ) -> Result<()> {
        self.active_deck(player)?;
        self.matchmaker.start(player, username, tier, self.now());
        Ok(())
    }

    /// Leave the search queue. Returns `false` if the player was not searching.
    pub fn cancel_search(&self, player: &PlayerId) -> bool {
        self.matchmaker.cancel(player)
    }

    /// Check on a search; pairs with a live opponent if one is waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if a found pair could not be started (for example a
    /// deck was deleted meanwhile); both entries stay queued.
    pub fn poll_search(&self, player: &PlayerId) -> Result<SearchStatus> {
        let now = self.now();
        self.matchmaker
            .poll(player, now, self.config.search_windows(), |own, other| {
                self.start_pair(own, other, now)
            })
    }

    /// Start a match between two players found by search.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotSearching`] unless both are live searchers at the same tier.
    pub fn create_match_from_search(&self, a: &PlayerId, b: &PlayerId) -> Result<MatchId> {
        let now = self.now();
        self.matchmaker
            .pair(a, b, now, self.config.search_windows(), |first, second| {
                self.start_pair(first, second, now)
            })
    }

    fn start_pair(&self, a: &SearchEntry, b: &SearchEntry, now: Millis) -> Result<MatchId> {
        let deck_a = self.active_deck(&a.player)?;
        let deck_b = self.active_deck(&b.player)?;
        let seat_b = Seat::human(b.player.clone(), &b.username, deck_b.id, deck_b.cards, now);
        self.start_now(&a.player, &a.username, deck_a, seat_b, None, now)
    }

    /// Create and immediately start a match with seat B filled.
    fn start_now(
        &self,
        player: &PlayerId,
        username: &str,
        deck: StoredDeck,
        opponent: Seat,
        stake: Option<Stake>,
        now: Millis,
    ) -> Result<MatchId> {
        let id = self.registry.next_id();
        let seat = Seat::human(player.clone(), username, deck.id, deck.cards, now);
        let mut record = MatchRecord::waiting(
            id,
            self.fresh_room_code(),
            seat,
            now,
            self.config.room_expiry_secs,
        );
        record.start(
            opponent,
            self.next_seed(),
            &self.book,
            self.config.engine,
            now,
            self.config.turn_secs,
        )?;
        record.stake = stake;
        self.registry.insert(record);
        Ok(id)
    }

    /// Play the CPU using a random other player's active deck.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NoActiveDeck`] without an active deck
    /// - [`ServerError::NoOpponentDecks`] if nobody else has one
    pub fn auto_match(&self, player: &PlayerId, username: &str) -> Result<MatchId> {
        let deck = self.active_deck(player)?;
        let pool = self.decks.active_excluding(player);
        if pool.is_empty() {
            return Err(ServerError::NoOpponentDecks);
        }
        let pick = lock(&self.rng).gen_range(0..pool.len());
        let cpu_deck = &pool[pick];
        let now = self.now();
        let seat = Seat::cpu(cpu_deck.id, cpu_deck.cards.clone(), now);
        let id = self.start_now(player, username, deck, seat, None, now)?;
        info!(%player, %id, opponent_deck = %cpu_deck.id, "auto match started");
        Ok(id)
    }

    /// Attack a random defense deck staked at `tier`, paying the entry fee.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NoActiveDeck`] without an active deck
    /// - [`ServerError::InsufficientBalance`] if the fee cannot be paid
    /// - [`ServerError::NoDefenders`] if no pool at this tier can cover the prize
    pub fn staked_auto_match(
        &self,
        player: &PlayerId,
        username: &str,
        tier: StakeTier,
    ) -> Result<MatchId> {
        let deck = self.active_deck(player)?;
        let available = self.ledger.balance(player);
        if available < tier.fee() {
            return Err(ServerError::InsufficientBalance {
                needed: tier.fee(),
                available,
            });
        }

        let pool = self.defense.reserve_defender(tier, player, |len| {
            lock(&self.rng).gen_range(0..len)
        })?;
        match self.start_staked(player, username, deck, &pool, tier) {
            Ok(id) => {
                info!(%player, %id, %tier, defender = %pool.owner, "staked match started");
                Ok(id)
            }
            Err(e) => {
                self.defense.release(pool.deck, tier);
                Err(e)
            }
        }
    }

    /// Charge the fee and start against the reserved pool's deck. The fee
    /// goes back to the spendable balance if the match cannot start.
    fn start_staked(
        &self,
        player: &PlayerId,
        username: &str,
        deck: StoredDeck,
        pool: &DefensePool,
        tier: StakeTier,
    ) -> Result<MatchId> {
        let defense_deck = self
            .decks
            .get(pool.deck)
            .ok_or(ServerError::DeckNotFound(pool.deck))?;
        self.ledger.debit(player, tier.fee())?;

        let now = self.now();
        let seat = Seat::cpu(defense_deck.id, defense_deck.cards, now);
        let stake = Stake {
            tier,
            attacker: player.clone(),
            defender_deck: pool.deck,
            defender: pool.owner.clone(),
            settled: false,
        };
        let started = self.start_now(player, username, deck, seat, Some(stake), now);
        if let Err(e) = &started {
            warn!(%player, %tier, error = %e, "staked match failed to start, fee refunded");
            self.ledger.refund(player, tier.fee());
        }
        started
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// A match as `viewer` may see it. Non-participants get the spectator view.
    ///
    /// # Errors
    ///
    /// [`ServerError::MatchNotFound`] for unknown (or evicted) ids.
    pub fn get_match(&self, id: MatchId, viewer: &PlayerId) -> Result<MatchView> {
        let shared = self.registry.get(id)?;
        let view = MatchView::of(&lock(&shared), viewer);
        Ok(view)
    }

    /// A match by room code, as `viewer` may see it.
    ///
    /// # Errors
    ///
    /// [`ServerError::RoomNotFound`] for unknown codes.
    pub fn get_match_by_room(&self, code: &str, viewer: &PlayerId) -> Result<MatchView> {
        let shared = self.registry.by_room(code)?;
        let view = MatchView::of(&lock(&shared), viewer);
        Ok(view)
    }

    /// A player's history, newest first. `None` uses the configured page size.
    #[must_use]
    pub fn history(&self, player: &PlayerId, limit: Option<usize>) -> Vec<HistoryRecord> {
        self.history
            .for_player(player, limit.unwrap_or(self.config.history_limit))
    }

    /// Rooms waiting for a second player, newest first.
    #[must_use]
    pub fn open_rooms(&self) -> Vec<OpenRoom> {
        let mut rooms: Vec<OpenRoom> = self
            .registry
            .all()
            .iter()
            .filter_map(|shared| {
                let record = lock(shared);
                (record.status == MatchStatus::Waiting).then(|| OpenRoom {
                    match_id: record.id,
                    room_code: record.room_code.clone(),
                    creator: record
                        .seat(Side::A)
                        .map(|s| s.username.clone())
                        .unwrap_or_default(),
                    created_at: record.created_at,
                })
            })
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.match_id.cmp(&a.match_id)));
        rooms.truncate(self.config.open_rooms_limit);
        rooms
    }

    // ---------------------------------------------------------------------
    // Background sweep
    // ---------------------------------------------------------------------

    /// One pass over every match and the search queue.
    ///
    /// - expire waiting rooms
    /// - cancel matches both players left, forfeit one-sided absences
    /// - push through turns past their deadline with empty batches
    /// - retry outcome steps (ratings, settlement) still pending
    /// - evict ended matches older than the retention window (their
    ///   history record was written when they ended)
    ///
    /// Terminal matches are otherwise left alone.
    pub fn sweep(&self) -> SweepReport {
        let now = self.now();
        let mut report = SweepReport {
            stale_searches: self.matchmaker.sweep(now, self.config.search_windows()),
            ..SweepReport::default()
        };
        let retain_ms = secs_to_ms(self.config.retain_closed_secs);
        let mut evict = Vec::new();

        for shared in self.registry.all() {
            let mut record = lock(&shared);
            if record.is_evictable(now, retain_ms) {
                evict.push(record.id);
                continue;
            }
            match record.status {
                MatchStatus::Waiting => {
                    if record.expire(now) {
                        report.expired += 1;
                    }
                }
                MatchStatus::InProgress => self.sweep_in_progress(&mut record, now, &mut report),
                MatchStatus::Finished => {
                    if self.apply_outcome(&mut record) {
                        report.outcomes_retried += 1;
                    }
                }
                MatchStatus::Cancelled => {}
            }
        }
        for id in evict {
            if self.registry.remove(id) {
                report.evicted += 1;
            }
        }
        if report != SweepReport::default() {
            info!(?report, "sweep");
        }
        report
    }

    fn sweep_in_progress(&self, record: &mut MatchRecord, now: Millis, report: &mut SweepReport) {
        let silent = [
            record.silent_ms(Side::A, now),
            record.silent_ms(Side::B, now),
        ];
        let humans: Vec<Side> = Side::BOTH
            .into_iter()
            .filter(|s| record.player(*s).is_some())
            .collect();

        let all_gone = humans
            .iter()
            .all(|s| silent[s.index()] > secs_to_ms(self.config.abandon_grace_secs));
        if all_gone && humans.len() == 2 {
            if record.abandon(now) {
                self.history.push(self.history_record(record, now));
                report.abandoned += 1;
            }
            return;
        }

        for side in humans {
            let opponent = side.opponent();
            if silent[side.index()] > secs_to_ms(self.config.forfeit_grace_secs)
                && silent[opponent.index()] <= secs_to_ms(self.config.heartbeat_timeout_secs)
            {
                info!(id = %record.id, %side, silent_ms = silent[side.index()], "forfeiting absent player");
                self.conclude(record, Winner::Side(opponent), EndReason::Forfeit, now);
                report.forfeited += 1;
                return;
            }
        }

        if record.turn_deadline.is_some_and(|d| now >= d) {
            match self.push_turn(record, now) {
                Ok(Some(turn)) => {
                    self.after_resolution(record, &turn, now);
                    report.deadline_turns += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(id = %record.id, error = %e, "deadline turn failed"),
            }
        }
    }

    /// Confirm an empty batch for every human seat that missed the deadline,
    /// then let CPU seats play.
    fn push_turn(&self, record: &mut MatchRecord, now: Millis) -> Result<Option<TurnReport>> {
        for side in Side::BOTH {
            if record.player(side).is_some() && !record.is_confirmed(side) {
                info!(id = %record.id, %side, "turn deadline passed, submitting empty batch");
                if let Some(report) = record.submit(side, Vec::new(), now, self.config.turn_secs)? {
                    return Ok(Some(report));
                }
            }
        }
        self.play_cpu_seats(record, now)
    }
}

impl std::fmt::Debug for ClashService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClashService")
            .field("config", &self.config)
            .field("abilities", &self.book.len())
            .field("searching", &self.matchmaker.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collab::{InMemoryLedger, InMemoryProfiles};
    use clash_test_utils::fixtures;

    struct Harness {
        service: ClashService,
        clock: Arc<ManualClock>,
        ledger: Arc<InMemoryLedger>,
        profiles: Arc<InMemoryProfiles>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = Arc::new(InMemoryLedger::new());
        let profiles = Arc::new(InMemoryProfiles::new());
        let config = ServerConfig {
            rng_seed: Some(42),
            ..ServerConfig::default()
        };
        let service = ClashService::new(
            config,
            AbilityBook::builtin().unwrap(),
            clock.clone(),
            ledger.clone(),
            profiles.clone(),
        );
        Harness {
            service,
            clock,
            ledger,
            profiles,
        }
    }

    fn with_deck(h: &Harness, name: &str, power: u32) -> PlayerId {
        let player = PlayerId::new(name);
        h.service
            .save_deck(&player, "main", fixtures::plain_cards(name, power), true)
            .unwrap();
        player
    }

    #[test]
    fn test_room_flow_to_natural_finish() {
        let h = harness();
        let alice = with_deck(&h, "alice", 30);
        let bob = with_deck(&h, "bob", 5);
        let (id, code) = h.service.create_match(&alice, "Alice").unwrap();
        assert_eq!(h.service.open_rooms()[0].room_code, code);
        h.service.join_match(&code, &bob, "Bob").unwrap();
        assert!(h.service.open_rooms().is_empty());

        for turn in 0..6u8 {
            let lane = usize::from(turn % 3);
            h.service
                .submit_actions(id, &alice, vec![Action::Play { hand_index: 0, lane }])
                .unwrap();
            h.service.submit_actions(id, &bob, vec![]).unwrap();
        }

        let record = h.service.get_match(id, &alice).unwrap();
        assert_eq!(record.status, MatchStatus::Finished);
        let result = record.result.unwrap();
        assert_eq!(result.winner, Winner::Side(Side::A));
        assert_eq!(result.reason, EndReason::Natural);
        assert_eq!(h.profiles.rating(&alice), 50);
        assert_eq!(h.profiles.rating(&bob), 0);
        assert_eq!(h.service.history(&bob, None).len(), 1);
    }

    #[test]
    fn test_join_errors() {
        let h = harness();
        let alice = with_deck(&h, "alice", 10);
        let (_, code) = h.service.create_match(&alice, "Alice").unwrap();
        assert!(matches!(
            h.service.join_match(&code, &alice, "Alice"),
            Err(ServerError::OwnMatch)
        ));
        let nodeck = PlayerId::new("nodeck");
        assert!(matches!(
            h.service.join_match(&code, &nodeck, "x"),
            Err(ServerError::NoActiveDeck(_))
        ));
        assert!(matches!(
            h.service.join_match("ZZZZZZ", &alice, "Alice"),
            Err(ServerError::RoomNotFound(_))
        ));
    }

    #[test]
    fn test_outsider_cannot_act() {
        let h = harness();
        let alice = with_deck(&h, "alice", 10);
        let bob = with_deck(&h, "bob", 10);
        let (id, code) = h.service.create_match(&alice, "Alice").unwrap();
        h.service.join_match(&code, &bob, "Bob").unwrap();
        let eve = PlayerId::new("eve");
        assert!(matches!(
            h.service.submit_actions(id, &eve, vec![]),
            Err(ServerError::NotParticipant { .. })
        ));
        assert!(h.service.forfeit(id, &eve).is_err());
        assert!(h.service.heartbeat(id, &eve).is_err());
    }

    #[test]
    fn test_forfeit_awards_opponent() {
        let h = harness();
        let alice = with_deck(&h, "alice", 10);
        let bob = with_deck(&h, "bob", 10);
        h.profiles.set_rating(&alice, 30);
        let (id, code) = h.service.create_match(&alice, "Alice").unwrap();
        h.service.join_match(&code, &bob, "Bob").unwrap();
        h.service.forfeit(id, &alice).unwrap();
        assert_eq!(h.profiles.rating(&bob), 50);
        assert_eq!(h.profiles.rating(&alice), 0);
        assert!(matches!(
            h.service.forfeit(id, &bob),
            Err(ServerError::NotInProgress { .. })
        ));
    }

    #[test]
    fn test_room_expires_in_sweep() {
        let h = harness();
        let alice = with_deck(&h, "alice", 10);
        let (id, _) = h.service.create_match(&alice, "Alice").unwrap();
        h.clock.advance_secs(599);
        assert_eq!(h.service.sweep().expired, 0);
        h.clock.advance_secs(1);
        assert_eq!(h.service.sweep().expired, 1);
        assert_eq!(
            h.service.get_match(id, &alice).unwrap().status,
            MatchStatus::Cancelled
        );
    }

    #[test]
    fn test_failed_staked_start_refunds_fee_to_balance() {
        let h = harness();
        let defender = with_deck(&h, "defender", 10);
        let attacker = with_deck(&h, "attacker", 10);
        let defense_deck = h.service.decks(&defender)[0].id;
        h.ledger.deposit(&defender, 1_000);
        h.ledger.deposit(&attacker, 500);
        h.service
            .set_defense_pool(&defender, defense_deck, StakeTier::T1k)
            .unwrap();
        let pool = h
            .service
            .defense
            .reserve_defender(StakeTier::T1k, &attacker, |_| 0)
            .unwrap();

        let mut broken = h.service.get_active_deck(&attacker).unwrap();
        broken.cards.truncate(3);
        let err = h
            .service
            .start_staked(&attacker, "Attacker", broken, &pool, StakeTier::T1k)
            .unwrap_err();
        assert!(matches!(err, ServerError::Game(_)));
        assert_eq!(h.ledger.balance(&attacker), 500);
        assert_eq!(h.ledger.claimable(&attacker), 0);
    }
}
