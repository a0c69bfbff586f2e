//! What one player is allowed to see of a match.
//!
//! Turns are simultaneous and hidden until both sides confirm, so the raw
//! [`MatchRecord`] never leaves the service. A [`MatchView`] carries the
//! public board (lanes, pile sizes, confirmation flags) plus the viewer's own
//! hand and pending batch. The opponent's hand, every draw pile's order, the
//! engine seed and the opponent's pending batch are left out.

use serde::{Deserialize, Serialize};

use clash_core::action::Action;
use clash_core::card::Card;
use clash_core::result::MatchScore;
use clash_core::state::{GameState, InstanceId, Side, LANE_COUNT};

use crate::clock::Millis;
use crate::decks::DeckId;
use crate::lifecycle::{MatchId, MatchRecord, MatchResult, MatchStatus, Seat};
use crate::settlement::Stake;
use crate::PlayerId;

/// A seat without its deck snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    /// The human in the seat, `None` for the CPU.
    pub player: Option<PlayerId>,
    /// Display name.
    pub username: String,
    /// Whether the CPU plays this seat.
    pub is_cpu: bool,
    /// Deck the seat plays.
    pub deck_id: Option<DeckId>,
    /// Last heartbeat.
    pub last_seen: Millis,
}

impl SeatView {
    fn of(seat: &Seat) -> Self {
        Self {
            player: seat.player().cloned(),
            username: seat.username.clone(),
            is_cpu: seat.is_cpu(),
            deck_id: seat.deck_id,
            last_seen: seat.last_seen,
        }
    }
}

/// A face-up card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    /// Instance on the board.
    pub instance: InstanceId,
    /// Printed card.
    pub card: Card,
    /// Current power.
    pub power: u32,
}

/// One lane, both sides face up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneView {
    /// Cards per side.
    pub cards: [Vec<CardView>; 2],
    /// Lane power per side.
    pub power: [u32; 2],
}

/// Public counters for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSummary {
    /// Cards in hand.
    pub hand_size: usize,
    /// Cards left to draw.
    pub deck_size: usize,
    /// Cards in the graveyard.
    pub graveyard_size: usize,
    /// Whether this side has confirmed the current turn.
    pub confirmed: bool,
    /// Power across all lanes.
    pub total_power: u32,
}

/// The board as one viewer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardView {
    /// Turn being played.
    pub turn: u8,
    /// Turns resolved so far.
    pub resolved_turns: u8,
    /// Energy available this turn.
    pub energy: u8,
    /// The lanes.
    pub lanes: [LaneView; LANE_COUNT],
    /// Counters for seats A and B.
    pub sides: [SideSummary; 2],
    /// The viewer's hand. Empty for spectators.
    pub hand: Vec<CardView>,
    /// Final scoring, once the last turn resolved.
    pub score: Option<MatchScore>,
}

impl BoardView {
    fn of(state: &GameState, viewer: Option<Side>) -> Self {
        let card = |id: &InstanceId| {
            state.instance(*id).map(|instance| CardView {
                instance: *id,
                card: instance.card.clone(),
                power: instance.power,
            })
        };
        let lanes = std::array::from_fn(|index| {
            let lane = &state.lanes()[index];
            LaneView {
                cards: Side::BOTH.map(|side| lane.cards(side).iter().filter_map(card).collect()),
                power: Side::BOTH.map(|side| lane.power(side)),
            }
        });
        let sides = Side::BOTH.map(|side| {
            let player = state.player(side);
            SideSummary {
                hand_size: player.hand().len(),
                deck_size: player.deck().len(),
                graveyard_size: player.graveyard().len(),
                confirmed: player.is_confirmed(),
                total_power: state.total_power(side),
            }
        });
        let hand = viewer.map_or_else(Vec::new, |side| {
            state.player(side).hand().iter().filter_map(card).collect()
        });
        Self {
            turn: state.turn(),
            resolved_turns: state.resolved_turns(),
            energy: state.energy(),
            lanes,
            sides,
            hand,
            score: state.score().cloned(),
        }
    }
}

/// A match as one player (or a spectator) sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
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
    /// Unconfirmed seats get an empty batch after this.
    pub turn_deadline: Option<Millis>,
    /// The viewer's seat, `None` for spectators.
    pub viewer: Option<Side>,
    /// Seats A and B.
    pub seats: [Option<SeatView>; 2],
    /// Board once started.
    pub board: Option<BoardView>,
    /// The viewer's batch for this turn, if already submitted.
    pub pending: Option<Vec<Action>>,
    /// Stake, for staked matches.
    pub stake: Option<Stake>,
    /// Verdict once ended.
    pub result: Option<MatchResult>,
}

impl MatchView {
    /// Redact `record` for `viewer`.
    #[must_use]
    pub fn of(record: &MatchRecord, viewer: &PlayerId) -> Self {
        let side = record.side_of(viewer);
        Self {
            id: record.id,
            room_code: record.room_code.clone(),
            status: record.status,
            created_at: record.created_at,
            expires_at: record.expires_at,
            started_at: record.started_at,
            turn_deadline: record.turn_deadline,
            viewer: side,
            seats: [
                record.seat(Side::A).map(SeatView::of),
                record.seat(Side::B).map(SeatView::of),
            ],
            board: record.state.as_ref().map(|s| BoardView::of(s, side)),
            pending: side.and_then(|s| record.turn_actions[s.index()].clone()),
            stake: record.stake.clone(),
            result: record.result.clone(),
        }
    }

    /// Seat of `player`, if seated.
    #[must_use]
    pub fn side_of(&self, player: &PlayerId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.seats[side.index()].as_ref().and_then(|s| s.player.as_ref()) == Some(player))
    }
}
