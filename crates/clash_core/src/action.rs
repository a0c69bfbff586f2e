//! Turn actions a player can submit.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::state::{GameState, Side, LANE_COUNT};

/// One step of a player's turn.
///
/// Indices refer to the player's hand or lane *as it is when the action is
/// applied*, i.e. after the earlier actions of the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Move a hand card into a lane.
    Play {
        /// Position in hand.
        hand_index: usize,
        /// Target lane (0..3).
        lane: usize,
    },
    /// Discard a hand card and draw a replacement.
    SacrificeHand {
        /// Position in hand.
        hand_index: usize,
    },
    /// Remove one of your lane cards and give its power to another card
    /// in the same lane.
    SacrificeLane {
        /// Lane both cards are in.
        lane: usize,
        /// Position of the card to remove, on your half of the lane.
        card_index: usize,
        /// Position of the card that receives the buff.
        target_index: usize,
    },
}

/// Reject a batch whose indices are out of range against the current state.
///
/// Only the shape of each action is checked here. References that go stale
/// because of an earlier action in the same batch are tolerated and skipped
/// during resolution.
///
/// # Errors
///
/// Returns [`GameError::InvalidAction`] for the first malformed action.
pub fn check_batch(state: &GameState, side: Side, actions: &[Action]) -> Result<()> {
    let hand_len = state.player(side).hand().len();
    for (index, action) in actions.iter().enumerate() {
        let reject = |reason: String| GameError::InvalidAction {
            side,
            index,
            reason,
        };
        match *action {
            Action::Play { hand_index, lane } => {
                if lane >= LANE_COUNT {
                    return Err(reject(format!("lane {lane} does not exist")));
                }
                if hand_index >= hand_len {
                    return Err(reject(format!(
                        "hand index {hand_index} out of range ({hand_len} cards)"
                    )));
                }
            }
            Action::SacrificeHand { hand_index } => {
                if hand_index >= hand_len {
                    return Err(reject(format!(
                        "hand index {hand_index} out of range ({hand_len} cards)"
                    )));
                }
            }
            Action::SacrificeLane {
                lane,
                card_index,
                target_index,
            } => {
                if lane >= LANE_COUNT {
                    return Err(reject(format!("lane {lane} does not exist")));
                }
                if card_index == target_index {
                    return Err(reject("a card cannot be sacrificed into itself".into()));
                }
                // Cards played earlier in the batch may land in this lane,
                // so only the combined upper bound is enforced.
                let reachable = state.lanes()[lane].cards(side).len() + actions.len();
                if card_index >= reachable || target_index >= reachable {
                    return Err(reject(format!("lane {lane} index out of range")));
                }
            }
        }
    }
    Ok(())
}
