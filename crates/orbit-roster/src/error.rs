//! Error types for the roster layer.

use crate::PlayerNumber;

/// Errors that can occur when mutating the slot table.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// The slot index is not below the table's capacity.
    #[error("slot {number} out of range (max players {max_players})")]
    SlotOutOfRange {
        number: PlayerNumber,
        max_players: usize,
    },

    /// Another player already holds the slot.
    #[error("slot {0} is already occupied")]
    SlotOccupied(PlayerNumber),
}
