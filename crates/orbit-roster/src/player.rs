use std::fmt;

use orbit_protocol::{Bytes, PlayerInfo};

/// Index of a player's slot, stable for as long as the player stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerNumber(pub usize);

impl PlayerNumber {
    /// The slot as a table index.
    pub fn index(self) -> usize {
        self.0
    }

    /// Converts a wire value, rejecting negatives.
    pub fn from_wire(raw: i32) -> Option<Self> {
        usize::try_from(raw).ok().map(Self)
    }

    /// The value as it travels on the wire.
    pub fn to_wire(self) -> i32 {
        // Slot tables are capped well below i32::MAX.
        self.0 as i32
    }
}

impl fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An admitted player.
///
/// `data` is the application's profile blob; the session never looks
/// inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub number: PlayerNumber,
    pub name: String,
    pub data: Bytes,
}

impl Player {
    /// Creates a player for slot `number`.
    pub fn new(number: PlayerNumber, name: impl Into<String>, data: Bytes) -> Self {
        Self {
            number,
            name: name.into(),
            data,
        }
    }

    /// The roster entry sent on the wire for this player.
    pub fn to_info(&self) -> PlayerInfo {
        PlayerInfo {
            number: self.number.to_wire(),
            name: self.name.clone(),
            data: self.data.clone(),
        }
    }
}
