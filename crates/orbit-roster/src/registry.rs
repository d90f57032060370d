//! The slot table.
//!
//! Slots are a flat `Vec<Option<Player>>` with a parallel bitset of free
//! indices, so the lowest free slot is the first set bit.

use bit_set::BitSet;

use crate::{Player, PlayerNumber, RosterError};

/// Fixed-capacity table mapping slot numbers to players.
///
/// `len()` always equals the number of occupied slots and never exceeds
/// `max_players()`.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    slots: Vec<Option<Player>>,
    free: BitSet,
    len: usize,
}

impl PlayerRegistry {
    /// Creates a table of `max_players` empty slots.
    pub fn new(max_players: usize) -> Self {
        let mut free = BitSet::with_capacity(max_players);
        for index in 0..max_players {
            free.insert(index);
        }
        Self {
            slots: vec![None; max_players],
            free,
            len: 0,
        }
    }

    /// Number of slots, occupied or not.
    pub fn max_players(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` when every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// The player in slot `number`; `None` for an empty or out-of-range slot.
    pub fn get(&self, number: PlayerNumber) -> Option<&Player> {
        self.slots.get(number.index()).and_then(Option::as_ref)
    }

    /// Whether slot `number` is occupied.
    pub fn contains(&self, number: PlayerNumber) -> bool {
        self.get(number).is_some()
    }

    /// The lowest-numbered empty slot, if any.
    pub fn lowest_free(&self) -> Option<PlayerNumber> {
        self.free.iter().next().map(PlayerNumber)
    }

    /// Places `player` in the slot named by `player.number`.
    ///
    /// Fails without changing anything if the slot is out of range or
    /// already taken.
    pub fn insert(&mut self, player: Player) -> Result<&Player, RosterError> {
        let number = player.number;
        let max_players = self.max_players();
        let slot = self
            .slots
            .get_mut(number.index())
            .ok_or(RosterError::SlotOutOfRange { number, max_players })?;
        if slot.is_some() {
            return Err(RosterError::SlotOccupied(number));
        }
        self.free.remove(number.index());
        self.len += 1;
        Ok(&*slot.insert(player))
    }

    /// Empties a slot and returns whoever held it.
    pub fn remove(&mut self, number: PlayerNumber) -> Option<Player> {
        let player = self.slots.get_mut(number.index())?.take()?;
        self.free.insert(number.index());
        self.len -= 1;
        Some(player)
    }

    /// Occupied slots in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.slots.iter().flatten()
    }

    /// Occupied slot numbers in ascending order.
    pub fn numbers(&self) -> impl Iterator<Item = PlayerNumber> + '_ {
        self.iter().map(|player| player.number)
    }

    /// The first player whose name matches exactly.
    pub fn find_by_name(&self, name: &str) -> Option<&Player> {
        self.iter().find(|player| player.name == name)
    }

    /// Returns `name`, or `name` with `number` appended as many times as
    /// needed to avoid clashing with an existing player.
    pub fn unique_name(&self, name: &str, number: PlayerNumber) -> String {
        let mut candidate = name.to_owned();
        while self.find_by_name(&candidate).is_some() {
            candidate.push_str(&number.index().to_string());
        }
        candidate
    }

    /// Empties every slot and returns the players removed, in slot order.
    pub fn clear(&mut self) -> Vec<Player> {
        let removed: Vec<Player> = self.slots.iter_mut().filter_map(Option::take).collect();
        for index in 0..self.slots.len() {
            self.free.insert(index);
        }
        self.len = 0;
        removed
    }
}
