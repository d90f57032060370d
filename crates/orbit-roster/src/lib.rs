//! Player slot management for Orbit.
//!
//! A [`PlayerRegistry`] is a fixed-size table of slots. A joining player
//! takes the lowest free slot and keeps that [`PlayerNumber`] until they
//! leave; only then can the number be handed to someone else.
//!
//! The server owns the authoritative registry. Each client keeps a mirror
//! built from the join roster and kept current by join/leave broadcasts.

mod error;
mod player;
mod registry;

pub use error::RosterError;
pub use player::{Player, PlayerNumber};
pub use registry::PlayerRegistry;
