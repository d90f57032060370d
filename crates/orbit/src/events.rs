//! Events returned by the session pumps.
//!
//! Each pump returns its events as an ordered `Vec`, so ordering is part
//! of the contract: after a successful join a client sees `Joined` first,
//! then one `PlayerJoined` per other roster entry in slot order.

use std::net::SocketAddr;
use std::time::Instant;

use orbit_protocol::{Bytes, JoinFailureReason};
use orbit_roster::{Player, PlayerNumber};

/// Why a player left a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The player sent `Leave`.
    Left,
    /// The host called `kick`.
    Kicked,
    /// Nothing arrived from the player within the idle timeout.
    TimedOut,
    /// The player's connection failed or was closed.
    ConnectionLost,
    /// The host shut the server down.
    Shutdown,
}

/// Why a client's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The application called `leave`.
    Left,
    /// The server announced our own departure (kick or shutdown).
    Kicked,
    /// Nothing arrived from the server within the idle timeout.
    TimedOut,
    ConnectionLost,
}

/// Something that happened on a server during a pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    PlayerJoined(Player),
    PlayerLeft { player: Player, reason: LeaveReason },
    Data { from: PlayerNumber, payload: Bytes },
}

/// A server seen through discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGame {
    /// Source address of the response; the server accepts joins on the
    /// same IP and port.
    pub addr: SocketAddr,
    pub num_players: i32,
    pub max_players: i32,
    pub custom_data: Bytes,
    pub last_seen: Instant,
}

/// Something that happened on a client during a pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The join handshake succeeded.
    Joined {
        local: PlayerNumber,
        extra_data: Bytes,
    },
    /// The join handshake failed and the client is unconnected again.
    JoinFailed { reason: JoinFailureReason },
    PlayerJoined(Player),
    PlayerLeft(Player),
    /// Opaque payload from the host.
    Data(Bytes),
    /// An established session ended.
    Disconnected { reason: DisconnectReason },
    GameInfoReceived(DiscoveredGame),
}
