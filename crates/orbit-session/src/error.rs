//! Error types for the session layer.
//!
//! Everything here is a local mistake: calling an operation in the wrong
//! state, naming a player who is not there, or loading a bad config.
//! Nothing a remote peer sends can produce a `SessionError`.

use orbit_roster::PlayerNumber;

use crate::ConnectionState;

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `join` was called while a join was in progress or complete.
    #[error("cannot join while {0}")]
    AlreadyJoined(ConnectionState),

    /// The operation needs an established session.
    #[error("not connected")]
    NotConnected,

    /// No player holds the given slot.
    #[error("no player in slot {0}")]
    UnknownPlayer(PlayerNumber),

    /// A configuration document could not be parsed.
    #[error("invalid session config: {0}")]
    Config(#[from] serde_json::Error),
}
