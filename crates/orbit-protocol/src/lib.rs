//! Wire protocol for Orbit sessions.
//!
//! - **Packets** ([`PacketWriter`], [`PacketReader`]): the length-prefixed
//!   binary codec every message is built from.
//! - **Messages** ([`Message`], [`MessageType`]): the session vocabulary,
//!   plus the [`Role`] table saying which side handles which type.
//! - **Discovery** ([`DiscoveryCodec`], [`ProtocolHeader`]): header-checked
//!   framing for LAN discovery datagrams.
//!
//! The crate knows nothing about sockets or sessions:
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Session (slots, events)
//! ```

mod discovery;
mod error;
mod packet;
mod types;

pub use discovery::{
    DiscoveryCodec, ProtocolHeader, DEFAULT_DISCOVERY_GROUP, DEFAULT_DISCOVERY_PORT,
};
pub use error::ProtocolError;
pub use packet::{PacketReader, PacketWriter};
pub use types::{
    GameInfo, JoinAccepted, JoinFailureReason, JoinRequest, JoinResponse, Message, MessageType,
    PlayerInfo, Role,
};

/// Re-exported so callers can build payloads without a direct dependency.
pub use bytes::Bytes;
