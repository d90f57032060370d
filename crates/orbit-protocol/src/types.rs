//! Session message types and their wire encoding.
//!
//! Every message is a single type byte, followed by one length-prefixed
//! sub-packet for the types that carry a payload:
//!
//! ```text
//! [type: u8][len: u32][payload ...]
//! ```
//!
//! Integer fields that describe slots and counts stay `i32` here, exactly
//! as they travel. Range checks belong to whoever consumes them, because
//! what counts as "in range" depends on session state.

use std::fmt;

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::packet::{PacketReader, PacketWriter};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Tags and reason codes
// ---------------------------------------------------------------------------

/// The one-byte type tag at the start of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    GameInfoRequest = 0,
    GameInfoResponse = 1,
    JoinRequest = 2,
    JoinResponse = 3,
    Leave = 4,
    PlayerJoined = 5,
    PlayerLeft = 6,
    Data = 7,
    ConnectionTest = 8,
}

/// Which end of a session is looking at a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl MessageType {
    /// Returns `true` if a session in `role` acts on this message type.
    /// Anything else is ignored and counted as unhandled.
    pub fn is_handled_by(self, role: Role) -> bool {
        use MessageType::*;
        match role {
            Role::Server => matches!(
                self,
                GameInfoRequest | JoinRequest | Leave | Data | ConnectionTest
            ),
            Role::Client => matches!(
                self,
                GameInfoResponse
                    | JoinResponse
                    | PlayerJoined
                    | PlayerLeft
                    | Data
                    | ConnectionTest
            ),
        }
    }

    /// Discovery messages travel as datagrams, never on a stream.
    pub fn is_discovery(self) -> bool {
        matches!(self, MessageType::GameInfoRequest | MessageType::GameInfoResponse)
    }
}

/// Why a join attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JoinFailureReason {
    Unknown = 0,
    GameFull = 1,
    AlreadyInGame = 2,
    InvalidName = 3,
    InvalidServerData = 4,
    ConnectionFailed = 5,
}

impl JoinFailureReason {
    /// Decodes a wire code. Codes from a newer peer map to `Unknown`.
    pub fn from_wire(code: u8) -> Self {
        Self::try_from(code).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for JoinFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unknown => "unknown reason",
            Self::GameFull => "game is full",
            Self::AlreadyInGame => "already in game",
            Self::InvalidName => "invalid player name",
            Self::InvalidServerData => "server sent invalid data",
            Self::ConnectionFailed => "connection failed",
        };
        f.write_str(text)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Answer to a `GameInfoRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub max_players: i32,
    pub num_players: i32,
    /// Host-defined bytes such as a game name or map.
    pub custom_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub player_name: String,
    pub player_data: Bytes,
}

/// One roster entry, also the payload of `PlayerJoined`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub number: i32,
    pub name: String,
    pub data: Bytes,
}

/// A successful join as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccepted {
    /// Slot assigned to the joining player.
    pub number: i32,
    pub num_players: i32,
    pub max_players: i32,
    /// Every occupied slot, the joiner included.
    pub roster: Vec<PlayerInfo>,
    /// Bytes attached by the host's join hook.
    pub extra_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResponse {
    Accepted(JoinAccepted),
    Rejected(JoinFailureReason),
}

/// A decoded session message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GameInfoRequest,
    GameInfoResponse(GameInfo),
    JoinRequest(JoinRequest),
    JoinResponse(JoinResponse),
    Leave,
    PlayerJoined(PlayerInfo),
    PlayerLeft { number: i32 },
    Data(Bytes),
    ConnectionTest,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::GameInfoRequest => MessageType::GameInfoRequest,
            Message::GameInfoResponse(_) => MessageType::GameInfoResponse,
            Message::JoinRequest(_) => MessageType::JoinRequest,
            Message::JoinResponse(_) => MessageType::JoinResponse,
            Message::Leave => MessageType::Leave,
            Message::PlayerJoined(_) => MessageType::PlayerJoined,
            Message::PlayerLeft { .. } => MessageType::PlayerLeft,
            Message::Data(_) => MessageType::Data,
            Message::ConnectionTest => MessageType::ConnectionTest,
        }
    }

    /// Encodes the message into one frame.
    pub fn encode(&self) -> Bytes {
        let mut out = PacketWriter::new();
        self.encode_into(&mut out);
        out.freeze()
    }

    /// Appends the encoded message to `out`.
    pub fn encode_into(&self, out: &mut PacketWriter) {
        out.put_u8(self.message_type().into());

        let mut body = PacketWriter::new();
        match self {
            Message::GameInfoRequest | Message::Leave | Message::ConnectionTest => return,
            Message::GameInfoResponse(info) => {
                body.put_i32(info.max_players)
                    .put_i32(info.num_players)
                    .put_bytes(&info.custom_data);
            }
            Message::JoinRequest(request) => {
                body.put_string(&request.player_name)
                    .put_bytes(&request.player_data);
            }
            Message::JoinResponse(JoinResponse::Accepted(accepted)) => {
                body.put_bool(true)
                    .put_i32(accepted.number)
                    .put_i32(accepted.num_players)
                    .put_i32(accepted.max_players);
                for player in &accepted.roster {
                    put_player(&mut body, player);
                }
                body.put_bytes(&accepted.extra_data);
            }
            Message::JoinResponse(JoinResponse::Rejected(reason)) => {
                body.put_bool(false).put_u8((*reason).into());
            }
            Message::PlayerJoined(player) => put_player(&mut body, player),
            Message::PlayerLeft { number } => {
                body.put_i32(*number);
            }
            Message::Data(payload) => {
                out.put_bytes(payload);
                return;
            }
        }
        out.put_subpacket(&body);
    }

    /// Decodes one frame.
    ///
    /// Fails on an empty frame, an unknown tag, or a payload that is
    /// missing a field. Bytes after the last expected field are ignored.
    pub fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
        let mut reader = PacketReader::new(frame);
        Self::decode_from(&mut reader)
    }

    pub fn decode_from(reader: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
        let tag = reader.read_u8()?;
        let kind = MessageType::try_from(tag).map_err(|_| ProtocolError::UnknownMessageType(tag))?;

        let message = match kind {
            MessageType::GameInfoRequest => Message::GameInfoRequest,
            MessageType::Leave => Message::Leave,
            MessageType::ConnectionTest => Message::ConnectionTest,
            MessageType::Data => Message::Data(reader.read_bytes()?),
            MessageType::GameInfoResponse => {
                let mut body = reader.read_subpacket()?;
                Message::GameInfoResponse(GameInfo {
                    max_players: body.read_i32()?,
                    num_players: body.read_i32()?,
                    custom_data: body.read_bytes()?,
                })
            }
            MessageType::JoinRequest => {
                let mut body = reader.read_subpacket()?;
                Message::JoinRequest(JoinRequest {
                    player_name: body.read_string()?,
                    player_data: body.read_bytes()?,
                })
            }
            MessageType::JoinResponse => {
                let mut body = reader.read_subpacket()?;
                Message::JoinResponse(decode_join_response(&mut body)?)
            }
            MessageType::PlayerJoined => {
                let mut body = reader.read_subpacket()?;
                Message::PlayerJoined(read_player(&mut body)?)
            }
            MessageType::PlayerLeft => {
                let mut body = reader.read_subpacket()?;
                Message::PlayerLeft {
                    number: body.read_i32()?,
                }
            }
        };
        Ok(message)
    }
}

fn decode_join_response(body: &mut PacketReader<'_>) -> Result<JoinResponse, ProtocolError> {
    if !body.read_bool()? {
        return Ok(JoinResponse::Rejected(JoinFailureReason::from_wire(
            body.read_u8()?,
        )));
    }

    let number = body.read_i32()?;
    let num_players = body.read_i32()?;
    let max_players = body.read_i32()?;
    // The roster length is implied by `num_players`. A negative count
    // yields an empty roster, which the client rejects as inconsistent.
    let mut roster = Vec::new();
    for _ in 0..num_players.max(0) {
        roster.push(read_player(body)?);
    }
    let extra_data = body.read_bytes()?;

    Ok(JoinResponse::Accepted(JoinAccepted {
        number,
        num_players,
        max_players,
        roster,
        extra_data,
    }))
}

fn put_player(out: &mut PacketWriter, player: &PlayerInfo) {
    out.put_i32(player.number)
        .put_string(&player.name)
        .put_bytes(&player.data);
}

fn read_player(body: &mut PacketReader<'_>) -> Result<PlayerInfo, ProtocolError> {
    Ok(PlayerInfo {
        number: body.read_i32()?,
        name: body.read_string()?,
        data: body.read_bytes()?,
    })
}
