//! Session configuration.
//!
//! One `SessionConfig` is shared by servers and clients; each side reads
//! only the fields that apply to it. Defaults are usable on a LAN as-is.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use orbit_protocol::{ProtocolHeader, DEFAULT_DISCOVERY_GROUP, DEFAULT_DISCOVERY_PORT};
use orbit_transport::MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Upper bound on `max_players`; slot numbers must fit comfortably in the
/// wire's `i32` fields.
pub const MAX_PLAYERS_LIMIT: usize = 255;

/// Tunables for a session.
///
/// Durations are written as milliseconds in JSON:
///
/// ```json
/// { "max_players": 4, "login_timeout_ms": 3000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Size of the slot table.
    pub max_players: usize,

    /// How long an accepted connection may take to send its
    /// `JoinRequest`. Clients use the same limit for the whole join
    /// handshake.
    #[serde(rename = "login_timeout_ms", with = "millis")]
    pub login_timeout: Duration,

    /// A peer that sends nothing for this long is treated as gone.
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,

    /// A `ConnectionTest` goes out when nothing else was sent for this
    /// long, so idle peers do not time each other out.
    #[serde(rename = "keepalive_interval_ms", with = "millis")]
    pub keepalive_interval: Duration,

    /// Most messages drained from one endpoint in a single pump.
    pub max_messages_per_pump: usize,

    /// Largest `player_data` blob a server admits. Every player's data
    /// goes out again in each new joiner's roster, so the whole table has
    /// to fit in one frame.
    pub max_player_data_len: usize,

    /// Refuse a second connection from an IP that already holds a slot.
    pub unique_remote_ips: bool,

    /// Hashed with `app_version` into the discovery header.
    pub app_id: String,
    pub app_version: String,

    pub discovery_group: Ipv4Addr,
    pub discovery_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            login_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(2),
            max_messages_per_pump: 256,
            max_player_data_len: 2048,
            unique_remote_ips: true,
            app_id: "orbit".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            discovery_group: DEFAULT_DISCOVERY_GROUP,
            discovery_port: DEFAULT_DISCOVERY_PORT,
        }
    }
}

impl SessionConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns a copy with out-of-range values clamped.
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 {
            tracing::warn!("max_players is 0, using 1");
            self.max_players = 1;
        } else if self.max_players > MAX_PLAYERS_LIMIT {
            tracing::warn!(
                max_players = self.max_players,
                limit = MAX_PLAYERS_LIMIT,
                "max_players too large, clamping"
            );
            self.max_players = MAX_PLAYERS_LIMIT;
        }
        if self.max_messages_per_pump == 0 {
            tracing::warn!("max_messages_per_pump is 0, using 1");
            self.max_messages_per_pump = 1;
        }
        let data_limit = player_data_limit(self.max_players);
        if self.max_player_data_len > data_limit {
            tracing::warn!(
                max_player_data_len = self.max_player_data_len,
                limit = data_limit,
                "player data limit would not fit a full roster in one frame, clamping"
            );
            self.max_player_data_len = data_limit;
        }
        if self.keepalive_interval >= self.idle_timeout {
            let interval = self.idle_timeout / 2;
            tracing::warn!(
                keepalive_ms = self.keepalive_interval.as_millis() as u64,
                idle_timeout_ms = self.idle_timeout.as_millis() as u64,
                "keepalive interval not below idle timeout, using half of it"
            );
            self.keepalive_interval = interval;
        }
        self
    }

    /// The discovery header for this application and version.
    pub fn protocol_header(&self) -> ProtocolHeader {
        ProtocolHeader::for_app(&self.app_id, &self.app_version)
    }

    /// Where search requests are sent.
    pub fn discovery_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.discovery_group, self.discovery_port))
    }
}

/// Half of a frame shared out across the slots; the other half covers
/// names and framing.
fn player_data_limit(max_players: usize) -> usize {
    MAX_FRAME_LEN / (2 * max_players.max(1))
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
