//! Framing for the connectionless discovery channel.
//!
//! Discovery datagrams share a multicast group with whatever else runs on
//! the LAN, so each one starts with a four-byte header derived from the
//! application's identity. Datagrams with any other header are dropped
//! before the message is parsed.

use std::net::Ipv4Addr;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::packet::{PacketReader, PacketWriter};
use crate::{Message, ProtocolError};

/// Multicast group servers listen on unless configured otherwise.
pub const DEFAULT_DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 77);

/// UDP port servers listen on unless configured otherwise.
pub const DEFAULT_DISCOVERY_PORT: u16 = 47777;

/// Identifies one application and version on the discovery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolHeader(u32);

impl ProtocolHeader {
    /// Hashes `app_id` and `app_version`; the header is the first four
    /// bytes of `SHA-256(app_id || 0x00 || app_version)`.
    pub fn for_app(app_id: &str, app_version: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(app_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(app_version.as_bytes());
        let digest = hasher.finalize();
        Self(u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Encodes and decodes header-prefixed discovery datagrams.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryCodec {
    header: ProtocolHeader,
}

impl DiscoveryCodec {
    pub fn new(header: ProtocolHeader) -> Self {
        Self { header }
    }

    pub fn header(&self) -> ProtocolHeader {
        self.header
    }

    pub fn encode(&self, message: &Message) -> Bytes {
        let mut out = PacketWriter::new();
        out.put_u32(self.header.raw());
        message.encode_into(&mut out);
        out.freeze()
    }

    /// Verifies the header, then decodes the message that follows it.
    pub fn decode(&self, datagram: &[u8]) -> Result<Message, ProtocolError> {
        let mut reader = PacketReader::new(datagram);
        let actual = reader.read_u32()?;
        if actual != self.header.raw() {
            return Err(ProtocolError::HeaderMismatch {
                expected: self.header.raw(),
                actual,
            });
        }
        Message::decode_from(&mut reader)
    }
}
