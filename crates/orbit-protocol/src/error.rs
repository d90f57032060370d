//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes themselves were bad: too short,
//! an unknown tag, invalid text, or a foreign discovery header. Callers
//! discard the offending message and carry on.

/// Errors that can occur while decoding packets and messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The packet ended before a field could be read.
    #[error("truncated packet: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// The type tag does not name a known message.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A datagram carried another application's discovery header.
    #[error("discovery header mismatch: expected {expected:#010x}, got {actual:#010x}")]
    HeaderMismatch { expected: u32, actual: u32 },
}
