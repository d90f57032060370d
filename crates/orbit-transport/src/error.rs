use std::net::SocketAddr;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed by either side.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The outbound connection could not be established.
    #[error("connect to {addr} failed: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A socket could not be bound.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A stream frame exceeded the maximum frame size.
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
