//! Transport abstraction layer for Orbit.
//!
//! Sessions are driven by a synchronous pump on the host's main loop, so
//! every trait here is non-blocking: receive calls return `Ok(None)` when
//! nothing is buffered, and sends only enqueue. Socket I/O that completes
//! on other threads is handed to the pump thread through queues.
//!
//! - [`Listener`] accepts inbound reliable connections.
//! - [`Connector`] opens outbound reliable connections.
//! - [`Connection`] is one ordered, reliable byte-frame stream.
//! - [`DatagramSocket`] sends and receives unreliable datagrams.
//!
//! # Feature Flags
//!
//! - `tokio-net` (default): TCP/UDP implementation on a tokio runtime
//!
//! The [`memory`] module is always available and is what the session
//! tests run against.

mod error;
pub mod memory;
#[cfg(feature = "tokio-net")]
mod tcp;
#[cfg(feature = "tokio-net")]
mod udp;

pub use error::TransportError;
#[cfg(feature = "tokio-net")]
pub use tcp::{TcpConnection, TcpConnector, TcpTransport};
#[cfg(feature = "tokio-net")]
pub use udp::UdpEndpoint;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest frame a [`Connection`] will carry, in bytes. Every
/// implementation refuses to send more with
/// [`TransportError::FrameTooLarge`].
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Counter for generating process-unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming reliable connections.
pub trait Listener: Send + 'static {
    /// The connection type produced by this listener.
    type Connection: Connection;

    /// Returns the next already-accepted connection, if any.
    fn try_accept(&mut self) -> Result<Option<Self::Connection>, TransportError>;

    /// Pauses or resumes accepting. While paused, no new connections are
    /// taken from the OS backlog.
    fn set_accepting(&mut self, accepting: bool);

    /// Returns `true` if the listener is currently accepting.
    fn is_accepting(&self) -> bool;

    /// The address the listener is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// Opens outbound reliable connections.
pub trait Connector: Send + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Starts connecting to `addr` and returns immediately.
    ///
    /// Frames sent before the connection is established are queued. A
    /// failure to connect is reported by a later [`Connection::try_recv`].
    fn connect(&mut self, addr: SocketAddr) -> Result<Self::Connection, TransportError>;
}

/// A single ordered, reliable connection carrying whole frames.
pub trait Connection: Send + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The remote peer's address.
    fn remote_addr(&self) -> SocketAddr;

    /// Queues one frame for delivery.
    ///
    /// Fails without queueing anything if the frame is longer than
    /// [`MAX_FRAME_LEN`].
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Returns the next received frame, `Ok(None)` if nothing is buffered.
    ///
    /// Returns an error once the connection has failed or was closed by
    /// the peer and every frame received before that has been drained.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Closes the connection after frames already queued are flushed.
    fn close(&mut self);
}

/// An unreliable, connectionless datagram endpoint.
pub trait DatagramSocket: Send + 'static {
    /// Sends one datagram to `dest`. Delivery is not guaranteed.
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError>;

    /// Returns the next received datagram and its source address.
    fn try_recv_from(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError>;

    /// The address the socket is bound to.
    fn local_addr(&self) -> SocketAddr;
}
