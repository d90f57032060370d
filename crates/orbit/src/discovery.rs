use std::net::SocketAddr;

use orbit_protocol::{DiscoveryCodec, Message, ProtocolError};
use orbit_transport::{DatagramSocket, TransportError};

/// A datagram socket speaking header-checked discovery messages.
pub(crate) struct DiscoveryEndpoint<D> {
    socket: D,
    codec: DiscoveryCodec,
}

pub(crate) type Received = (Result<Message, ProtocolError>, SocketAddr);

impl<D: DatagramSocket> DiscoveryEndpoint<D> {
    pub(crate) fn new(socket: D, codec: DiscoveryCodec) -> Self {
        Self { socket, codec }
    }

    /// Sends one datagram. Loss is expected, so failures are only logged.
    pub(crate) fn send(&mut self, message: &Message, dest: SocketAddr) {
        let datagram = self.codec.encode(message);
        if let Err(e) = self.socket.send_to(&datagram, dest) {
            tracing::debug!(%dest, error = %e, "discovery send failed");
        }
    }

    pub(crate) fn try_recv(&mut self) -> Result<Option<Received>, TransportError> {
        let Some((datagram, from)) = self.socket.try_recv_from()? else {
            return Ok(None);
        };
        Ok(Some((self.codec.decode(&datagram), from)))
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }
}
