use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::{DatagramSocket, TransportError};

const MAX_DATAGRAM_LEN: usize = 64 * 1024;

type Datagram = (Vec<u8>, SocketAddr);

/// A UDP socket served by a tokio task.
pub struct UdpEndpoint {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Datagram>,
    inbound: mpsc::UnboundedReceiver<Datagram>,
    task: JoinHandle<()>,
}

impl UdpEndpoint {
    /// Binds a plain unicast socket. Port `0` picks an ephemeral port.
    pub fn bind(addr: SocketAddr, runtime: &Handle) -> Result<Self, TransportError> {
        let socket = std::net::UdpSocket::bind(addr)
            .map_err(|source| TransportError::BindFailed { addr, source })?;
        Self::start(addr, socket, runtime)
    }

    /// Binds `port` on all interfaces and joins the multicast `group`.
    ///
    /// Multicast loopback is enabled so a client on the same host as the
    /// server still hears it.
    pub fn bind_multicast(
        group: Ipv4Addr,
        port: u16,
        runtime: &Handle,
    ) -> Result<Self, TransportError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let bind_failed = |source| TransportError::BindFailed { addr, source };
        let socket = std::net::UdpSocket::bind(addr).map_err(bind_failed)?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(bind_failed)?;
        socket.set_multicast_loop_v4(true).map_err(bind_failed)?;
        tracing::debug!(%group, port, "joined discovery group");
        Self::start(addr, socket, runtime)
    }

    fn start(
        requested: SocketAddr,
        socket: std::net::UdpSocket,
        runtime: &Handle,
    ) -> Result<Self, TransportError> {
        let bind_failed = |source| TransportError::BindFailed {
            addr: requested,
            source,
        };
        socket.set_nonblocking(true).map_err(bind_failed)?;
        let addr = socket.local_addr().map_err(bind_failed)?;
        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(socket).map_err(bind_failed)?
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(serve(socket, inbound_tx, outbound_rx));

        Ok(Self {
            addr,
            outbound: outbound_tx,
            inbound: inbound_rx,
            task,
        })
    }
}

impl DatagramSocket for UdpEndpoint {
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.outbound
            .send((datagram.to_vec(), dest))
            .map_err(|_| TransportError::Shutdown)
    }

    fn try_recv_from(&mut self) -> Result<Option<Datagram>, TransportError> {
        match self.inbound.try_recv() {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for UdpEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: UdpSocket,
    inbound: mpsc::UnboundedSender<Datagram>,
    mut outbound: mpsc::UnboundedReceiver<Datagram>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    if inbound.send((buf[..len].to_vec(), from)).is_err() {
                        break;
                    }
                }
                // ICMP port-unreachable surfaces here on some platforms.
                Err(e) => tracing::trace!(error = %e, "datagram receive error"),
            },
            next = outbound.recv() => match next {
                Some((datagram, dest)) => {
                    if let Err(e) = socket.send_to(&datagram, dest).await {
                        tracing::debug!(%dest, error = %e, "datagram send failed");
                    }
                }
                None => break,
            },
        }
    }
}
