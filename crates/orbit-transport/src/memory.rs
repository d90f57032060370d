//! In-process network for deterministic tests.
//!
//! A [`MemoryNetwork`] is a shared registry of listeners and datagram
//! sockets keyed by `SocketAddr`. Connections are pairs of unbounded
//! channels, so frames are delivered in order and immediately, and a
//! dropped or closed end shows up as `ConnectionClosed` on the other end
//! once its queue is drained. Datagrams sent to an address registered as a
//! group are fanned out to every member.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{
    Connection, ConnectionId, Connector, DatagramSocket, Listener, TransportError, MAX_FRAME_LEN,
};

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Default)]
struct NetworkState {
    listeners: HashMap<SocketAddr, mpsc::UnboundedSender<MemoryConnection>>,
    sockets: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    groups: HashMap<SocketAddr, Vec<SocketAddr>>,
}

/// A shared in-memory network. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts listening for reliable connections on `addr`.
    pub fn listen(&self, addr: SocketAddr) -> Result<MemoryListener, TransportError> {
        let mut state = self.lock();
        if state.listeners.contains_key(&addr) {
            return Err(addr_in_use(addr));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.listeners.insert(addr, tx);
        Ok(MemoryListener {
            addr,
            network: self.clone(),
            backlog: rx,
            accepting: true,
        })
    }

    /// Creates a connector whose connections originate from `local_addr`.
    pub fn connector(&self, local_addr: SocketAddr) -> MemoryConnector {
        MemoryConnector {
            local_addr,
            network: self.clone(),
        }
    }

    /// Binds a datagram socket on `addr`.
    pub fn bind_datagram(&self, addr: SocketAddr) -> Result<MemoryDatagram, TransportError> {
        let mut state = self.lock();
        if state.sockets.contains_key(&addr) {
            return Err(addr_in_use(addr));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.sockets.insert(addr, tx);
        Ok(MemoryDatagram {
            addr,
            network: self.clone(),
            inbox: rx,
        })
    }
}

fn addr_in_use(addr: SocketAddr) -> TransportError {
    TransportError::BindFailed {
        addr,
        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
    }
}

/// Accepts connections made through a [`MemoryConnector`].
pub struct MemoryListener {
    addr: SocketAddr,
    network: MemoryNetwork,
    backlog: mpsc::UnboundedReceiver<MemoryConnection>,
    accepting: bool,
}

impl Listener for MemoryListener {
    type Connection = MemoryConnection;

    fn try_accept(&mut self) -> Result<Option<MemoryConnection>, TransportError> {
        if !self.accepting {
            return Ok(None);
        }
        match self.backlog.try_recv() {
            Ok(conn) => Ok(Some(conn)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }

    fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    fn is_accepting(&self) -> bool {
        self.accepting
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.network.lock().listeners.remove(&self.addr);
    }
}

/// Opens connections to [`MemoryListener`]s on the same network.
pub struct MemoryConnector {
    local_addr: SocketAddr,
    network: MemoryNetwork,
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn connect(&mut self, addr: SocketAddr) -> Result<MemoryConnection, TransportError> {
        let (client, server) = MemoryConnection::pair(self.local_addr, addr);
        let delivered = self
            .network
            .lock()
            .listeners
            .get(&addr)
            .is_some_and(|backlog| backlog.send(server).is_ok());
        if delivered {
            Ok(client)
        } else {
            Ok(client.failed(TransportError::ConnectFailed {
                addr,
                reason: "connection refused".into(),
            }))
        }
    }
}

/// One end of an in-memory reliable connection.
pub struct MemoryConnection {
    id: ConnectionId,
    remote: SocketAddr,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    failure: Option<TransportError>,
}

impl MemoryConnection {
    /// Creates both ends of a connection. The first end's remote is
    /// `server_addr`, the second end's remote is `client_addr`.
    pub fn pair(client_addr: SocketAddr, server_addr: SocketAddr) -> (Self, Self) {
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let client = Self {
            id: ConnectionId::next(),
            remote: server_addr,
            outbound: Some(to_server),
            inbound: from_server,
            failure: None,
        };
        let server = Self {
            id: ConnectionId::next(),
            remote: client_addr,
            outbound: Some(to_client),
            inbound: from_client,
            failure: None,
        };
        (client, server)
    }

    fn failed(mut self, error: TransportError) -> Self {
        self.outbound = None;
        self.failure = Some(error);
        self
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("closed locally".into()))?;
        outbound
            .send(frame.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if let Some(error) = self.failure.take() {
            return Err(error);
        }
        match self.inbound.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TransportError::ConnectionClosed("peer closed".into()))
            }
        }
    }

    fn close(&mut self) {
        self.outbound = None;
    }
}

/// An in-memory datagram socket.
pub struct MemoryDatagram {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: mpsc::UnboundedReceiver<Datagram>,
}

impl MemoryDatagram {
    /// Subscribes this socket to datagrams sent to `group`.
    pub fn join_group(&self, group: SocketAddr) {
        let mut state = self.network.lock();
        let members = state.groups.entry(group).or_default();
        if !members.contains(&self.addr) {
            members.push(self.addr);
        }
    }
}

impl DatagramSocket for MemoryDatagram {
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        let state = self.network.lock();
        let targets = match state.groups.get(&dest) {
            Some(members) => members.clone(),
            None => vec![dest],
        };
        for target in targets {
            // Unknown destinations drop silently, like UDP.
            if let Some(inbox) = state.sockets.get(&target) {
                let _ = inbox.send((datagram.to_vec(), self.addr));
            }
        }
        Ok(())
    }

    fn try_recv_from(&mut self) -> Result<Option<Datagram>, TransportError> {
        match self.inbox.try_recv() {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MemoryDatagram {
    fn drop(&mut self) {
        let mut state = self.network.lock();
        state.sockets.remove(&self.addr);
        for members in state.groups.values_mut() {
            members.retain(|member| *member != self.addr);
        }
    }
}
