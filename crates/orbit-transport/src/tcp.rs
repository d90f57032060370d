//! Reliable transport over TCP, driven by tokio tasks.
//!
//! Each connection is served by one task that reads and writes
//! `u32`-length-prefixed frames. The pump thread talks to that task only
//! through unbounded channels, so [`Connection::try_recv`] and
//! [`Connection::send`] never block.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{Connection, ConnectionId, Connector, Listener, TransportError, MAX_FRAME_LEN};

enum Inbound {
    Frame(Vec<u8>),
    Failed(TransportError),
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// A TCP [`Listener`] bound on a tokio runtime.
pub struct TcpTransport {
    addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<TcpConnection>,
    accepting: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TcpTransport {
    /// Binds a listener on `addr`. Bind errors are returned here, not
    /// later from the accept loop.
    pub fn bind(addr: SocketAddr, runtime: &Handle) -> Result<Self, TransportError> {
        let bind_failed = |source| TransportError::BindFailed { addr, source };
        let std_listener = std::net::TcpListener::bind(addr).map_err(bind_failed)?;
        std_listener.set_nonblocking(true).map_err(bind_failed)?;
        let local = std_listener.local_addr().map_err(bind_failed)?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener).map_err(bind_failed)?
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let (accepting_tx, accepting_rx) = watch::channel(true);
        let task = runtime.spawn(accept_loop(listener, tx, accepting_rx));
        tracing::info!(addr = %local, "TCP transport listening");

        Ok(Self {
            addr: local,
            accepted: rx,
            accepting: accepting_tx,
            task,
        })
    }
}

impl Listener for TcpTransport {
    type Connection = TcpConnection;

    fn try_accept(&mut self) -> Result<Option<TcpConnection>, TransportError> {
        match self.accepted.try_recv() {
            Ok(conn) => Ok(Some(conn)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }

    fn set_accepting(&mut self, accepting: bool) {
        self.accepting.send_replace(accepting);
    }

    fn is_accepting(&self) -> bool {
        *self.accepting.borrow()
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    accepted: mpsc::UnboundedSender<TcpConnection>,
    mut accepting: watch::Receiver<bool>,
) {
    loop {
        if accepting.wait_for(|on| *on).await.is_err() {
            break;
        }
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote)) => {
                    let _ = stream.set_nodelay(true);
                    let conn = TcpConnection::spawn(
                        &Handle::current(),
                        remote,
                        std::future::ready(Ok(stream)),
                    );
                    tracing::debug!(id = %conn.id, %remote, "accepted TCP connection");
                    if accepted.send(conn).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
            changed = accepting.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("TCP accept loop stopped");
}

/// Opens [`TcpConnection`]s on a tokio runtime.
#[derive(Clone)]
pub struct TcpConnector {
    runtime: Handle,
}

impl TcpConnector {
    /// Creates a connector that spawns its I/O on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    fn connect(&mut self, addr: SocketAddr) -> Result<TcpConnection, TransportError> {
        Ok(TcpConnection::spawn(&self.runtime, addr, TcpStream::connect(addr)))
    }
}

/// A framed TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    remote: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl TcpConnection {
    fn spawn<F>(runtime: &Handle, remote: SocketAddr, connect: F) -> Self
    where
        F: Future<Output = std::io::Result<TcpStream>> + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        runtime.spawn(drive(connect, remote, inbound_tx, outbound_rx));
        Self {
            id: ConnectionId::next(),
            remote,
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }
}

impl Connection for TcpConnection {
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
        self.outbound
            .send(Outbound::Frame(frame.to_vec()))
            .map_err(|_| TransportError::ConnectionClosed("writer stopped".into()))
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.inbound.try_recv() {
            Ok(Inbound::Frame(frame)) => Ok(Some(frame)),
            Ok(Inbound::Failed(e)) => Err(e),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TransportError::ConnectionClosed("connection task ended".into()))
            }
        }
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn drive<F>(
    connect: F,
    remote: SocketAddr,
    inbound: mpsc::UnboundedSender<Inbound>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) where
    F: Future<Output = std::io::Result<TcpStream>>,
{
    let stream = match connect.await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = inbound.send(Inbound::Failed(TransportError::ConnectFailed {
                addr: remote,
                reason: e.to_string(),
            }));
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let read_side = async {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if inbound.send(Inbound::Frame(frame)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = inbound.send(Inbound::Failed(TransportError::ConnectionClosed(
                        "peer closed".into(),
                    )));
                    break;
                }
                Err(e) => {
                    let _ = inbound.send(Inbound::Failed(e));
                    break;
                }
            }
        }
    };

    let write_side = async {
        while let Some(command) = outbound.recv().await {
            match command {
                Outbound::Frame(frame) => {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        tracing::debug!(%remote, error = %e, "write failed");
                        break;
                    }
                }
                Outbound::Close => break,
            }
        }
        let _ = writer.shutdown().await;
    };

    tokio::select! {
        _ = read_side => {}
        _ = write_side => {}
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>, TransportError> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::ReceiveFailed(e)),
    }
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut frame = vec![0; len];
    reader
        .read_exact(&mut frame)
        .await
        .map_err(TransportError::ReceiveFailed)?;
    Ok(Some(frame))
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &[u8]) -> Result<(), TransportError> {
    let len = u32::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge(frame.len()))?;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(TransportError::SendFailed)?;
    writer.write_all(frame).await.map_err(TransportError::SendFailed)
}
