//! # Orbit
//!
//! LAN game sessions: one process hosts, others find it over multicast
//! discovery and join it over a reliable connection.
//!
//! Orbit does no I/O of its own. A host application calls `pump()` on a
//! [`ServerSession`] or [`ClientSession`] once per frame; each call drains
//! whatever the transports have buffered, advances the join/leave state
//! machines, and returns the resulting events in order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orbit::prelude::*;
//! use orbit::transport::{TcpConnector, TcpTransport, UdpEndpoint};
//!
//! # fn main() -> Result<(), OrbitError> {
//! let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! let config = SessionConfig::default();
//!
//! // Host
//! let listener = TcpTransport::bind(
//!     ([0, 0, 0, 0], config.discovery_port).into(),
//!     runtime.handle(),
//! )?;
//! let discovery =
//!     UdpEndpoint::bind_multicast(config.discovery_group, config.discovery_port, runtime.handle())?;
//! let mut server = ServerSession::new(config.clone(), listener, discovery);
//!
//! // Player
//! let search_socket = UdpEndpoint::bind(([0, 0, 0, 0], 0).into(), runtime.handle())?;
//! let mut client = ClientSession::new(config, TcpConnector::new(runtime.handle().clone()), search_socket);
//! client.search();
//!
//! loop {
//!     for event in server.pump() {
//!         println!("server: {event:?}");
//!     }
//!     for event in client.pump() {
//!         if let ClientEvent::GameInfoReceived(game) = &event {
//!             if client.state() == ConnectionState::Unconnected {
//!                 client.join(game.addr, "Nova", Bytes::new())?;
//!             }
//!         }
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod discovery;
mod error;
mod events;
mod server;
mod stats;
mod wire;

pub use client::ClientSession;
pub use error::OrbitError;
pub use events::{ClientEvent, DisconnectReason, DiscoveredGame, LeaveReason, ServerEvent};
pub use server::ServerSession;
pub use stats::PumpStats;

pub use orbit_protocol as protocol;
pub use orbit_roster as roster;
pub use orbit_session as session;
pub use orbit_transport as transport;

/// Everything a host application usually needs.
pub mod prelude {
    pub use crate::{
        ClientEvent, ClientSession, DisconnectReason, DiscoveredGame, LeaveReason, OrbitError,
        PumpStats, ServerEvent, ServerSession,
    };
    pub use orbit_protocol::{Bytes, JoinFailureReason};
    pub use orbit_roster::{Player, PlayerNumber};
    pub use orbit_session::{
        ConnectionState, DefaultHooks, JoinVerdict, ServerHooks, SessionConfig,
    };
}
