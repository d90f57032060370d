//! The hosting side of a session.
//!
//! A [`ServerSession`] owns the authoritative slot table. Each call to
//! [`ServerSession::pump_at`] runs one non-blocking pass:
//!
//!   1. Accept new connections as pending logins
//!   2. Answer discovery requests
//!   3. Read the first message of each pending login and admit or reject
//!   4. Drain every admitted player's stream
//!   5. Expire stale logins and idle players
//!   6. Send keepalives, then pause or resume accepting by capacity
//!
//! Network trouble never escapes the pump. A bad message is counted and
//! dropped; a dead connection becomes a `PlayerLeft` event.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use orbit_protocol::{
    Bytes, DiscoveryCodec, GameInfo, JoinAccepted, JoinFailureReason, JoinRequest, JoinResponse,
    Message, Role,
};
use orbit_roster::{Player, PlayerNumber, PlayerRegistry};
use orbit_session::{
    DefaultHooks, JoinVerdict, PendingLogins, ServerHooks, SessionConfig, SessionError,
};
use orbit_transport::{Connection, DatagramSocket, Listener};

use crate::discovery::DiscoveryEndpoint;
use crate::wire::{check_frame_len, send_frame, wire_count};
use crate::{LeaveReason, OrbitError, PumpStats, ServerEvent};

/// An admitted player's connection.
struct Peer<C> {
    conn: C,
    last_recv: Instant,
    last_send: Instant,
}

impl<C: Connection> Peer<C> {
    fn send(&mut self, frame: &[u8], now: Instant) {
        send_frame(&mut self.conn, frame);
        self.last_send = now;
    }
}

/// A game host: discovery responder, join admission, and player streams.
///
/// `L` accepts reliable connections, `D` is the discovery socket (already
/// joined to the discovery group), and `H` supplies the application's
/// admission and game-info hooks.
pub struct ServerSession<L: Listener, D, H = DefaultHooks> {
    config: SessionConfig,
    listener: L,
    discovery: DiscoveryEndpoint<D>,
    hooks: H,
    registry: PlayerRegistry,
    peers: BTreeMap<PlayerNumber, Peer<L::Connection>>,
    pending: PendingLogins<L::Connection>,
    events: Vec<ServerEvent>,
    stats: PumpStats,
    clock: Instant,
}

impl<L: Listener, D: DatagramSocket> ServerSession<L, D, DefaultHooks> {
    /// Creates a server that admits everyone and advertises no custom data.
    pub fn new(config: SessionConfig, listener: L, discovery: D) -> Self {
        Self::with_hooks(config, listener, discovery, DefaultHooks)
    }
}

impl<L, D, H> ServerSession<L, D, H>
where
    L: Listener,
    D: DatagramSocket,
    H: ServerHooks,
{
    /// Creates a server whose admission and discovery answers come from
    /// `hooks`. Out-of-range config values are clamped first.
    pub fn with_hooks(config: SessionConfig, mut listener: L, discovery: D, hooks: H) -> Self {
        let config = config.validated();
        listener.set_accepting(true);
        tracing::info!(
            addr = %listener.local_addr(),
            discovery = %discovery.local_addr(),
            max_players = config.max_players,
            "server session started"
        );
        Self {
            registry: PlayerRegistry::new(config.max_players),
            discovery: DiscoveryEndpoint::new(discovery, DiscoveryCodec::new(config.protocol_header())),
            config,
            listener,
            hooks,
            peers: BTreeMap::new(),
            pending: PendingLogins::new(),
            events: Vec::new(),
            stats: PumpStats::default(),
            clock: Instant::now(),
        }
    }

    /// Runs one pump pass against the current time.
    pub fn pump(&mut self) -> Vec<ServerEvent> {
        self.pump_at(Instant::now())
    }

    /// Runs one pump pass as if the time were `now`, and returns the events
    /// it produced in order. Events queued by [`kick`](Self::kick) since
    /// the previous pass come first.
    pub fn pump_at(&mut self, now: Instant) -> Vec<ServerEvent> {
        self.clock = now;
        self.accept_connections(now);
        self.poll_discovery();
        self.poll_pending(now);
        self.poll_players(now);
        self.expire(now);
        self.send_keepalives(now);
        self.update_backpressure();
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Pump stages
    // -----------------------------------------------------------------------

    fn accept_connections(&mut self, now: Instant) {
        for _ in 0..self.config.max_messages_per_pump {
            if !self.listener.is_accepting() {
                break;
            }
            let mut conn = match self.listener.try_accept() {
                Ok(Some(conn)) => conn,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    break;
                }
            };
            let remote = conn.remote_addr();
            if self.config.unique_remote_ips && self.ip_in_game(remote.ip()) {
                tracing::debug!(%remote, "refusing connection from an address already in game");
                conn.close();
                continue;
            }
            tracing::debug!(conn = %conn.id(), %remote, "connection accepted, awaiting join request");
            self.pending.insert(conn, now);
        }
    }

    fn poll_discovery(&mut self) {
        for _ in 0..self.config.max_messages_per_pump {
            let (decoded, from) = match self.discovery.try_recv() {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "discovery socket failed");
                    break;
                }
            };
            match decoded {
                Ok(Message::GameInfoRequest) => {
                    let response = Message::GameInfoResponse(GameInfo {
                        max_players: wire_count(self.registry.max_players()),
                        num_players: wire_count(self.registry.len()),
                        custom_data: self.hooks.game_info(),
                    });
                    self.discovery.send(&response, from);
                    self.stats.handled += 1;
                    tracing::trace!(%from, "answered game info request");
                }
                Ok(other) => {
                    self.stats.unhandled += 1;
                    tracing::debug!(%from, kind = ?other.message_type(), "ignoring discovery message");
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    tracing::debug!(%from, error = %e, "discarding malformed datagram");
                }
            }
        }
    }

    fn poll_pending(&mut self, now: Instant) {
        for id in self.pending.ids() {
            let Some(login) = self.pending.get_mut(id) else {
                continue;
            };
            let frame = match login.conn.try_recv() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(conn = %id, error = %e, "connection dropped before joining");
                    self.pending.remove(id);
                    continue;
                }
            };
            let Some(login) = self.pending.remove(id) else {
                continue;
            };
            let mut conn = login.conn;
            match Message::decode(&frame) {
                Ok(Message::JoinRequest(request)) => {
                    self.stats.handled += 1;
                    self.handle_join(conn, request, now);
                }
                Ok(other) => {
                    self.stats.unhandled += 1;
                    tracing::debug!(conn = %id, kind = ?other.message_type(), "first message was not a join request");
                    conn.close();
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    tracing::debug!(conn = %id, error = %e, "malformed join request");
                    conn.close();
                }
            }
        }
    }

    fn poll_players(&mut self, now: Instant) {
        let numbers: Vec<PlayerNumber> = self.peers.keys().copied().collect();
        for number in numbers {
            for _ in 0..self.config.max_messages_per_pump {
                let Some(peer) = self.peers.get_mut(&number) else {
                    break;
                };
                let frame = match peer.conn.try_recv() {
                    Ok(Some(frame)) => {
                        peer.last_recv = now;
                        frame
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(player = %number, error = %e, "player connection lost");
                        self.remove_player(number, LeaveReason::ConnectionLost);
                        break;
                    }
                };
                if !self.handle_player_frame(number, &frame) {
                    break;
                }
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        for mut login in self.pending.expire_stale(now, self.config.login_timeout) {
            tracing::debug!(
                conn = %login.conn.id(),
                remote = %login.conn.remote_addr(),
                "login timed out"
            );
            login.conn.close();
        }

        let timeout = self.config.idle_timeout;
        let idle: Vec<PlayerNumber> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.saturating_duration_since(peer.last_recv) >= timeout)
            .map(|(number, _)| *number)
            .collect();
        for number in idle {
            self.remove_player(number, LeaveReason::TimedOut);
        }
    }

    fn send_keepalives(&mut self, now: Instant) {
        let interval = self.config.keepalive_interval;
        let ping = Message::ConnectionTest.encode();
        for peer in self.peers.values_mut() {
            if now.saturating_duration_since(peer.last_send) >= interval {
                peer.send(&ping, now);
            }
        }
    }

    /// Stops taking connections while every slot is taken.
    fn update_backpressure(&mut self) {
        let accepting = !self.registry.is_full();
        if self.listener.is_accepting() == accepting {
            return;
        }
        self.listener.set_accepting(accepting);
        if accepting {
            tracing::info!("slot freed, accepting connections again");
        } else {
            tracing::info!("server full, no longer accepting connections");
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    fn handle_join(&mut self, mut conn: L::Connection, request: JoinRequest, now: Instant) {
        let remote = conn.remote_addr();
        if self.config.unique_remote_ips && self.ip_in_game(remote.ip()) {
            return Self::reject(conn, JoinFailureReason::AlreadyInGame);
        }
        let Some(number) = self.registry.lowest_free() else {
            return Self::reject(conn, JoinFailureReason::GameFull);
        };
        let trimmed = request.player_name.trim();
        if trimmed.is_empty() {
            return Self::reject(conn, JoinFailureReason::InvalidName);
        }
        if request.player_data.len() > self.config.max_player_data_len {
            tracing::debug!(
                %remote,
                len = request.player_data.len(),
                limit = self.config.max_player_data_len,
                "player data too large"
            );
            return Self::reject(conn, JoinFailureReason::Unknown);
        }
        let name = self.registry.unique_name(trimmed, number);

        let extra_data = match self.hooks.review_join(number, &name, &request.player_data) {
            JoinVerdict::Allow { extra_data } => extra_data,
            JoinVerdict::Block { reason } => {
                tracing::debug!(%remote, player = %number, "join vetoed by host");
                return Self::reject(conn, reason.unwrap_or(JoinFailureReason::Unknown));
            }
        };

        let player = Player::new(number, name, request.player_data);
        if let Err(e) = self.registry.insert(player.clone()) {
            tracing::warn!(error = %e, "slot allocation failed");
            return Self::reject(conn, JoinFailureReason::Unknown);
        }

        // Nobody has heard of the player until the response is on its way;
        // any failure up to then gives the slot back.
        let accepted = Message::JoinResponse(JoinResponse::Accepted(JoinAccepted {
            number: number.to_wire(),
            num_players: wire_count(self.registry.len()),
            max_players: wire_count(self.registry.max_players()),
            roster: self.registry.iter().map(Player::to_info).collect(),
            extra_data,
        }))
        .encode();
        if let Err(e) = check_frame_len(&accepted).and_then(|()| conn.send(&accepted)) {
            tracing::warn!(%remote, player = %number, error = %e, "join response could not be sent");
            self.registry.remove(number);
            return Self::reject(conn, JoinFailureReason::Unknown);
        }
        let peer = Peer {
            conn,
            last_recv: now,
            last_send: now,
        };

        let joined = Message::PlayerJoined(player.to_info()).encode();
        for other in self.peers.values_mut() {
            other.send(&joined, now);
        }
        self.peers.insert(number, peer);

        tracing::info!(player = %number, name = %player.name, %remote, "player joined");
        self.events.push(ServerEvent::PlayerJoined(player));
    }

    fn reject(mut conn: L::Connection, reason: JoinFailureReason) {
        tracing::debug!(remote = %conn.remote_addr(), %reason, "join rejected");
        let response = Message::JoinResponse(JoinResponse::Rejected(reason));
        send_frame(&mut conn, &response.encode());
        conn.close();
    }

    /// Handles one frame from an admitted player. Returns `false` once the
    /// player is gone.
    fn handle_player_frame(&mut self, number: PlayerNumber, frame: &[u8]) -> bool {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::debug!(player = %number, error = %e, "discarding malformed message");
                return true;
            }
        };
        let kind = message.message_type();
        if !kind.is_handled_by(Role::Server) || kind.is_discovery() {
            self.stats.unhandled += 1;
            tracing::debug!(player = %number, ?kind, "ignoring message");
            return true;
        }

        self.stats.handled += 1;
        match message {
            Message::Leave => {
                self.remove_player(number, LeaveReason::Left);
                return false;
            }
            Message::Data(payload) => {
                self.events.push(ServerEvent::Data {
                    from: number,
                    payload,
                });
            }
            Message::JoinRequest(_) => {
                tracing::debug!(player = %number, "join request from a player already in game");
                let response = Message::JoinResponse(JoinResponse::Rejected(
                    JoinFailureReason::AlreadyInGame,
                ));
                let now = self.clock;
                if let Some(peer) = self.peers.get_mut(&number) {
                    peer.send(&response.encode(), now);
                }
            }
            // ConnectionTest only refreshes the idle timer.
            _ => {}
        }
        true
    }

    fn remove_player(&mut self, number: PlayerNumber, reason: LeaveReason) {
        if let Some(mut peer) = self.peers.remove(&number) {
            peer.conn.close();
        }
        let Some(player) = self.registry.remove(number) else {
            return;
        };

        let left = Message::PlayerLeft {
            number: number.to_wire(),
        }
        .encode();
        let now = self.clock;
        for peer in self.peers.values_mut() {
            peer.send(&left, now);
        }

        tracing::info!(player = %number, name = %player.name, ?reason, "player left");
        self.events.push(ServerEvent::PlayerLeft { player, reason });
    }

    fn ip_in_game(&self, ip: IpAddr) -> bool {
        self.peers
            .values()
            .any(|peer| peer.conn.remote_addr().ip() == ip)
    }

    /// Timestamp for work done outside a pump.
    fn now(&self) -> Instant {
        self.clock.max(Instant::now())
    }

    // -----------------------------------------------------------------------
    // Host operations
    // -----------------------------------------------------------------------

    /// Sends an opaque payload to one player.
    ///
    /// Fails if nobody holds `number` or the payload does not fit in one
    /// frame. A connection that breaks later shows up as a `PlayerLeft`
    /// from the pump.
    pub fn send_to(&mut self, number: PlayerNumber, payload: impl Into<Bytes>) -> Result<(), OrbitError> {
        let now = self.now();
        let peer = self
            .peers
            .get_mut(&number)
            .ok_or(SessionError::UnknownPlayer(number))?;
        let frame = Message::Data(payload.into()).encode();
        check_frame_len(&frame)?;
        peer.send(&frame, now);
        Ok(())
    }

    /// Sends an opaque payload to every player. An oversized payload is
    /// refused before anyone receives it.
    pub fn broadcast(&mut self, payload: impl Into<Bytes>) -> Result<(), OrbitError> {
        let now = self.now();
        let frame = Message::Data(payload.into()).encode();
        check_frame_len(&frame)?;
        for peer in self.peers.values_mut() {
            peer.send(&frame, now);
        }
        Ok(())
    }

    /// Sends an opaque payload to every player except `except`.
    pub fn broadcast_except(
        &mut self,
        except: PlayerNumber,
        payload: impl Into<Bytes>,
    ) -> Result<(), OrbitError> {
        let now = self.now();
        let frame = Message::Data(payload.into()).encode();
        check_frame_len(&frame)?;
        for (number, peer) in self.peers.iter_mut() {
            if *number != except {
                peer.send(&frame, now);
            }
        }
        Ok(())
    }

    /// Removes a player. They are told first with a `PlayerLeft` naming
    /// their own slot, then everyone else is told as for a normal leave.
    ///
    /// The resulting [`ServerEvent::PlayerLeft`] is returned by the next
    /// pump.
    pub fn kick(&mut self, number: PlayerNumber) -> Result<(), SessionError> {
        let now = self.now();
        let peer = self
            .peers
            .get_mut(&number)
            .ok_or(SessionError::UnknownPlayer(number))?;
        let notice = Message::PlayerLeft {
            number: number.to_wire(),
        };
        peer.send(&notice.encode(), now);
        self.remove_player(number, LeaveReason::Kicked);
        self.update_backpressure();
        Ok(())
    }

    /// Tells every player they are leaving, closes all connections, and
    /// returns the final events, including one `PlayerLeft` per player.
    pub fn shutdown(mut self) -> Vec<ServerEvent> {
        let now = self.now();
        for (number, mut peer) in std::mem::take(&mut self.peers) {
            let notice = Message::PlayerLeft {
                number: number.to_wire(),
            };
            peer.send(&notice.encode(), now);
            peer.conn.close();
        }
        for player in self.registry.clear() {
            self.events.push(ServerEvent::PlayerLeft {
                player,
                reason: LeaveReason::Shutdown,
            });
        }
        for mut login in self.pending.drain() {
            login.conn.close();
        }
        self.listener.set_accepting(false);
        tracing::info!("server session shut down");
        self.events
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Admitted players in slot order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.registry.iter()
    }

    /// The player holding `number`, if any.
    pub fn player(&self, number: PlayerNumber) -> Option<&Player> {
        self.registry.get(number)
    }

    /// Number of admitted players.
    pub fn num_players(&self) -> usize {
        self.registry.len()
    }

    /// Size of the slot table.
    pub fn max_players(&self) -> usize {
        self.registry.max_players()
    }

    /// `true` while every slot is taken.
    pub fn is_full(&self) -> bool {
        self.registry.is_full()
    }

    /// Connections accepted but not yet admitted or rejected.
    pub fn pending_logins(&self) -> usize {
        self.pending.len()
    }

    /// Whether the listener is currently taking connections.
    pub fn is_accepting(&self) -> bool {
        self.listener.is_accepting()
    }

    /// Address players connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Address discovery requests are answered on.
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery.local_addr()
    }

    /// Message counters since the server started.
    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// The validated config in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The application hooks, for updating what they advertise.
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}
