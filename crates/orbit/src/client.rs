//! The joining side of a session.
//!
//! A [`ClientSession`] moves through [`ConnectionState`]: `join` sends a
//! single `JoinRequest` and enters `Connecting`; a valid `JoinResponse`
//! moves it to `Connected` with a mirror of the server's roster. Any
//! failure, a `leave`, or a `PlayerLeft` naming our own slot returns it to
//! `Unconnected` with an event saying why.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use orbit_protocol::{
    Bytes, DiscoveryCodec, JoinAccepted, JoinFailureReason, JoinRequest, JoinResponse, Message,
    MessageType, PlayerInfo, Role,
};
use orbit_roster::{Player, PlayerNumber, PlayerRegistry};
use orbit_session::{ConnectionState, SessionConfig, SessionError, MAX_PLAYERS_LIMIT};
use orbit_transport::{Connection, Connector, DatagramSocket, TransportError};

use crate::discovery::DiscoveryEndpoint;
use crate::wire::{check_frame_len, send_frame};
use crate::{ClientEvent, DisconnectReason, DiscoveredGame, OrbitError, PumpStats};

/// The reliable connection to the host.
struct Link<C> {
    conn: C,
    server: SocketAddr,
    started_at: Instant,
    last_recv: Instant,
    last_send: Instant,
}

/// A validated successful join.
#[derive(Debug)]
struct AcceptedJoin {
    local: PlayerNumber,
    roster: PlayerRegistry,
    extra_data: Bytes,
}

/// A player process that finds games and joins one.
pub struct ClientSession<C: Connector, D> {
    config: SessionConfig,
    connector: C,
    discovery: DiscoveryEndpoint<D>,
    state: ConnectionState,
    link: Option<Link<C::Connection>>,
    local: Option<PlayerNumber>,
    roster: PlayerRegistry,
    known_games: HashMap<SocketAddr, DiscoveredGame>,
    events: Vec<ClientEvent>,
    stats: PumpStats,
    clock: Instant,
}

impl<C, D> ClientSession<C, D>
where
    C: Connector,
    D: DatagramSocket,
{
    /// Creates an unconnected client. `discovery` is a plain unicast
    /// socket; search requests go to the configured discovery group.
    pub fn new(config: SessionConfig, connector: C, discovery: D) -> Self {
        let config = config.validated();
        Self {
            discovery: DiscoveryEndpoint::new(discovery, DiscoveryCodec::new(config.protocol_header())),
            config,
            connector,
            state: ConnectionState::Unconnected,
            link: None,
            local: None,
            roster: PlayerRegistry::new(0),
            known_games: HashMap::new(),
            events: Vec::new(),
            stats: PumpStats::default(),
            clock: Instant::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Application operations
    // -----------------------------------------------------------------------

    /// Starts joining the game at `addr`.
    ///
    /// # Errors
    /// [`SessionError::AlreadyJoined`] unless the client is unconnected,
    /// and [`TransportError::FrameTooLarge`] if the request does not fit in
    /// one frame. Connection failures are reported later as
    /// [`ClientEvent::JoinFailed`], not here.
    pub fn join(
        &mut self,
        addr: SocketAddr,
        name: &str,
        data: impl Into<Bytes>,
    ) -> Result<(), OrbitError> {
        if self.state != ConnectionState::Unconnected {
            return Err(SessionError::AlreadyJoined(self.state).into());
        }
        let request = Message::JoinRequest(JoinRequest {
            player_name: name.to_owned(),
            player_data: data.into(),
        })
        .encode();
        check_frame_len(&request)?;
        let mut conn = self.connector.connect(addr)?;
        send_frame(&mut conn, &request);

        let now = self.now();
        self.link = Some(Link {
            conn,
            server: addr,
            started_at: now,
            last_recv: now,
            last_send: now,
        });
        self.state = ConnectionState::Connecting;
        tracing::info!(%addr, name, "joining game");
        Ok(())
    }

    /// Leaves the current game, or abandons a join in progress.
    ///
    /// A `Leave` is sent best-effort when connected. The resulting
    /// [`ClientEvent::Disconnected`] is returned by the next pump. Calling
    /// this while unconnected does nothing.
    pub fn leave(&mut self) {
        match self.state {
            ConnectionState::Unconnected => return,
            ConnectionState::Connecting => {}
            ConnectionState::Connected => {
                if let Some(link) = self.link.as_mut() {
                    send_frame(&mut link.conn, &Message::Leave.encode());
                }
            }
        }
        tracing::info!("leaving game");
        self.disconnect(DisconnectReason::Left);
    }

    /// Sends an opaque payload to the host.
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] unless connected, and
    /// [`TransportError::FrameTooLarge`] if the payload does not fit in one
    /// frame. A connection that breaks later is reported by the pump.
    pub fn send(&mut self, payload: impl Into<Bytes>) -> Result<(), OrbitError> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected.into());
        }
        let now = self.now();
        let link = self.link.as_mut().ok_or(SessionError::NotConnected)?;
        let frame = Message::Data(payload.into()).encode();
        check_frame_len(&frame)?;
        send_frame(&mut link.conn, &frame);
        link.last_send = now;
        Ok(())
    }

    /// Sends one `GameInfoRequest` to the discovery group. Answers arrive
    /// as [`ClientEvent::GameInfoReceived`] and in [`known_games`](Self::known_games).
    pub fn search(&mut self) {
        let group = self.config.discovery_addr();
        tracing::debug!(%group, "searching for games");
        self.discovery.send(&Message::GameInfoRequest, group);
    }

    /// Sends one `GameInfoRequest` straight to `addr`.
    pub fn query(&mut self, addr: SocketAddr) {
        self.discovery.send(&Message::GameInfoRequest, addr);
    }

    /// Every server that answered a search, latest answer per address.
    pub fn known_games(&self) -> impl Iterator<Item = &DiscoveredGame> {
        self.known_games.values()
    }

    /// Drops every cached search answer.
    pub fn forget_games(&mut self) {
        self.known_games.clear();
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    /// Runs one non-blocking pass against the current time.
    pub fn pump(&mut self) -> Vec<ClientEvent> {
        self.pump_at(Instant::now())
    }

    /// Runs one non-blocking pass as if the time were `now` and returns
    /// the events produced, in order.
    pub fn pump_at(&mut self, now: Instant) -> Vec<ClientEvent> {
        self.clock = now;
        self.poll_discovery(now);
        self.poll_link(now);
        self.check_timeouts(now);
        self.send_keepalive(now);
        std::mem::take(&mut self.events)
    }

    fn poll_discovery(&mut self, now: Instant) {
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
                Ok(Message::GameInfoResponse(info))
                    if info.num_players < 0 || info.num_players > info.max_players =>
                {
                    self.stats.malformed += 1;
                    tracing::debug!(
                        %from,
                        players = info.num_players,
                        max = info.max_players,
                        "discarding game info with impossible counts"
                    );
                }
                Ok(Message::GameInfoResponse(info)) => {
                    self.stats.handled += 1;
                    let game = DiscoveredGame {
                        addr: from,
                        num_players: info.num_players,
                        max_players: info.max_players,
                        custom_data: info.custom_data,
                        last_seen: now,
                    };
                    tracing::debug!(%from, players = game.num_players, max = game.max_players, "found game");
                    self.known_games.insert(from, game.clone());
                    self.events.push(ClientEvent::GameInfoReceived(game));
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

    fn poll_link(&mut self, now: Instant) {
        for _ in 0..self.config.max_messages_per_pump {
            let Some(link) = self.link.as_mut() else {
                break;
            };
            let frame = match link.conn.try_recv() {
                Ok(Some(frame)) => {
                    link.last_recv = now;
                    frame
                }
                Ok(None) => break,
                Err(e) => {
                    self.connection_failed(e);
                    break;
                }
            };
            self.handle_frame(&frame);
        }
    }

    fn check_timeouts(&mut self, now: Instant) {
        let Some(link) = &self.link else {
            return;
        };
        let server = link.server;
        let handshake_expired =
            now.saturating_duration_since(link.started_at) >= self.config.login_timeout;
        let idle_expired = now.saturating_duration_since(link.last_recv) >= self.config.idle_timeout;

        match self.state {
            ConnectionState::Connecting if handshake_expired => {
                tracing::info!(%server, "join timed out");
                self.fail_join(JoinFailureReason::ConnectionFailed);
            }
            ConnectionState::Connected if idle_expired => {
                tracing::warn!(%server, "server stopped responding");
                self.disconnect(DisconnectReason::TimedOut);
            }
            _ => {}
        }
    }

    fn send_keepalive(&mut self, now: Instant) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let interval = self.config.keepalive_interval;
        if let Some(link) = self.link.as_mut() {
            if now.saturating_duration_since(link.last_send) >= interval {
                send_frame(&mut link.conn, &Message::ConnectionTest.encode());
                link.last_send = now;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Message handling
    // -----------------------------------------------------------------------

    fn handle_frame(&mut self, frame: &[u8]) {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed += 1;
                let join_response = frame.first() == Some(&u8::from(MessageType::JoinResponse));
                if self.state == ConnectionState::Connecting && join_response {
                    tracing::warn!(error = %e, "malformed join response");
                    self.fail_join(JoinFailureReason::InvalidServerData);
                } else {
                    tracing::debug!(error = %e, "discarding malformed message");
                }
                return;
            }
        };
        let kind = message.message_type();
        if !kind.is_handled_by(Role::Client) || kind.is_discovery() {
            self.stats.unhandled += 1;
            tracing::debug!(?kind, "ignoring message");
            return;
        }

        match (self.state, message) {
            (ConnectionState::Connecting, Message::JoinResponse(response)) => {
                self.handle_join_response(response);
            }
            (ConnectionState::Connected, Message::PlayerJoined(info)) => {
                self.handle_player_joined(info);
            }
            (ConnectionState::Connected, Message::PlayerLeft { number }) => {
                self.handle_player_left(number);
            }
            (ConnectionState::Connected, Message::Data(payload)) => {
                self.stats.handled += 1;
                self.events.push(ClientEvent::Data(payload));
            }
            (ConnectionState::Connecting | ConnectionState::Connected, Message::ConnectionTest) => {
                self.stats.handled += 1;
            }
            (state, message) => {
                self.stats.unhandled += 1;
                tracing::debug!(%state, kind = ?message.message_type(), "ignoring message in this state");
            }
        }
    }

    fn handle_join_response(&mut self, response: JoinResponse) {
        match response {
            JoinResponse::Rejected(reason) => {
                self.stats.handled += 1;
                tracing::info!(%reason, "join rejected");
                self.fail_join(reason);
            }
            JoinResponse::Accepted(accepted) => match validate_join(accepted) {
                Ok(joined) => {
                    self.stats.handled += 1;
                    self.complete_join(joined);
                }
                Err(problem) => {
                    self.stats.malformed += 1;
                    tracing::warn!(problem, "server sent an inconsistent join response");
                    self.fail_join(JoinFailureReason::InvalidServerData);
                }
            },
        }
    }

    fn complete_join(&mut self, joined: AcceptedJoin) {
        let AcceptedJoin {
            local,
            roster,
            extra_data,
        } = joined;
        self.state = ConnectionState::Connected;
        self.local = Some(local);
        self.roster = roster;
        tracing::info!(
            local = %local,
            players = self.roster.len(),
            max_players = self.roster.max_players(),
            "joined game"
        );

        self.events.push(ClientEvent::Joined { local, extra_data });
        for player in self.roster.iter().filter(|player| player.number != local) {
            self.events.push(ClientEvent::PlayerJoined(player.clone()));
        }
    }

    fn handle_player_joined(&mut self, info: PlayerInfo) {
        let Some(number) = PlayerNumber::from_wire(info.number) else {
            self.stats.malformed += 1;
            tracing::debug!(number = info.number, "player joined with a negative slot");
            return;
        };
        match self.roster.insert(Player::new(number, info.name, info.data)) {
            Ok(player) => {
                let player = player.clone();
                self.stats.handled += 1;
                tracing::info!(player = %number, name = %player.name, "player joined");
                self.events.push(ClientEvent::PlayerJoined(player));
            }
            Err(e) => {
                self.stats.malformed += 1;
                tracing::debug!(error = %e, "discarding invalid player joined");
            }
        }
    }

    fn handle_player_left(&mut self, number: i32) {
        let Some(number) = PlayerNumber::from_wire(number) else {
            self.stats.malformed += 1;
            return;
        };
        if Some(number) == self.local {
            self.stats.handled += 1;
            tracing::info!("removed from game by server");
            self.disconnect(DisconnectReason::Kicked);
            return;
        }
        match self.roster.remove(number) {
            Some(player) => {
                self.stats.handled += 1;
                tracing::info!(player = %number, name = %player.name, "player left");
                self.events.push(ClientEvent::PlayerLeft(player));
            }
            None => {
                self.stats.unhandled += 1;
                tracing::debug!(player = %number, "player left for an empty slot");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    fn connection_failed(&mut self, error: TransportError) {
        match self.state {
            ConnectionState::Connecting => {
                tracing::warn!(error = %error, "could not reach server");
                self.fail_join(JoinFailureReason::ConnectionFailed);
            }
            ConnectionState::Connected => {
                tracing::warn!(error = %error, "connection to server lost");
                self.disconnect(DisconnectReason::ConnectionLost);
            }
            ConnectionState::Unconnected => {}
        }
    }

    fn fail_join(&mut self, reason: JoinFailureReason) {
        self.teardown();
        self.events.push(ClientEvent::JoinFailed { reason });
    }

    fn disconnect(&mut self, reason: DisconnectReason) {
        self.teardown();
        self.events.push(ClientEvent::Disconnected { reason });
    }

    fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.conn.close();
        }
        self.state = ConnectionState::Unconnected;
        self.local = None;
        self.roster = PlayerRegistry::new(0);
    }

    fn now(&self) -> Instant {
        self.clock.max(Instant::now())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Where the join/leave state machine stands.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Our own slot, once connected.
    pub fn local_player_number(&self) -> Option<PlayerNumber> {
        self.local
    }

    /// Our own entry in the roster mirror, once connected.
    pub fn local_player(&self) -> Option<&Player> {
        self.local.and_then(|number| self.roster.get(number))
    }

    /// Every player in the game, ourselves included, in slot order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.roster.iter()
    }

    /// The player holding `number`, if any.
    pub fn player(&self, number: PlayerNumber) -> Option<&Player> {
        self.roster.get(number)
    }

    /// Players in the game, ourselves included.
    pub fn num_players(&self) -> usize {
        self.roster.len()
    }

    /// Zero while unconnected.
    pub fn max_players(&self) -> usize {
        self.roster.max_players()
    }

    /// The host we are joined to or joining.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().map(|link| link.server)
    }

    /// Address search answers come back to.
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery.local_addr()
    }

    /// Message counters since the client was created.
    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// The validated config in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

/// Checks a `JoinAccepted` for internal consistency and builds the local
/// roster mirror from it.
fn validate_join(accepted: JoinAccepted) -> Result<AcceptedJoin, &'static str> {
    let max_players = usize::try_from(accepted.max_players)
        .ok()
        .filter(|max| (1..=MAX_PLAYERS_LIMIT).contains(max))
        .ok_or("max players out of range")?;
    let local = PlayerNumber::from_wire(accepted.number)
        .filter(|number| number.index() < max_players)
        .ok_or("assigned number out of range")?;
    let num_players = usize::try_from(accepted.num_players)
        .ok()
        .filter(|count| *count <= max_players)
        .ok_or("player count out of range")?;
    if accepted.roster.len() != num_players {
        return Err("roster length does not match player count");
    }

    let mut roster = PlayerRegistry::new(max_players);
    for info in accepted.roster {
        let number = PlayerNumber::from_wire(info.number).ok_or("negative roster slot")?;
        roster
            .insert(Player::new(number, info.name, info.data))
            .map_err(|_| "roster slot out of range or duplicated")?;
    }
    if !roster.contains(local) {
        return Err("roster does not include the local player");
    }

    Ok(AcceptedJoin {
        local,
        roster,
        extra_data: accepted.extra_data,
    })
}
