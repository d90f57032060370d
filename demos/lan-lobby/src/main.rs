//! A LAN chat lobby built on Orbit.
//!
//! ```text
//! lan-lobby host [lobby-name]     host a lobby on this machine
//! lan-lobby join <player-name>    find a lobby on the LAN and chat in it
//! ```
//!
//! `ORBIT_CONFIG` may point at a JSON session config. Logging follows
//! `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use orbit::prelude::*;
use orbit::transport::{TcpConnector, TcpTransport, UdpEndpoint};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);
const SEARCH_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Chat traffic carried in `Data` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Chat {
    /// Client to host.
    Say { text: String },
    /// Host to everyone.
    Said { from: String, text: String },
}

/// Advertised in discovery answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LobbyInfo {
    name: String,
}

fn encode<T: Serialize>(value: &T) -> Bytes {
    serde_json::to_vec(value).map(Bytes::from).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

struct Lobby {
    info: LobbyInfo,
}

impl ServerHooks for Lobby {
    fn review_join(&mut self, number: PlayerNumber, name: &str, _: &Bytes) -> JoinVerdict {
        tracing::debug!(%number, name, "reviewing join");
        JoinVerdict::allow_with(format!("welcome to {}", self.info.name).into_bytes())
    }

    fn game_info(&mut self) -> Bytes {
        encode(&self.info)
    }
}

fn host(config: SessionConfig, lobby_name: String) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let stop = ctrl_c_flag(&rt);

    let bind: SocketAddr = ([0, 0, 0, 0], config.discovery_port).into();
    let listener = TcpTransport::bind(bind, rt.handle())?;
    let discovery =
        UdpEndpoint::bind_multicast(config.discovery_group, config.discovery_port, rt.handle())?;
    let lobby = Lobby {
        info: LobbyInfo { name: lobby_name },
    };
    let mut server = ServerSession::with_hooks(config, listener, discovery, lobby);
    tracing::info!(addr = %server.local_addr(), "lobby open, ctrl-c to close");

    while !stop.load(Ordering::Relaxed) {
        for event in server.pump() {
            match event {
                ServerEvent::PlayerJoined(player) => {
                    tracing::info!(number = %player.number, name = %player.name, "joined");
                }
                ServerEvent::PlayerLeft { player, reason } => {
                    tracing::info!(number = %player.number, name = %player.name, ?reason, "left");
                }
                ServerEvent::Data { from, payload } => relay(&mut server, from, &payload),
            }
        }
        std::thread::sleep(FRAME);
    }

    for event in server.shutdown() {
        tracing::debug!(?event, "final event");
    }
    Ok(())
}

fn relay<L, D, H>(server: &mut ServerSession<L, D, H>, from: PlayerNumber, payload: &[u8])
where
    L: orbit::transport::Listener,
    D: orbit::transport::DatagramSocket,
    H: ServerHooks,
{
    let Some(name) = server.player(from).map(|p| p.name.clone()) else {
        return;
    };
    match serde_json::from_slice::<Chat>(payload) {
        Ok(Chat::Say { text }) => {
            println!("<{name}> {text}");
            if let Err(e) = server.broadcast(encode(&Chat::Said { from: name, text })) {
                tracing::warn!(%from, error = %e, "chat not relayed");
            }
        }
        Ok(other) => tracing::debug!(?other, "ignoring chat from client"),
        Err(e) => tracing::debug!(%from, error = %e, "unreadable chat payload"),
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

fn join(config: SessionConfig, name: String) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let stop = ctrl_c_flag(&rt);
    let lines = stdin_lines();

    let search_socket = UdpEndpoint::bind(([0, 0, 0, 0], 0).into(), rt.handle())?;
    let mut client = ClientSession::new(config, TcpConnector::new(rt.handle().clone()), search_socket);
    let mut last_search: Option<Instant> = None;

    while !stop.load(Ordering::Relaxed) {
        if client.state() == ConnectionState::Unconnected
            && last_search.is_none_or(|at| at.elapsed() >= SEARCH_INTERVAL)
        {
            client.search();
            last_search = Some(Instant::now());
        }

        for event in client.pump() {
            match event {
                ClientEvent::GameInfoReceived(game) => {
                    let lobby = serde_json::from_slice::<LobbyInfo>(&game.custom_data)
                        .map(|info| info.name)
                        .unwrap_or_else(|_| "unnamed".into());
                    println!(
                        "found lobby {lobby:?} at {} ({}/{})",
                        game.addr, game.num_players, game.max_players
                    );
                    if client.state() == ConnectionState::Unconnected {
                        client.join(game.addr, &name, Bytes::new())?;
                    }
                }
                ClientEvent::Joined { local, extra_data } => {
                    println!("{} (you are {local})", String::from_utf8_lossy(&extra_data));
                }
                ClientEvent::JoinFailed { reason } => println!("could not join: {reason}"),
                ClientEvent::PlayerJoined(player) => println!("* {} joined", player.name),
                ClientEvent::PlayerLeft(player) => println!("* {} left", player.name),
                ClientEvent::Data(payload) => match serde_json::from_slice::<Chat>(&payload) {
                    Ok(Chat::Said { from, text }) => println!("<{from}> {text}"),
                    Ok(other) => tracing::debug!(?other, "ignoring chat from host"),
                    Err(e) => tracing::debug!(error = %e, "unreadable chat payload"),
                },
                ClientEvent::Disconnected { reason } => {
                    println!("disconnected: {reason:?}");
                    last_search = None;
                }
            }
        }

        while let Ok(text) = lines.try_recv() {
            if let Err(e) = client.send(encode(&Chat::Say { text })) {
                println!("not sent: {e}");
            }
        }
        std::thread::sleep(FRAME);
    }

    client.leave();
    client.pump();
    Ok(())
}

fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn ctrl_c_flag(rt: &tokio::runtime::Runtime) -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::Relaxed);
        }
    });
    stop
}

fn load_config() -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match std::env::var("ORBIT_CONFIG") {
        Ok(path) => Ok(SessionConfig::from_json(&std::fs::read_to_string(path)?)?),
        Err(_) => Ok(SessionConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let mut args = std::env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (Some("host"), name) => host(config, name.unwrap_or_else(|| "lan-lobby".into())),
        (Some("join"), Some(name)) => join(config, name),
        _ => {
            eprintln!("usage: lan-lobby host [lobby-name] | lan-lobby join <player-name>");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_json_shape() {
        let said = Chat::Said {
            from: "Nova".into(),
            text: "hi".into(),
        };
        let bytes = encode(&said);
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"Said":{"from":"Nova","text":"hi"}}"#
        );
        assert_eq!(serde_json::from_slice::<Chat>(&bytes).unwrap(), said);
    }

    #[test]
    fn test_lobby_advertises_its_name() {
        let mut lobby = Lobby {
            info: LobbyInfo {
                name: "friday".into(),
            },
        };
        let info: LobbyInfo = serde_json::from_slice(&lobby.game_info()).unwrap();
        assert_eq!(info.name, "friday");
        assert!(matches!(
            lobby.review_join(PlayerNumber(0), "Nova", &Bytes::new()),
            JoinVerdict::Allow { .. }
        ));
    }
}
