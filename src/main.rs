//! gridtown - multiplayer grid city-building core
//!
//! Hosts a room relay, joins a room as an interactive client, or runs the
//! offline loopback demo.

mod config;
mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::GameConfig;
use gridtown_client::Session;
use gridtown_core::{
    BuildingKind, GameState, GameStatus, GameEvent, Grid, Millis, PlayerId,
};
use gridtown_net::{
    catalog_hash, connect_with_retry, ClientEndpoint, QuicWire, ReconnectPolicy, RelayEndpoint,
    TlsMode, MAX_FRAME_LEN,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gridtown", version, about = "Multiplayer grid city-building core")]
struct Cli {
    /// Path to a config file (defaults to config/gridtown.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host a room relay
    Host {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:4433")]
        bind: SocketAddr,
    },
    /// Join a room as an interactive client
    Join {
        /// Relay address to dial (defaults to the configured relay)
        #[arg(long)]
        relay: Option<SocketAddr>,
    },
    /// Run the offline two-player demo
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with WARN level by default (can be overridden via RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    info!("Starting gridtown v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => GameConfig::load_from_path(path),
        None => GameConfig::load(),
    };

    match cli.command {
        Command::Host { bind } => run_relay(bind).await,
        Command::Join { relay } => {
            let addr = match relay {
                Some(addr) => addr,
                None => cfg.relay.parse()?,
            };
            run_client(cfg, addr).await
        }
        Command::Demo => demo::run("DEMO").await,
    }
}

/// Accept connections and forward every frame to every other connection.
/// The relay never decodes game traffic; it moves opaque frames.
async fn run_relay(bind: SocketAddr) -> Result<()> {
    let relay = RelayEndpoint::bind(bind)?;
    println!(
        "relay listening on {} (catalog {:016x})",
        relay.local_addr(),
        catalog_hash()
    );

    let (tx, _) = broadcast::channel::<(usize, Vec<u8>)>(256);
    let mut next_id = 0usize;

    while let Some(incoming) = relay.accept().await {
        let conn = match incoming.await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "incoming connection failed");
                continue;
            }
        };
        next_id += 1;
        let id = next_id;
        info!(id, peer = %conn.remote_address(), "client connected");
        tokio::spawn(relay_connection(id, conn, tx.clone(), tx.subscribe()));
    }
    Ok(())
}

async fn relay_connection(
    id: usize,
    conn: quinn::Connection,
    tx: broadcast::Sender<(usize, Vec<u8>)>,
    mut rx: broadcast::Receiver<(usize, Vec<u8>)>,
) {
    loop {
        tokio::select! {
            stream = conn.accept_uni() => {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                match stream.read_to_end(MAX_FRAME_LEN + 8).await {
                    Ok(frame) => {
                        let _ = tx.send((id, frame));
                    }
                    Err(err) => warn!(id, %err, "dropping unreadable frame"),
                }
            }
            msg = rx.recv() => match msg {
                Ok((from, frame)) if from != id => {
                    match conn.open_uni().await {
                        Ok(mut stream) => {
                            if stream.write_all(&frame).await.is_ok() {
                                let _ = stream.finish();
                            }
                        }
                        Err(_) => break,
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(id, skipped = n, "relay subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    info!(id, "client disconnected");
}

const PUMP_BUDGET: Duration = Duration::from_millis(100);
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Join a room and drive it from stdin commands.
async fn run_client(cfg: GameConfig, addr: SocketAddr) -> Result<()> {
    let tls = if cfg.insecure {
        TlsMode::Insecure
    } else {
        TlsMode::Native
    };
    let endpoint = ClientEndpoint::new(tls)?;
    let conn = connect_with_retry(&endpoint, addr, "localhost", ReconnectPolicy::default()).await?;

    let mut game = GameState::new(cfg.room_code.clone(), cfg.room_code.clone());
    game.status = GameStatus::Active;
    game.conflict.mode = cfg.mode;

    let mut session = Session::new(
        QuicWire::new(conn),
        game,
        Grid::new(),
        PlayerId::new(cfg.username.clone()),
    );
    let events = session.subscribe();
    session.announce_join(cfg.username.clone()).await?;
    session.request_map_sync().await?;

    println!(
        "joined {} as {} (catalog {:016x})",
        addr,
        cfg.username,
        catalog_hash()
    );
    println!("commands: place <row> <col> <building> | remove <row> <col> | end | say <text> | quit");

    let mut lines = spawn_stdin_reader();
    let mut last_tick = Instant::now();

    loop {
        // bounded inbound pump so stdin stays responsive
        match tokio::time::timeout(PUMP_BUDGET, session.pump()).await {
            Ok(Ok(true)) => {}
            Ok(result) => {
                // dropped mid-session; re-dial under the backoff policy and
                // surface a fatal error only once the attempts are spent
                if let Err(err) = result {
                    warn!(%err, "session transport error");
                }
                println!("connection lost, redialing {addr}");
                let conn =
                    connect_with_retry(&endpoint, addr, "localhost", ReconnectPolicy::default())
                        .await?;
                session.set_wire(QuicWire::new(conn));
                session.request_map_sync().await?;
                println!("reconnected to {addr}");
            }
            Err(_) => {}
        }

        while let Ok(line) = lines.try_recv() {
            if !handle_command(&mut session, line.trim()).await? {
                return Ok(());
            }
        }

        if last_tick.elapsed() >= TICK_INTERVAL {
            session.tick(Millis::now()).await?;
            last_tick = Instant::now();
        }

        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }
    }
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    use tokio::io::AsyncBufReadExt;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Execute one stdin command. Returns `false` on quit.
async fn handle_command<W: gridtown_net::Wire>(
    session: &mut Session<W>,
    line: &str,
) -> Result<bool> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("place") => {
            let (row, col) = match (parts.next(), parts.next()) {
                (Some(r), Some(c)) => (r.parse()?, c.parse()?),
                _ => {
                    println!("usage: place <row> <col> <building>");
                    return Ok(true);
                }
            };
            let Some(building) = parts.next().and_then(parse_building) else {
                println!("unknown building; one of: road bridge residential commercial industrial mixed power-plant power-lines lumber-yard mining-outpost");
                return Ok(true);
            };
            match session.place_building(row, col, building).await {
                Ok(id) => println!("placed action {id}"),
                Err(err) => println!("refused: {err}"),
            }
        }
        Some("remove") => {
            let (row, col) = match (parts.next(), parts.next()) {
                (Some(r), Some(c)) => (r.parse()?, c.parse()?),
                _ => {
                    println!("usage: remove <row> <col>");
                    return Ok(true);
                }
            };
            match session.remove_building(row, col).await {
                Ok(id) => println!("removed action {id}"),
                Err(err) => println!("refused: {err}"),
            }
        }
        Some("end") => {
            session.end_turn().await?;
            println!("turn ended");
        }
        Some("say") => {
            let text = line.trim_start_matches("say").trim();
            session.send_chat(text).await?;
        }
        Some("quit") => return Ok(false),
        Some(other) => println!("unknown command: {other}"),
        None => {}
    }
    Ok(true)
}

fn parse_building(name: &str) -> Option<BuildingKind> {
    Some(match name {
        "road" => BuildingKind::Road,
        "bridge" => BuildingKind::Bridge,
        "residential" => BuildingKind::Residential,
        "commercial" => BuildingKind::Commercial,
        "industrial" => BuildingKind::Industrial,
        "mixed" => BuildingKind::Mixed,
        "power-plant" => BuildingKind::PowerPlant,
        "power-lines" => BuildingKind::PowerLines,
        "lumber-yard" => BuildingKind::LumberYard,
        "mining-outpost" => BuildingKind::MiningOutpost,
        _ => return None,
    })
}

fn print_event(event: &GameEvent) {
    match event {
        GameEvent::Chat { from, text } => println!("[{from}] {text}"),
        GameEvent::StateChanged { status, previous } => {
            println!("game status: {previous:?} -> {status:?}")
        }
        GameEvent::ActionRejected { action, reason } => {
            println!("action {} rejected: {reason}", action.id)
        }
        GameEvent::ActionQueued(action) => println!("action {} queued for your turn", action.id),
        GameEvent::ConflictDetected { action_id, conflicts } => {
            for conflict in conflicts {
                println!("conflict on action {action_id}: {}", conflict.reason());
            }
        }
        GameEvent::ConnectionChanged { connected } => {
            println!("connection {}", if *connected { "up" } else { "down" })
        }
        GameEvent::PlayerAction(action) => {
            println!("{} -> {:?} ({:?})", action.player, action.kind, action.status)
        }
    }
}
