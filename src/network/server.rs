//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! One shared [`GameSession`] is ticked at a fixed rate; every connection
//! gets its own player, its own diff broadcaster and a filtered view of
//! the session feed.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::diff::DiffBroadcaster;
use crate::game::engine::Engine;
use crate::game::state::{PlayerId, Team};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::session::{GameSession, Outbound};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Tick rate for game simulation (Hz).
    pub tick_rate: u32,
    /// Player diff rate per connection (Hz).
    pub broadcast_rate: u32,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 64,
            tick_rate: 60,
            broadcast_rate: 60,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Player created for this connection.
    player_id: PlayerId,
    /// Connection time.
    connected_at: Instant,
    /// Last message received.
    last_activity: Instant,
}

fn period(rate_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(rate_hz.max(1)))
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The shared world.
    session: Arc<RwLock<GameSession>>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server around an engine.
    pub fn new(config: ServerConfig, engine: Engine) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            session: Arc::new(RwLock::new(GameSession::new(engine))),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Shared session handle.
    pub fn session(&self) -> Arc<RwLock<GameSession>> {
        self.session.clone()
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            addr = %listener.local_addr()?,
            version = %self.config.version,
            tick_rate = self.config.tick_rate,
            "Game server listening"
        );

        let tick_session = self.session.clone();
        let tick_rate = self.config.tick_rate;
        let tick_handle = tokio::spawn(async move {
            Self::run_tick_loop(tick_session, tick_rate).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        tick_handle.abort();
        Ok(())
    }

    /// Advance the world at the tick rate.
    async fn run_tick_loop(session: Arc<RwLock<GameSession>>, tick_rate: u32) {
        let mut tick_interval = interval(period(tick_rate));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            // A failed tick is logged by the session; the next one carries on
            let _ = session.write().await.run_tick();
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let session = self.session.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            // Limit check, join and registration share the clients lock;
            // no event falls between joining and subscribing
            let joined = {
                let mut clients = clients.write().await;
                if clients.len() >= config.max_connections {
                    None
                } else {
                    let mut session = session.write().await;
                    let joined = session.connect().map(|welcome| (welcome, session.subscribe()));
                    if let Ok((welcome, _)) = &joined {
                        clients.insert(addr, ConnectedClient {
                            player_id: welcome.player_id,
                            connected_at: Instant::now(),
                            last_activity: Instant::now(),
                        });
                    }
                    Some(joined)
                }
            };

            let (welcome, feed) = match joined {
                Some(Ok(joined)) => joined,
                Some(Err(e)) => {
                    error!("Could not add player for {}: {}", addr, e);
                    return;
                }
                None => {
                    warn!("Connection limit reached, rejecting {}", addr);
                    let refusal = ServerMessage::Error(ServerError::new(
                        ErrorCode::ServerOverloaded,
                        "Server is full",
                    ));
                    if let Ok(text) = refusal.to_json() {
                        let _ = ws_stream.send(Message::Text(text)).await;
                    }
                    let _ = ws_stream.close(None).await;
                    return;
                }
            };
            let player_id = welcome.player_id;

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            for message in welcome.messages {
                let _ = msg_tx.send(message).await;
            }

            let broadcast_task = tokio::spawn(Self::run_broadcaster(
                session.clone(),
                feed,
                welcome.team,
                msg_tx.clone(),
                config.broadcast_rate,
            ));

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))).await;
                                        continue;
                                    }
                                };

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(player_id, client_msg, &session, &msg_tx).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            broadcast_task.abort();
            sender_task.abort();

            if let Some(client) = clients.write().await.remove(&addr) {
                debug!(
                    "Client {} (player {}) was connected for {:?}, idle for {:?}",
                    addr,
                    client.player_id,
                    client.connected_at.elapsed(),
                    client.last_activity.elapsed()
                );
            }
            session.write().await.disconnect(player_id);

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        player_id: PlayerId,
        msg: ClientMessage,
        session: &Arc<RwLock<GameSession>>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let key_result = match msg {
            ClientMessage::KeyDown(key) => session.write().await.key_press(player_id, &key.k, true),
            ClientMessage::KeyUp(key) => session.write().await.key_press(player_id, &key.k, false),
            ClientMessage::Chat(chat) => {
                session.read().await.chat(player_id, chat);
                Ok(())
            }
            ClientMessage::Ping(heartbeat) => {
                let _ = sender.send(ServerMessage::Pong(heartbeat.id)).await;
                Ok(())
            }
        };

        if let Err(e) = key_result {
            debug!(player = %player_id, error = %e, "Rejected input");
            let _ = sender
                .send(ServerMessage::Error(ServerError::new(ErrorCode::InvalidInput, e.to_string())))
                .await;
        }
    }

    /// Per-connection outflow: player diffs at the broadcast rate, plus
    /// whatever the session publishes for this connection's team.
    async fn run_broadcaster(
        session: Arc<RwLock<GameSession>>,
        mut feed: broadcast::Receiver<Outbound>,
        team: Team,
        sender: mpsc::Sender<ServerMessage>,
        broadcast_rate: u32,
    ) {
        let mut broadcaster = DiffBroadcaster::new();
        let mut diff_interval = interval(period(broadcast_rate));
        diff_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = diff_interval.tick() => {
                    let views = session.read().await.player_views();
                    let diffs = broadcaster.diff(&views);
                    if diffs.is_empty() {
                        continue;
                    }
                    if sender.send(ServerMessage::Players(diffs)).await.is_err() {
                        break;
                    }
                }
                received = feed.recv() => {
                    match received {
                        Ok(outbound) => {
                            if !outbound.audience.includes(Some(team)) {
                                continue;
                            }
                            if sender.send(outbound.message).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Connection fell behind the session feed");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
