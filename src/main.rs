//! Tileball Game Server
//!
//! Authoritative server for Tileball.
//! Usage: `tileball-server [settings.json]`

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tileball::{
    TICK_RATE, VERSION,
    config::Settings,
    game::Engine,
    network::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("Failed to load settings from {path}"))?,
        None => Settings::default(),
    };

    info!("Tileball Server v{}", VERSION);
    info!("Tick Rate: {} Hz (default {})", settings.engine.tick_rate, TICK_RATE);

    let mut server_config = ServerConfig {
        tick_rate: settings.engine.tick_rate,
        broadcast_rate: settings.engine.tick_rate,
        ..ServerConfig::default()
    };
    if let Some(addr) = &settings.bind_addr {
        server_config.bind_addr = addr
            .parse()
            .with_context(|| format!("Invalid bind address {addr}"))?;
    }

    let map = settings.map_or_default();
    info!("Map: {}x{} tiles", map.width(), map.height());
    let engine = Engine::new(settings.engine.clone(), Some(map))?;
    let server = GameServer::new(server_config, engine);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
