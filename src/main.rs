use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rt5_sync_server::config::ServerConfig;
use rt5_sync_server::game::region_keys::RegionKeys;
use rt5_sync_server::game::world::{World, WorldSettings};
use rt5_sync_server::metrics::{self, Metrics};
use rt5_sync_server::net::game_session::{start_game_loop, GameSession};
use rt5_sync_server::net::transport::GameServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("RT5 Sync Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}:{}, tick={}ms, base_area={}",
        config.bind_address, config.port, config.tick_ms, config.base_area_size
    );

    let keys = match &config.region_keys_path {
        Some(path) => RegionKeys::load(path)?,
        None => {
            info!("No region key file configured, all map keys are zero");
            RegionKeys::empty()
        }
    };

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());
    let metrics_addr = SocketAddr::new(config.bind_address, config.metrics_port);
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Game loop owns the world; the transport feeds it admissions
    let (admissions_tx, admissions_rx) = crossbeam_channel::unbounded();
    let world = World::new(WorldSettings {
        base_area_size: config.base_area_size,
        welcome_message: config.welcome_message.clone(),
    });
    let session = GameSession::new(
        world,
        Arc::new(keys),
        admissions_rx,
        metrics.clone(),
        Duration::from_millis(config.tick_ms),
    );
    let game_loop = start_game_loop(session);

    let server = GameServer::new(config, admissions_tx, metrics);

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    game_loop.abort();
    info!("Server stopped");

    Ok(())
}
