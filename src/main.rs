mod config;
mod events;
mod game;
mod metrics;
mod net;
mod session;
mod util;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::events::{ChannelSink, EventSink, TracingSink};
use crate::game::TankPool;
use crate::metrics::Metrics;
use crate::net::consumer::{CommandConsumer, MatchmakingConsumer};
use crate::net::{Dispatcher, UdpServer};
use crate::session::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Tank Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    info!(
        "Configuration loaded: {}:{}, pool_size={}, session_capacity={}",
        config.bind_address, config.udp_port, config.pool_size, config.session_capacity
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    // Start metrics server on port 8001 (configurable via METRICS_PORT)
    let metrics_port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8001);

    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Event sink: forward to a collector when configured, else log only
    let events: Arc<dyn EventSink> = match config.event_sink_addr.clone() {
        Some(collector_addr) => {
            info!("Forwarding game events to {}", collector_addr);
            let (sink, rx) = ChannelSink::new();
            tokio::spawn(events::forward_events(rx, collector_addr));
            Arc::new(sink)
        }
        None => Arc::new(TracingSink),
    };

    // Initialize shared state
    let pool = TankPool::new(config.pool_size);
    let registry = SessionRegistry::new(config.session_capacity, events.clone());
    let dispatcher = Arc::new(Dispatcher::new(pool, registry, events, metrics.clone()));

    // Create UDP server
    let server = UdpServer::bind(&config, dispatcher.clone(), metrics.clone()).await?;

    info!(
        "Server ready on udp://{}:{}",
        config.bind_address, config.udp_port
    );

    // Optional command queue feed
    if let Some(queue_addr) = config.command_queue_addr.clone() {
        let consumer = CommandConsumer::new(
            queue_addr,
            dispatcher.clone(),
            server.socket(),
            metrics.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = consumer.run().await {
                error!("Command consumer error: {}", e);
            }
        });
    }

    // Optional matchmaking event feed
    if let Some(bridge_addr) = config.matchmaking_queue_addr.clone() {
        let consumer = MatchmakingConsumer::new(bridge_addr, dispatcher.clone(), metrics.clone());
        tokio::spawn(async move {
            if let Err(e) = consumer.run().await {
                error!("Matchmaking consumer error: {}", e);
            }
        });
    }

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
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

    info!("Server stopped");

    Ok(())
}
