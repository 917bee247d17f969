//! Prometheus-compatible metrics endpoint
//!
//! Exposes game server metrics in Prometheus format for Grafana dashboards.
//! Default endpoint: http://localhost:8001/metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the game server
#[derive(Debug)]
pub struct Metrics {
    // Gauges
    pub active_sessions: AtomicU64,
    pub tanks_in_use: AtomicU64,

    // Counters
    pub datagrams_received: AtomicU64,
    pub players_joined: AtomicU64,
    pub broadcasts_sent: AtomicU64,
    pub commands_consumed: AtomicU64,
    pub matchmaking_events: AtomicU64,
    pub protocol_errors: AtomicU64,

    // Server uptime
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            active_sessions: AtomicU64::new(0),
            tanks_in_use: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            players_joined: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            commands_consumed: AtomicU64::new(0),
            matchmaking_events: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        // Helper macro for metrics
        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!(
            "game_server_active_sessions",
            "Number of live game sessions",
            "gauge",
            self.active_sessions.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_tanks_in_use",
            "Number of tanks currently leased to players",
            "gauge",
            self.tanks_in_use.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_datagrams_received_total",
            "Total UDP datagrams received",
            "counter",
            self.datagrams_received.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_players_joined_total",
            "Total successful joins",
            "counter",
            self.players_joined.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_broadcasts_sent_total",
            "Total broadcast datagrams sent",
            "counter",
            self.broadcasts_sent.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_commands_consumed_total",
            "Total commands read from the queue feed",
            "counter",
            self.commands_consumed.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_matchmaking_events_total",
            "Total events read from the matchmaking feed",
            "counter",
            self.matchmaking_events.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_protocol_errors_total",
            "Total datagrams rejected at the protocol boundary",
            "counter",
            self.protocol_errors.load(Ordering::Relaxed)
        );
        metric!(
            "game_server_uptime_seconds",
            "Server uptime in seconds",
            "counter",
            self.uptime_seconds()
        );

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        format!(
            r#"{{
  "sessions": {{
    "active": {},
    "tanks_in_use": {}
  }},
  "traffic": {{
    "datagrams_received": {},
    "players_joined": {},
    "broadcasts_sent": {},
    "commands_consumed": {},
    "matchmaking_events": {},
    "protocol_errors": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.active_sessions.load(Ordering::Relaxed),
            self.tanks_in_use.load(Ordering::Relaxed),
            self.datagrams_received.load(Ordering::Relaxed),
            self.players_joined.load(Ordering::Relaxed),
            self.broadcasts_sent.load(Ordering::Relaxed),
            self.commands_consumed.load(Ordering::Relaxed),
            self.matchmaking_events.load(Ordering::Relaxed),
            self.protocol_errors.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // Parse the request line
                    let response = if request.starts_with("GET /metrics/json")
                        || request.starts_with("GET /json")
                    {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") || request.starts_with("GET /") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
