//! Game event stream
//!
//! Every meaningful state change (session lifecycle, joins, movement, combat)
//! is published as a `GameEvent` through an injected `EventSink`. Emission is
//! fire-and-forget: a slow or absent collector never stalls the dispatch
//! path, and undeliverable events are dropped.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::Position;

/// Seconds since the Unix epoch, the timestamp carried by every event
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    SessionCreated {
        session_id: Uuid,
        timestamp: u64,
    },
    SessionRemoved {
        session_id: Uuid,
        reason: String,
        timestamp: u64,
    },
    PlayerJoinedSession {
        session_id: Uuid,
        player_id: String,
        tank_id: String,
        timestamp: u64,
    },
    PlayerLeftSession {
        session_id: Uuid,
        player_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tank_id: Option<String>,
        timestamp: u64,
    },
    TankMoved {
        tank_id: String,
        position: Position,
        timestamp: u64,
    },
    TankShot {
        tank_id: String,
        position_at_shot: Position,
        timestamp: u64,
    },
    TankTookDamage {
        tank_id: String,
        damage_amount: i32,
        current_health: i32,
        is_destroyed: bool,
        timestamp: u64,
    },
    TankDestroyed {
        tank_id: String,
        last_position: Position,
        timestamp: u64,
    },
}

/// Destination for game events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GameEvent);
}

/// Default sink: events go to the log and nowhere else
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: GameEvent) {
        debug!("Game event: {:?}", event);
    }
}

/// Sink backed by an unbounded channel, for forwarding to a collector
/// (and for asserting on emissions in tests)
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: GameEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event channel closed, dropping event");
        }
    }
}

/// Drain a `ChannelSink` receiver into a line-oriented TCP collector.
///
/// One JSON object per line. Connection failures drop the event in hand and
/// the next event retries the connect; the game never waits on this path.
pub async fn forward_events(mut rx: mpsc::UnboundedReceiver<GameEvent>, collector_addr: String) {
    let mut stream: Option<TcpStream> = None;

    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode event: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if stream.is_none() {
            match TcpStream::connect(&collector_addr).await {
                Ok(connected) => {
                    info!("Connected to event collector at {}", collector_addr);
                    stream = Some(connected);
                }
                Err(e) => {
                    debug!(
                        "Event collector {} unreachable ({}), dropping event",
                        collector_addr, e
                    );
                    continue;
                }
            }
        }

        if let Some(connected) = stream.as_mut() {
            if let Err(e) = connected.write_all(&line).await {
                warn!("Event collector write failed: {}", e);
                stream = None;
            }
        }
    }
}
