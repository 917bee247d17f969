//! Queue bridge consumers
//!
//! Optional line-oriented TCP feeds of JSON messages (one object per line)
//! from the queue bridge. The command feed routes player moves and shots
//! through the same dispatcher as datagrams, so they produce the same
//! broadcasts; the matchmaking feed pre-creates a session whenever a match
//! forms. Malformed or unroutable lines are discarded, never retried; each
//! feed reconnects with bounded backoff when the bridge drops.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::net::dispatcher::Dispatcher;
use crate::net::protocol::{MatchmakingEvent, QueuedCommand, NEW_MATCH_CREATED};
use crate::net::udp::send_broadcast;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct CommandConsumer {
    queue_addr: String,
    dispatcher: Arc<Dispatcher>,
    socket: Arc<UdpSocket>,
    metrics: Arc<Metrics>,
}

impl CommandConsumer {
    pub fn new(
        queue_addr: String,
        dispatcher: Arc<Dispatcher>,
        socket: Arc<UdpSocket>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue_addr,
            dispatcher,
            socket,
            metrics,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match TcpStream::connect(&self.queue_addr).await {
                Ok(stream) => {
                    info!("Connected to command queue at {}", self.queue_addr);
                    backoff = INITIAL_BACKOFF;
                    if let Err(e) = self.consume(stream).await {
                        warn!("Command queue connection lost: {}", e);
                    } else {
                        warn!("Command queue closed the connection");
                    }
                }
                Err(e) => {
                    warn!(
                        "Cannot reach command queue at {}: {}",
                        self.queue_addr, e
                    );
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn consume(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            self.metrics
                .commands_consumed
                .fetch_add(1, Ordering::Relaxed);
            match serde_json::from_str::<QueuedCommand>(&line) {
                Ok(command) => {
                    debug!(
                        "Queue -> {} for player {}",
                        command.command, command.player_id
                    );
                    let outcome = self.dispatcher.apply_queued(&command);
                    // Queued commands have no reply channel; only the
                    // broadcast half of the outcome goes anywhere
                    if let Some((addresses, broadcast)) = outcome.broadcast {
                        send_broadcast(&self.socket, &self.metrics, &addresses, &broadcast).await;
                    }
                }
                Err(e) => warn!("Discarding malformed queue message: {}", e),
            }
        }
        Ok(())
    }
}

/// Matchmaking event feed. A `new_match_created` line makes the server
/// pre-create an empty session; joins then fill it first, oldest-session
/// rules unchanged.
pub struct MatchmakingConsumer {
    bridge_addr: String,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
}

impl MatchmakingConsumer {
    pub fn new(bridge_addr: String, dispatcher: Arc<Dispatcher>, metrics: Arc<Metrics>) -> Self {
        Self {
            bridge_addr,
            dispatcher,
            metrics,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match TcpStream::connect(&self.bridge_addr).await {
                Ok(stream) => {
                    info!("Connected to matchmaking feed at {}", self.bridge_addr);
                    backoff = INITIAL_BACKOFF;
                    if let Err(e) = self.consume(stream).await {
                        warn!("Matchmaking feed connection lost: {}", e);
                    } else {
                        warn!("Matchmaking feed closed the connection");
                    }
                }
                Err(e) => {
                    warn!(
                        "Cannot reach matchmaking feed at {}: {}",
                        self.bridge_addr, e
                    );
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn consume(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            self.metrics
                .matchmaking_events
                .fetch_add(1, Ordering::Relaxed);
            match serde_json::from_str::<MatchmakingEvent>(&line) {
                Ok(event) if event.event_type == NEW_MATCH_CREATED => {
                    let session_id = self.dispatcher.create_session();
                    info!(
                        "Session {} prepared for new match, details: {}",
                        session_id, event.match_details
                    );
                }
                Ok(event) => {
                    warn!(
                        "Ignoring matchmaking event with unknown type '{}'",
                        event.event_type
                    );
                }
                Err(e) => warn!("Discarding malformed matchmaking message: {}", e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, EventSink, GameEvent, TracingSink};
    use crate::game::TankPool;
    use crate::net::protocol::{Command, Request, Response};
    use crate::session::SessionRegistry;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn make_dispatcher() -> Arc<Dispatcher> {
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);
        Arc::new(Dispatcher::new(
            TankPool::new(4),
            SessionRegistry::new(2, events.clone()),
            events,
            Arc::new(Metrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_queued_commands_broadcast_over_udp() {
        let dispatcher = make_dispatcher();
        let metrics = Arc::new(Metrics::new());

        // A live player with a real UDP address to receive broadcasts
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let request = Request {
            player_id: "p1".to_string(),
            command: Command::JoinGame,
        };
        dispatcher.apply(&request, client.local_addr().unwrap());

        let queue = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let queue_addr = queue.local_addr().unwrap().to_string();

        let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let consumer = CommandConsumer::new(
            queue_addr,
            dispatcher,
            server_socket,
            metrics.clone(),
        );
        tokio::spawn(consumer.run());

        let (mut bridge, _) = queue.accept().await.unwrap();
        // A garbage line first: it must be discarded without killing the feed
        bridge.write_all(b"not json at all\n").await.unwrap();
        bridge
            .write_all(
                b"{\"player_id\": \"p1\", \"command\": \"move\", \"details\": {\"new_position\": [4, 6]}}\n",
            )
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let wire: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(wire["action"], "game_update");
        assert_eq!(wire["tanks"][0]["position"], serde_json::json!([4, 6]));

        assert_eq!(metrics.commands_consumed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_matchmaking_feed_prepares_sessions() {
        let (sink, mut rx) = ChannelSink::new();
        let events: Arc<dyn EventSink> = Arc::new(sink);
        let dispatcher = Arc::new(Dispatcher::new(
            TankPool::new(4),
            SessionRegistry::new(2, events.clone()),
            events,
            Arc::new(Metrics::new()),
        ));
        let metrics = Arc::new(Metrics::new());

        let bridge = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bridge_addr = bridge.local_addr().unwrap().to_string();

        let consumer = MatchmakingConsumer::new(bridge_addr, dispatcher.clone(), metrics.clone());
        tokio::spawn(consumer.run());

        let (mut feed, _) = bridge.accept().await.unwrap();
        // Unknown event types and garbage are skipped without killing the feed
        feed.write_all(b"{\"event_type\": \"match_update\", \"match_details\": {}}\n")
            .await
            .unwrap();
        feed.write_all(b"not json at all\n").await.unwrap();
        feed.write_all(
            b"{\"event_type\": \"new_match_created\", \"match_details\": {\"map_id\": \"map_desert\"}}\n",
        )
        .await
        .unwrap();

        let prepared = loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let GameEvent::SessionCreated { session_id, .. } = event {
                break session_id;
            }
        };

        // The next join seats into the prepared session instead of a new one
        let request = Request {
            player_id: "p1".to_string(),
            command: Command::JoinGame,
        };
        let outcome = dispatcher.apply(&request, ([127, 0, 0, 1], 5000).into());
        match outcome.reply.unwrap() {
            Response::Joined { session_id, .. } => assert_eq!(session_id, prepared),
            other => panic!("unexpected response {:?}", other),
        }

        assert_eq!(metrics.matchmaking_events.load(Ordering::Relaxed), 3);
    }
}
