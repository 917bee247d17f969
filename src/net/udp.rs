//! UDP transport
//!
//! One socket, one receive loop. Each datagram is decoded at the boundary,
//! applied through the dispatcher, and the resulting reply/broadcast sent
//! after the dispatcher has already released its lock. Send failures are
//! logged and skipped; one unreachable client never stalls the loop or
//! starves the rest of a session.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::net::dispatcher::{Dispatcher, Outcome};
use crate::net::protocol::{decode_request, encode, Broadcast};

/// Largest datagram the server will read. Client commands are tiny; this
/// leaves generous headroom.
const MAX_DATAGRAM_SIZE: usize = 2048;

pub struct UdpServer {
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
}

impl UdpServer {
    pub async fn bind(
        config: &ServerConfig,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(config.bind_address, config.udp_port);
        let socket = UdpSocket::bind(addr).await?;
        info!("UDP game server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            dispatcher,
            metrics,
        })
    }

    /// The bound address, useful when the port was picked by the OS
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle to the socket for other senders (the queue consumer pushes
    /// its broadcasts through the same socket)
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, sender) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if is_transient_recv_error(&e) => {
                    warn!("UDP receive error: {}", e);
                    continue;
                }
                Err(e) => {
                    error!("UDP socket failed: {}", e);
                    return Err(e.into());
                }
            };
            self.metrics
                .datagrams_received
                .fetch_add(1, Ordering::Relaxed);
            self.handle_datagram(&buf[..len], sender).await;
        }
    }

    async fn handle_datagram(&self, payload: &[u8], sender: SocketAddr) {
        let outcome = match decode_request(payload) {
            Ok(request) => {
                debug!("{} -> {:?}", sender, request.command);
                self.dispatcher.apply(&request, sender)
            }
            Err(err) => {
                self.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                match err.response() {
                    Some(response) => {
                        warn!("Bad datagram from {}: {}", sender, err);
                        Outcome::reply(response)
                    }
                    None => {
                        warn!("Dropping datagram from {}: {}", sender, err);
                        return;
                    }
                }
            }
        };
        send_outcome(&self.socket, &self.metrics, sender, outcome).await;
    }
}

/// Receive failures scoped to one datagram, mostly ICMP unreachable
/// reflections, are survivable. Anything else means the socket itself is
/// broken and retrying would spin the loop at full speed.
fn is_transient_recv_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

/// Deliver what a dispatch produced: the unicast reply to the sender, then
/// the session broadcast.
pub async fn send_outcome(
    socket: &UdpSocket,
    metrics: &Metrics,
    sender: SocketAddr,
    outcome: Outcome,
) {
    if let Some(response) = outcome.reply {
        match encode(&response) {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, sender).await {
                    warn!("Failed to reply to {}: {}", sender, e);
                }
            }
            Err(e) => warn!("Failed to encode reply for {}: {}", sender, e),
        }
    }
    if let Some((addresses, broadcast)) = outcome.broadcast {
        send_broadcast(socket, metrics, &addresses, &broadcast).await;
    }
}

/// Fan a broadcast out to every recipient, encoding once. Per-recipient
/// failures are logged and the rest still get their copy.
pub async fn send_broadcast(
    socket: &UdpSocket,
    metrics: &Metrics,
    addresses: &[SocketAddr],
    broadcast: &Broadcast,
) {
    let bytes = match encode(broadcast) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to encode broadcast: {}", e);
            return;
        }
    };
    for addr in addresses {
        match socket.send_to(&bytes, addr).await {
            Ok(_) => {
                metrics.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!("Broadcast to {} failed: {}", addr, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSink, TracingSink};
    use crate::game::{TankPool, TankState};
    use crate::session::SessionRegistry;
    use crate::util::Position;
    use std::net::IpAddr;
    use std::time::Duration;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            udp_port: 0,
            ..ServerConfig::default()
        }
    }

    fn make_dispatcher() -> Arc<Dispatcher> {
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);
        Arc::new(Dispatcher::new(
            TankPool::new(4),
            SessionRegistry::new(2, events.clone()),
            events,
            Arc::new(Metrics::new()),
        ))
    }

    #[test]
    fn test_recv_error_classification() {
        use std::io::{Error, ErrorKind};

        // ICMP reflections and interrupts keep the loop alive
        assert!(is_transient_recv_error(&Error::from(
            ErrorKind::ConnectionReset
        )));
        assert!(is_transient_recv_error(&Error::from(
            ErrorKind::ConnectionRefused
        )));
        assert!(is_transient_recv_error(&Error::from(ErrorKind::Interrupted)));

        // A dead socket is not retried; EBADF for one
        assert!(!is_transient_recv_error(&Error::from_raw_os_error(9)));
        assert!(!is_transient_recv_error(&Error::from(
            ErrorKind::PermissionDenied
        )));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = UdpServer::bind(&test_config(), make_dispatcher(), Arc::new(Metrics::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_send_broadcast_reaches_every_recipient() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let metrics = Metrics::new();

        let broadcast = Broadcast::GameUpdate {
            tanks: vec![TankState {
                id: "tank_0".to_string(),
                position: Position::new(5, 7),
                health: 100,
            }],
        };
        let addresses = vec![
            first.local_addr().unwrap(),
            second.local_addr().unwrap(),
        ];
        send_broadcast(&socket, &metrics, &addresses, &broadcast).await;

        let mut buf = [0u8; 1024];
        for receiver in [&first, &second] {
            let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            let wire: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
            assert_eq!(wire["action"], "game_update");
            assert_eq!(wire["tanks"][0]["id"], "tank_0");
        }
        assert_eq!(metrics.broadcasts_sent.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_unreachable_recipient_does_not_stop_fanout() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reachable = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let metrics = Metrics::new();

        // An address nobody listens on; UDP send itself still succeeds,
        // so this mainly pins that fan-out visits every entry
        let dead: SocketAddr = ([127, 0, 0, 1], 1).into();
        let addresses = vec![dead, reachable.local_addr().unwrap()];

        let broadcast = Broadcast::PlayerShot {
            player_id: "p1".to_string(),
            tank_id: "tank_0".to_string(),
        };
        send_broadcast(&socket, &metrics, &addresses, &broadcast).await;

        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), reachable.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let wire: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(wire["action"], "player_shot");
    }
}
