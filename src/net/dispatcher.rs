//! Command dispatcher
//!
//! Applies typed player commands to the pool and registry and reports what
//! the transport owes the network: at most one unicast reply plus at most
//! one session-wide broadcast. The dispatcher itself never touches a
//! socket, which keeps the whole state machine testable without I/O and
//! keeps socket waits out of the critical section.
//!
//! Pool and registry are guarded by a single mutex because joins and
//! leaves mutate both; callers on any worker thread share one `Dispatcher`
//! behind an `Arc`.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{unix_timestamp, EventSink, GameEvent};
use crate::game::{TankPool, TankState};
use crate::metrics::Metrics;
use crate::net::protocol::{Broadcast, Command, QueuedCommand, Request, Response};
use crate::session::SessionRegistry;
use crate::util::Position;

const JOIN_FAILED_REASON: &str = "No free tanks available";
const LEFT_GAME_MESSAGE: &str = "You have left the game.";
const NOT_IN_GAME_MESSAGE: &str = "You are not currently in a game.";

/// Pool and registry change together; one lock covers both.
struct CoreState {
    pool: TankPool,
    registry: SessionRegistry,
}

/// What a handled command owes the transport
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub reply: Option<Response>,
    pub broadcast: Option<(Vec<SocketAddr>, Broadcast)>,
}

impl Outcome {
    pub fn reply(response: Response) -> Self {
        Self {
            reply: Some(response),
            broadcast: None,
        }
    }

    pub fn broadcast(addresses: Vec<SocketAddr>, broadcast: Broadcast) -> Self {
        Self {
            reply: None,
            broadcast: Some((addresses, broadcast)),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }
}

pub struct Dispatcher {
    state: Mutex<CoreState>,
    events: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        pool: TankPool,
        registry: SessionRegistry,
        events: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state: Mutex::new(CoreState { pool, registry }),
            events,
            metrics,
        }
    }

    /// Apply one datagram command. `sender` is remembered as the player's
    /// reply address when the command seats them in a session.
    pub fn apply(&self, request: &Request, sender: SocketAddr) -> Outcome {
        match &request.command {
            Command::JoinGame => self.handle_join(&request.player_id, sender),
            Command::Move { position } => self.handle_move(&request.player_id, *position),
            Command::Shoot => self.handle_shoot(&request.player_id),
            Command::LeaveGame => self.handle_leave(&request.player_id),
            Command::Unknown(action) => {
                warn!(
                    "Unknown action '{}' from player {}",
                    action, request.player_id
                );
                self.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                Outcome::reply(Response::error("Unknown action"))
            }
        }
    }

    /// Apply a command that arrived over the queue instead of a datagram.
    /// Same lookups and broadcasts as `apply`; queued commands have no
    /// reply channel, so unroutable ones are discarded.
    pub fn apply_queued(&self, command: &QueuedCommand) -> Outcome {
        match command.command.as_str() {
            "move" => match command.details.new_position {
                Some(position) => self.handle_move(&command.player_id, position),
                None => {
                    warn!(
                        "Queued move for {} carries no new_position, discarding",
                        command.player_id
                    );
                    Outcome::silent()
                }
            },
            "shoot" => self.handle_shoot(&command.player_id),
            other => {
                warn!(
                    "Unknown queued command '{}' for {}, discarding",
                    other, command.player_id
                );
                Outcome::silent()
            }
        }
    }

    /// Pre-create an empty session, as the matchmaking feed requests when a
    /// match forms. It enters the normal fill rotation, so upcoming joins
    /// seat into it before any newer session.
    pub fn create_session(&self) -> Uuid {
        let mut state = self.state.lock();
        let session_id = state.registry.create_session();
        self.update_gauges(&state);
        session_id
    }

    fn handle_join(&self, player_id: &str, address: SocketAddr) -> Outcome {
        let mut state = self.state.lock();

        if let Some(session) = state.registry.find_session_for_player(player_id) {
            debug!("Player {} is already in session {}", player_id, session.id());
            return Outcome::reply(Response::AlreadyInSession {
                session_id: session.id(),
            });
        }

        let (tank_id, initial_state) = match state.pool.acquire() {
            Some(tank) => (tank.id.clone(), tank.state()),
            None => {
                info!("Join rejected for {}: tank pool exhausted", player_id);
                return Outcome::reply(Response::JoinFailed {
                    reason: JOIN_FAILED_REASON.to_string(),
                });
            }
        };

        let session_id = state.registry.find_or_create_session();
        match state
            .registry
            .add_player(session_id, player_id, address, &tank_id)
        {
            Ok(()) => {
                self.metrics.players_joined.fetch_add(1, Ordering::Relaxed);
                self.update_gauges(&state);
                info!(
                    "Player {} joined session {} with {}",
                    player_id, session_id, tank_id
                );
                Outcome::reply(Response::Joined {
                    session_id,
                    tank_id,
                    initial_state,
                })
            }
            Err(e) => {
                // The lease must not outlive a failed seating
                state.pool.release(&tank_id);
                warn!(
                    "Could not seat player {} in session {}: {}",
                    player_id, session_id, e
                );
                Outcome::reply(Response::JoinFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn handle_move(&self, player_id: &str, position: Position) -> Outcome {
        let mut state = self.state.lock();

        let Some((session_id, tank_id, addresses)) = Self::locate(&state, player_id) else {
            debug!("Move from {} ignored: not in any session", player_id);
            return Outcome::silent();
        };

        let Some(tank) = state.pool.lookup_mut(&tank_id) else {
            warn!("Move from {}: tank {} is not leased", player_id, tank_id);
            return Outcome::silent();
        };
        tank.move_to(position);

        self.events.emit(GameEvent::TankMoved {
            tank_id,
            position,
            timestamp: unix_timestamp(),
        });

        let tanks = Self::session_tanks(&state, session_id);
        Outcome::broadcast(addresses, Broadcast::GameUpdate { tanks })
    }

    fn handle_shoot(&self, player_id: &str) -> Outcome {
        let state = self.state.lock();

        let Some((_, tank_id, addresses)) = Self::locate(&state, player_id) else {
            debug!("Shot from {} ignored: not in any session", player_id);
            return Outcome::silent();
        };

        let Some(tank) = state.pool.lookup(&tank_id) else {
            warn!("Shot from {}: tank {} is not leased", player_id, tank_id);
            return Outcome::silent();
        };
        if !tank.shoot() {
            return Outcome::silent();
        }

        self.events.emit(GameEvent::TankShot {
            tank_id: tank_id.clone(),
            position_at_shot: tank.position,
            timestamp: unix_timestamp(),
        });

        Outcome::broadcast(
            addresses,
            Broadcast::PlayerShot {
                player_id: player_id.to_string(),
                tank_id,
            },
        )
    }

    fn handle_leave(&self, player_id: &str) -> Outcome {
        let mut state = self.state.lock();

        let tank_id = state
            .registry
            .find_session_for_player(player_id)
            .and_then(|session| session.get_player(player_id))
            .map(|entry| entry.tank_id.clone());

        match tank_id {
            Some(tank_id) => {
                state.pool.release(&tank_id);
                state.registry.remove_player(player_id);
                self.update_gauges(&state);
                info!("Player {} left the game, {} returned", player_id, tank_id);
                Outcome::reply(Response::LeftGame {
                    message: LEFT_GAME_MESSAGE.to_string(),
                })
            }
            None => Outcome::reply(Response::NotInGame {
                message: NOT_IN_GAME_MESSAGE.to_string(),
            }),
        }
    }

    /// Session id, tank id and broadcast targets for a seated player
    fn locate(
        state: &CoreState,
        player_id: &str,
    ) -> Option<(Uuid, String, Vec<SocketAddr>)> {
        let session = state.registry.find_session_for_player(player_id)?;
        let entry = session.get_player(player_id)?;
        Some((session.id(), entry.tank_id.clone(), session.addresses()))
    }

    /// Snapshot every tank seated in a session
    fn session_tanks(state: &CoreState, session_id: Uuid) -> Vec<TankState> {
        let Some(session) = state.registry.get_session(session_id) else {
            return Vec::new();
        };
        session
            .tank_ids()
            .iter()
            .filter_map(|tank_id| state.pool.lookup(tank_id))
            .map(|tank| tank.state())
            .collect()
    }

    fn update_gauges(&self, state: &CoreState) {
        self.metrics
            .active_sessions
            .store(state.registry.session_count() as u64, Ordering::Relaxed);
        self.metrics
            .tanks_in_use
            .store(state.pool.leased_count() as u64, Ordering::Relaxed);
    }
}
