//! Session registry
//!
//! Owns every live session plus the player -> session reverse index. The two
//! structures always change together under one `&mut self` call, so a player
//! is indexed if and only if a session actually seats them. Sessions that
//! drain to zero players are torn down on the spot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::{unix_timestamp, EventSink, GameEvent};
use crate::session::game_session::{GameSession, PlayerId, SessionError};

/// Teardown reason attached to a session removed because its last player left
pub const REASON_EMPTY: &str = "empty_session";
/// Teardown reason for direct removal (operator action, shutdown)
pub const REASON_EXPLICIT: &str = "explicitly_removed";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("Session not found")]
    SessionNotFound,
    #[error("Player is already in session {0}")]
    AlreadyInSession(Uuid),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

pub struct SessionRegistry {
    sessions: HashMap<Uuid, GameSession>,
    /// Session ids oldest-first; fill order follows creation order, not
    /// whatever order the map happens to iterate in
    creation_order: Vec<Uuid>,
    player_sessions: HashMap<PlayerId, Uuid>,
    session_capacity: usize,
    events: Arc<dyn EventSink>,
}

impl SessionRegistry {
    pub fn new(session_capacity: usize, events: Arc<dyn EventSink>) -> Self {
        Self {
            sessions: HashMap::new(),
            creation_order: Vec::new(),
            player_sessions: HashMap::new(),
            session_capacity,
            events,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_player_count(&self) -> usize {
        self.player_sessions.len()
    }

    pub fn get_session(&self, session_id: Uuid) -> Option<&GameSession> {
        self.sessions.get(&session_id)
    }

    /// Create an empty session and return its id.
    pub fn create_session(&mut self) -> Uuid {
        let session = GameSession::new(self.session_capacity);
        let session_id = session.id();
        self.sessions.insert(session_id, session);
        self.creation_order.push(session_id);
        info!("Created session {}", session_id);
        self.events.emit(GameEvent::SessionCreated {
            session_id,
            timestamp: unix_timestamp(),
        });
        session_id
    }

    /// Remove a session outright, unseating any remaining players.
    pub fn remove_session(&mut self, session_id: Uuid, reason: &str) -> Option<GameSession> {
        let session = self.sessions.remove(&session_id)?;
        self.creation_order.retain(|id| *id != session_id);
        for player_id in session.player_ids() {
            self.player_sessions.remove(&player_id);
        }
        info!("Removed session {} ({})", session_id, reason);
        self.events.emit(GameEvent::SessionRemoved {
            session_id,
            reason: reason.to_string(),
            timestamp: unix_timestamp(),
        });
        Some(session)
    }

    /// Seat a player in a session. The reverse index is written only after
    /// the session accepts the player, so a failure leaves no trace.
    pub fn add_player(
        &mut self,
        session_id: Uuid,
        player_id: &str,
        address: SocketAddr,
        tank_id: &str,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.player_sessions.get(player_id) {
            return Err(RegistryError::AlreadyInSession(*existing));
        }
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::SessionNotFound)?;
        session.add_player(player_id, address, tank_id)?;
        self.player_sessions.insert(player_id.to_string(), session_id);

        debug!("Player {} seated in session {}", player_id, session_id);
        self.events.emit(GameEvent::PlayerJoinedSession {
            session_id,
            player_id: player_id.to_string(),
            tank_id: tank_id.to_string(),
            timestamp: unix_timestamp(),
        });
        Ok(())
    }

    /// Unseat a player wherever they are. Tears the session down if this
    /// was its last player. Returns false for players not in any session.
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        let Some(session_id) = self.player_sessions.remove(player_id) else {
            return false;
        };

        let (removed_tank, now_empty) = match self.sessions.get_mut(&session_id) {
            Some(session) => {
                let entry = session.remove_player(player_id);
                (entry.map(|e| e.tank_id), session.is_empty())
            }
            // Index pointed at a session that no longer exists; the stale
            // index entry is already gone, nothing else to do
            None => (None, false),
        };

        debug!("Player {} left session {}", player_id, session_id);
        self.events.emit(GameEvent::PlayerLeftSession {
            session_id,
            player_id: player_id.to_string(),
            tank_id: removed_tank,
            timestamp: unix_timestamp(),
        });

        if now_empty {
            self.remove_session(session_id, REASON_EMPTY);
        }
        true
    }

    pub fn find_session_for_player(&self, player_id: &str) -> Option<&GameSession> {
        let session_id = self.player_sessions.get(player_id)?;
        self.sessions.get(session_id)
    }

    /// Oldest session with a free seat, if any.
    pub fn find_available_session(&self) -> Option<Uuid> {
        self.creation_order
            .iter()
            .find(|id| {
                self.sessions
                    .get(id)
                    .map(|session| !session.is_full())
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Oldest session with a free seat, creating one when all are full.
    pub fn find_or_create_session(&mut self) -> Uuid {
        match self.find_available_session() {
            Some(session_id) => session_id,
            None => self.create_session(),
        }
    }
}
