//! Game session
//!
//! A session is a bounded set of players sharing one arena. It tracks who
//! is seated, which tank each player holds, and where replies and
//! broadcasts for that player should be sent.

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;
use uuid::Uuid;

use crate::game::TankId;

pub type PlayerId = String;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Session is full")]
    SessionFull,
    #[error("Player is already in this session")]
    PlayerAlreadyPresent,
}

/// A player's seat in a session
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    /// Where this player's datagrams come from (and go back to)
    pub address: SocketAddr,
    pub tank_id: TankId,
}

#[derive(Debug)]
pub struct GameSession {
    id: Uuid,
    capacity: usize,
    players: HashMap<PlayerId, PlayerEntry>,
}

impl GameSession {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity,
            players: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn add_player(
        &mut self,
        player_id: &str,
        address: SocketAddr,
        tank_id: &str,
    ) -> Result<(), SessionError> {
        if self.is_full() {
            return Err(SessionError::SessionFull);
        }
        if self.players.contains_key(player_id) {
            return Err(SessionError::PlayerAlreadyPresent);
        }
        self.players.insert(
            player_id.to_string(),
            PlayerEntry {
                address,
                tank_id: tank_id.to_string(),
            },
        );
        Ok(())
    }

    pub fn remove_player(&mut self, player_id: &str) -> Option<PlayerEntry> {
        self.players.remove(player_id)
    }

    pub fn get_player(&self, player_id: &str) -> Option<&PlayerEntry> {
        self.players.get(player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().cloned().collect()
    }

    /// Tank ids held by the seated players, for assembling state snapshots
    pub fn tank_ids(&self) -> Vec<TankId> {
        self.players.values().map(|entry| entry.tank_id.clone()).collect()
    }

    /// Broadcast targets: every seated player's address
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.players.values().map(|entry| entry.address).collect()
    }
}
