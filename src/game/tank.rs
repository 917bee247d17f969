//! Tank entity
//!
//! A tank is a reusable game resource, not a player: it is leased out of the
//! pool when a player joins and wiped back to factory state when released.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::Position;

pub type TankId = String;

/// Hit points a tank starts with and returns to on reset
pub const DEFAULT_HEALTH: i32 = 100;

#[derive(Debug, Clone)]
pub struct Tank {
    pub id: TankId,
    pub position: Position,
    pub health: i32,
    /// Whether the tank is currently leased to a player
    pub active: bool,
}

/// Point-in-time snapshot of a tank, as carried in join replies and
/// `game_update` broadcasts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankState {
    pub id: TankId,
    pub position: Position,
    pub health: i32,
}

impl Tank {
    pub fn new(index: usize) -> Self {
        Self {
            id: format!("tank_{}", index),
            position: Position::ORIGIN,
            health: DEFAULT_HEALTH,
            active: false,
        }
    }

    /// Teleport to `position`. Inactive tanks ignore movement.
    pub fn move_to(&mut self, position: Position) {
        if !self.active {
            debug!("Tank {} is inactive, ignoring move to {}", self.id, position);
            return;
        }
        self.position = position;
    }

    /// Whether the tank is in a state where it can fire. Firing changes no
    /// tank state; the projectile lives only in the resulting broadcast.
    pub fn shoot(&self) -> bool {
        if !self.active {
            debug!("Tank {} is inactive, ignoring shot", self.id);
        }
        self.active
    }

    /// Apply damage, clamping health at zero. Returns true when this hit
    /// destroyed the tank.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if !self.active || amount <= 0 {
            return false;
        }
        let previous = self.health;
        self.health = (self.health - amount).max(0);
        previous > 0 && self.health == 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.health == 0
    }

    /// Return the tank to factory state: origin, full health, not leased.
    pub fn reset(&mut self) {
        self.position = Position::ORIGIN;
        self.health = DEFAULT_HEALTH;
        self.active = false;
    }

    pub fn state(&self) -> TankState {
        TankState {
            id: self.id.clone(),
            position: self.position,
            health: self.health,
        }
    }
}
